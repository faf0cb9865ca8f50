//! Suite registry and lazy spec-file loading.
//!
//! Spec files are registered with a loader closure that builds their
//! [`TestGroup`](crate::TestGroup). The closure only runs when the file is
//! first imported, and the outcome is cached so concurrent importers share
//! one load. The registry is sealed when a tree starts loading from it.

use crate::group::CaseSource;
use crate::query::{validate_name_part, TestQuery, PATH_SEPARATOR};
use crate::result::{panic_message, CtsError, CtsResult};
use async_trait::async_trait;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::OnceCell;

/// Closure building the cases of one spec file
pub type LoadFn = Arc<dyn Fn() -> CtsResult<Arc<dyn CaseSource>> + Send + Sync>;

/// One entry of a suite listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// File (or directory, for readmes) path parts
    pub file: Vec<String>,
    /// Description registered with the entry
    pub description: Option<String>,
    /// Whether this entry only describes a directory
    pub is_readme: bool,
}

/// Source of suite listings and spec files
#[async_trait]
pub trait TestFileLoader: Send + Sync {
    /// Cheap listing of every file and readme of a suite
    async fn listing(&self, suite: &str) -> CtsResult<Vec<ListingEntry>>;

    /// Load one spec file
    async fn import(&self, suite: &str, file: &[String]) -> CtsResult<Arc<dyn CaseSource>>;

    /// Called when a tree starts loading; later registrations are rejected
    fn seal(&self) {}
}

type Loaded = Result<Arc<dyn CaseSource>, String>;

enum EntryKind {
    Readme,
    Spec {
        load: LoadFn,
        cell: OnceCell<Loaded>,
    },
}

struct FileEntry {
    suite: String,
    path: Vec<String>,
    description: Option<String>,
    kind: EntryKind,
}

impl FileEntry {
    fn query(&self) -> TestQuery {
        match self.kind {
            EntryKind::Readme => TestQuery::multi_file(&self.suite, self.path.clone()),
            EntryKind::Spec { .. } => {
                TestQuery::multi_test(&self.suite, self.path.clone(), Vec::new())
            }
        }
    }

    const fn is_readme(&self) -> bool {
        matches!(self.kind, EntryKind::Readme)
    }
}

#[derive(Default)]
struct RegistryState {
    sealed: bool,
    entries: Vec<Arc<FileEntry>>,
}

/// Registry of suites, spec files and directory readmes
#[derive(Default)]
pub struct SuiteRegistry {
    state: Mutex<RegistryState>,
}

impl std::fmt::Debug for SuiteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("SuiteRegistry")
            .field("sealed", &state.sealed)
            .field("entries", &state.entries.len())
            .finish()
    }
}

static GLOBAL: OnceLock<Arc<SuiteRegistry>> = OnceLock::new();

impl SuiteRegistry {
    /// Create an empty, open registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Register a spec file at `path` (parts separated by `,`)
    ///
    /// `load` runs on first import.
    pub fn register_file<F, S>(
        &self,
        suite: &str,
        path: &str,
        description: impl Into<String>,
        load: F,
    ) -> CtsResult<()>
    where
        F: Fn() -> CtsResult<S> + Send + Sync + 'static,
        S: CaseSource + 'static,
    {
        let load: LoadFn = Arc::new(move || Ok(Arc::new(load()?) as Arc<dyn CaseSource>));
        self.insert(
            suite,
            path,
            description.into(),
            EntryKind::Spec {
                load,
                cell: OnceCell::new(),
            },
        )
    }

    /// Register a description for a directory (empty `dir_path` for the suite)
    pub fn register_readme(
        &self,
        suite: &str,
        dir_path: &str,
        description: impl Into<String>,
    ) -> CtsResult<()> {
        self.insert(suite, dir_path, description.into(), EntryKind::Readme)
    }

    /// Reject further registrations
    pub fn seal(&self) {
        let mut state = self.state();
        if !state.sealed {
            tracing::debug!(entries = state.entries.len(), "registry sealed");
        }
        state.sealed = true;
    }

    /// Whether the registry was sealed
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.state().sealed
    }

    /// Registered suite names in registration order
    #[must_use]
    pub fn suites(&self) -> Vec<String> {
        let state = self.state();
        let mut suites: Vec<String> = Vec::new();
        for entry in &state.entries {
            if !suites.contains(&entry.suite) {
                suites.push(entry.suite.clone());
            }
        }
        suites
    }

    /// Number of registered spec files (readmes excluded)
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.state()
            .entries
            .iter()
            .filter(|e| !e.is_readme())
            .count()
    }

    fn insert(
        &self,
        suite: &str,
        path: &str,
        description: String,
        kind: EntryKind,
    ) -> CtsResult<()> {
        validate_name_part(suite)?;
        let path: Vec<String> = if path.is_empty() {
            Vec::new()
        } else {
            path.split(PATH_SEPARATOR).map(str::to_string).collect()
        };
        for part in &path {
            validate_name_part(part)?;
        }
        let entry = FileEntry {
            suite: suite.to_string(),
            path,
            description: (!description.trim().is_empty()).then(|| description.trim().to_string()),
            kind,
        };
        if !entry.is_readme() && entry.path.is_empty() {
            return Err(CtsError::InvalidName {
                name: String::new(),
                pattern: crate::query::NAME_PATTERN,
            });
        }

        let mut state = self.state();
        let file = entry.query().to_string();
        if state.sealed {
            return Err(CtsError::RegistrySealed { what: file });
        }
        let clash = state.entries.iter().any(|e| {
            e.suite == entry.suite && e.path == entry.path && e.is_readme() == entry.is_readme()
        });
        if clash {
            return Err(CtsError::DuplicateFile { file });
        }
        tracing::trace!(file = %file, "registered");
        state.entries.push(Arc::new(entry));
        Ok(())
    }

    fn find_spec(&self, suite: &str, file: &[String]) -> Option<Arc<FileEntry>> {
        self.state()
            .entries
            .iter()
            .find(|e| e.suite == suite && e.path == file && !e.is_readme())
            .cloned()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TestFileLoader for SuiteRegistry {
    async fn listing(&self, suite: &str) -> CtsResult<Vec<ListingEntry>> {
        let listing: Vec<ListingEntry> = self
            .state()
            .entries
            .iter()
            .filter(|e| e.suite == suite)
            .map(|e| ListingEntry {
                file: e.path.clone(),
                description: e.description.clone(),
                is_readme: e.is_readme(),
            })
            .collect();
        if listing.is_empty() {
            return Err(CtsError::UnknownSuite {
                suite: suite.to_string(),
            });
        }
        Ok(listing)
    }

    async fn import(&self, suite: &str, file: &[String]) -> CtsResult<Arc<dyn CaseSource>> {
        let file_query = TestQuery::multi_test(suite, file.to_vec(), Vec::new()).to_string();
        let Some(entry) = self.find_spec(suite, file) else {
            return Err(CtsError::LoadFailed {
                file: file_query,
                message: "no spec file registered at this path".to_string(),
            });
        };
        let EntryKind::Spec { load, cell } = &entry.kind else {
            return Err(CtsError::LoadFailed {
                file: file_query,
                message: "path names a readme".to_string(),
            });
        };

        let loaded = cell
            .get_or_init(|| async {
                tracing::debug!(file = %file_query, "importing spec file");
                match catch_unwind(AssertUnwindSafe(|| (**load)())) {
                    Ok(Ok(source)) => Ok(source),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
                }
            })
            .await;

        loaded.clone().map_err(|message| {
            tracing::warn!(file = %file_query, %message, "spec file failed to load");
            CtsError::LoadFailed {
                file: file_query,
                message,
            }
        })
    }

    fn seal(&self) {
        Self::seal(self);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fixture::NullBackend;
    use crate::group::TestGroup;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn one_test() -> CtsResult<TestGroup<NullBackend>> {
        let mut g = TestGroup::new(NullBackend);
        g.test("t").test_fn(|_, _| async { Ok(()) })?;
        Ok(g)
    }

    fn parts(s: &[&str]) -> Vec<String> {
        s.iter().map(|p| (*p).to_string()).collect()
    }

    mod registration_tests {
        use super::*;

        #[tokio::test]
        async fn test_listing_in_registration_order() {
            let reg = SuiteRegistry::new();
            reg.register_readme("s", "", "the suite").unwrap();
            reg.register_file("s", "a,b", "file b", one_test).unwrap();
            reg.register_file("s", "a,c", "", one_test).unwrap();
            let listing = reg.listing("s").await.unwrap();
            assert_eq!(listing.len(), 3);
            assert!(listing[0].is_readme);
            assert_eq!(listing[1].file, parts(&["a", "b"]));
            assert_eq!(listing[1].description.as_deref(), Some("file b"));
            assert_eq!(listing[2].description, None);
            assert_eq!(reg.file_count(), 2);
            assert_eq!(reg.suites(), vec!["s".to_string()]);
        }

        #[tokio::test]
        async fn test_unknown_suite() {
            let reg = SuiteRegistry::new();
            let err = reg.listing("nope").await.unwrap_err();
            assert!(matches!(err, CtsError::UnknownSuite { .. }));
        }

        #[test]
        fn test_sealed_rejects() {
            let reg = SuiteRegistry::new();
            reg.register_file("s", "a", "", one_test).unwrap();
            reg.seal();
            assert!(reg.is_sealed());
            let err = reg.register_file("s", "b", "", one_test).unwrap_err();
            assert!(matches!(err, CtsError::RegistrySealed { .. }));
        }

        #[test]
        fn test_duplicates_and_bad_names() {
            let reg = SuiteRegistry::new();
            reg.register_file("s", "a", "", one_test).unwrap();
            assert!(matches!(
                reg.register_file("s", "a", "", one_test),
                Err(CtsError::DuplicateFile { .. })
            ));
            assert!(reg.register_readme("s", "a", "dir a").is_ok());
            assert!(matches!(
                reg.register_file("s", "a b", "", one_test),
                Err(CtsError::InvalidName { .. })
            ));
            assert!(matches!(
                reg.register_file("s", "", "", one_test),
                Err(CtsError::InvalidName { .. })
            ));
        }
    }

    mod import_tests {
        use super::*;

        #[tokio::test]
        async fn test_loader_runs_once() {
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&calls);
            let reg = SuiteRegistry::new();
            reg.register_file("s", "f", "", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                one_test()
            })
            .unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 0);

            let file = parts(&["f"]);
            let (a, b) = tokio::join!(reg.import("s", &file), reg.import("s", &file));
            assert_eq!(a.unwrap().test_count(), 1);
            assert_eq!(b.unwrap().test_count(), 1);
            reg.import("s", &file).await.unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_failing_and_panicking_loaders() {
            let reg = SuiteRegistry::new();
            reg.register_file("s", "bad", "", || -> CtsResult<TestGroup<NullBackend>> {
                let mut g = TestGroup::new(NullBackend);
                g.test("x").unimplemented()?;
                g.test("x").unimplemented()?;
                Ok(g)
            })
            .unwrap();
            reg.register_file("s", "boom", "", || -> CtsResult<TestGroup<NullBackend>> {
                panic!("exploded while registering")
            })
            .unwrap();

            let err = reg.import("s", &parts(&["bad"])).await.err().unwrap();
            assert!(matches!(
                &err,
                CtsError::LoadFailed { message, .. } if message.contains("Duplicate")
            ));
            let err = reg.import("s", &parts(&["boom"])).await.err().unwrap();
            assert!(err.to_string().contains("exploded while registering"));
            let err = reg.import("s", &parts(&["missing"])).await.err().unwrap();
            assert!(matches!(err, CtsError::LoadFailed { .. }));
        }

        #[test]
        fn test_global_is_shared() {
            assert!(Arc::ptr_eq(&SuiteRegistry::global(), &SuiteRegistry::global()));
        }
    }
}
