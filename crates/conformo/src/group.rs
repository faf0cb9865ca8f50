//! Test registration.
//!
//! A [`TestGroup`] holds the tests of one spec file. Tests are declared with a
//! fluent builder that ends in either [`TestBuilder::test_fn`] or
//! [`TestBuilder::unimplemented`]; both consume the builder, so a test has at
//! most one body and an unimplemented test has none.
//!
//! ```ignore
//! let mut g = TestGroup::new(NullBackend);
//! g.test("basic,add")
//!     .desc("integer addition")
//!     .params(|u| u.combine("a", [1, 2]).begin_subcases().combine("b", [3, 4]))
//!     .test_fn(|t, p| async move {
//!         let sum = p.u64("a")? + p.u64("b")?;
//!         t.expect(sum > 3, "sum is large")?;
//!         Ok(())
//!     })?;
//! ```

use crate::fixture::{Backend, Fixture};
use crate::logging::{CaseRecorder, CaseResult};
use crate::params::{CaseParams, CaseSpec, ParamSpace, ParamsBuilder};
use crate::query::{validate_name_part, TestQuery};
use crate::result::{CtsError, CtsResult};
use crate::runner::{execute_case, CaseOptions};
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// Boxed test body: receives the shared fixture and the full subcase params
pub type TestFn<B> =
    Arc<dyn Fn(Arc<Fixture<B>>, CaseParams) -> BoxFuture<'static, CtsResult<()>> + Send + Sync>;

/// Boxed hook run once per case before its subcases
pub type HookFn<B> =
    Arc<dyn Fn(Arc<Fixture<B>>) -> BoxFuture<'static, CtsResult<()>> + Send + Sync>;

pub(crate) enum TestBody<B: Backend> {
    Implemented {
        test_fn: TestFn<B>,
        before_all_subcases: Option<HookFn<B>>,
    },
    Unimplemented,
}

pub(crate) struct TestEntry<B: Backend> {
    pub(crate) path: Arc<[String]>,
    pub(crate) description: Option<Arc<str>>,
    pub(crate) space: ParamSpace,
    pub(crate) body: TestBody<B>,
}

/// Something that enumerates the cases of one spec file
pub trait CaseSource: Send + Sync {
    /// Number of registered tests
    fn test_count(&self) -> usize;

    /// Lazily enumerate every case of every test, in registration order
    fn iterate_cases(&self) -> Box<dyn Iterator<Item = CtsResult<RunCase>> + '_>;
}

/// Tests of one spec file, sharing one backend
pub struct TestGroup<B: Backend> {
    backend: Arc<B>,
    tests: Vec<Arc<TestEntry<B>>>,
    seen: HashSet<String>,
}

impl<B: Backend> std::fmt::Debug for TestGroup<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestGroup")
            .field("tests", &self.tests.len())
            .finish()
    }
}

impl<B: Backend> TestGroup<B> {
    /// Create a group whose cases acquire devices from `backend`
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self::with_backend(Arc::new(backend))
    }

    /// Create a group sharing an existing backend
    #[must_use]
    pub fn with_backend(backend: Arc<B>) -> Self {
        Self {
            backend,
            tests: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Start declaring a test; `name` parts are separated by `,`
    pub fn test(&mut self, name: &str) -> TestBuilder<'_, B> {
        TestBuilder {
            group: self,
            name: name.to_string(),
            description: None,
            space: Ok(ParamSpace::unit()),
            before_all_subcases: None,
        }
    }

    /// Number of registered tests
    #[must_use]
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Whether no test is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Lazily enumerate every case
    pub fn iterate(&self) -> impl Iterator<Item = CtsResult<RunCase>> + '_ {
        self.tests.iter().flat_map(move |entry| {
            let exec: Arc<dyn ExecuteCase> = Arc::new(BoundTest {
                backend: Arc::clone(&self.backend),
                entry: Arc::clone(entry),
            });
            let entry = Arc::clone(entry);
            entry.space.cases().map(move |case| {
                case.map(|case| RunCase {
                    test: Arc::clone(&entry.path),
                    description: entry.description.clone(),
                    unimplemented: matches!(entry.body, TestBody::Unimplemented),
                    case,
                    exec: Arc::clone(&exec),
                })
            })
        })
    }

    fn register(&mut self, entry: TestEntry<B>) -> CtsResult<()> {
        let name = entry.path.join(",");
        let cases = entry.space.validate(&name)?;
        if !self.seen.insert(name.clone()) {
            return Err(CtsError::DuplicateTest { name });
        }
        tracing::trace!(test = %name, cases, "registered test");
        self.tests.push(Arc::new(entry));
        Ok(())
    }
}

impl<B: Backend> CaseSource for TestGroup<B> {
    fn test_count(&self) -> usize {
        self.len()
    }

    fn iterate_cases(&self) -> Box<dyn Iterator<Item = CtsResult<RunCase>> + '_> {
        Box::new(self.iterate())
    }
}

/// Builder for one test; finish with [`Self::test_fn`] or [`Self::unimplemented`]
#[must_use = "a test is only registered by test_fn() or unimplemented()"]
pub struct TestBuilder<'g, B: Backend> {
    group: &'g mut TestGroup<B>,
    name: String,
    description: Option<String>,
    space: CtsResult<ParamSpace>,
    before_all_subcases: Option<HookFn<B>>,
}

impl<B: Backend> std::fmt::Debug for TestBuilder<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

impl<'g, B: Backend> TestBuilder<'g, B> {
    /// Describe the test
    pub fn desc(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare the param space
    pub fn params<P>(mut self, f: impl FnOnce(ParamsBuilder) -> ParamsBuilder<P>) -> Self {
        self.space = f(ParamsBuilder::new()).build();
        self
    }

    /// Run `hook` once per case, before the first subcase
    pub fn before_all_subcases<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<Fixture<B>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CtsResult<()>> + Send + 'static,
    {
        self.before_all_subcases = Some(Arc::new(move |t| Box::pin(hook(t))));
        self
    }

    /// Attach the body and register the test
    pub fn test_fn<F, Fut>(self, f: F) -> CtsResult<()>
    where
        F: Fn(Arc<Fixture<B>>, CaseParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CtsResult<()>> + Send + 'static,
    {
        let test_fn: TestFn<B> = Arc::new(move |t, p| Box::pin(f(t, p)));
        let body = TestBody::Implemented {
            test_fn,
            before_all_subcases: self.before_all_subcases.clone(),
        };
        self.finish(body)
    }

    /// Register the test without a body; its cases report `unimplemented`
    pub fn unimplemented(self) -> CtsResult<()> {
        self.finish(TestBody::Unimplemented)
    }

    fn finish(self, body: TestBody<B>) -> CtsResult<()> {
        let path: Vec<String> = self.name.split(',').map(str::to_string).collect();
        for part in &path {
            validate_name_part(part)?;
        }
        let entry = TestEntry {
            path: path.into(),
            description: self.description.map(Arc::from),
            space: self.space?,
            body,
        };
        self.group.register(entry)
    }
}

pub(crate) trait ExecuteCase: Send + Sync {
    fn execute<'a>(
        &'a self,
        case: &'a CaseSpec,
        options: &'a CaseOptions,
        recorder: CaseRecorder,
    ) -> BoxFuture<'a, CaseResult>;
}

struct BoundTest<B: Backend> {
    backend: Arc<B>,
    entry: Arc<TestEntry<B>>,
}

impl<B: Backend> ExecuteCase for BoundTest<B> {
    fn execute<'a>(
        &'a self,
        case: &'a CaseSpec,
        options: &'a CaseOptions,
        recorder: CaseRecorder,
    ) -> BoxFuture<'a, CaseResult> {
        Box::pin(execute_case(
            self.backend.as_ref(),
            self.entry.as_ref(),
            case,
            options,
            recorder,
        ))
    }
}

/// One runnable case of a registered test
#[derive(Clone)]
pub struct RunCase {
    test: Arc<[String]>,
    description: Option<Arc<str>>,
    unimplemented: bool,
    case: CaseSpec,
    exec: Arc<dyn ExecuteCase>,
}

impl std::fmt::Debug for RunCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCase")
            .field("test", &self.test)
            .field("params", self.case.params())
            .field("unimplemented", &self.unimplemented)
            .finish()
    }
}

impl RunCase {
    /// Test path parts
    #[must_use]
    pub fn test_path(&self) -> &[String] {
        &self.test
    }

    /// Case params (public and private, without subcase axes)
    #[must_use]
    pub const fn params(&self) -> &CaseParams {
        self.case.params()
    }

    /// Test description
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether the test was registered without a body
    #[must_use]
    pub const fn is_unimplemented(&self) -> bool {
        self.unimplemented
    }

    /// Query of this case within `suite` and `file`
    #[must_use]
    pub fn query(&self, suite: &str, file: &[String]) -> TestQuery {
        TestQuery::single_case(
            suite,
            file.to_vec(),
            self.test.to_vec(),
            self.case.params().clone(),
        )
    }

    /// Execute the case with a fresh recorder
    pub async fn run(&self, options: &CaseOptions, recorder: CaseRecorder) -> CaseResult {
        self.exec.execute(&self.case, options, recorder).await
    }
}
