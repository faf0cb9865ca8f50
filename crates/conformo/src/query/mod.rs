//! Test queries: structured addresses of files, tests and cases.
//!
//! Wire format (colon separates levels, comma separates parts, `*` is a
//! trailing wildcard):
//!
//! ```text
//! suite:*                          every file of a suite
//! suite:a,b,*                      every file under directory a/b
//! suite:a,b:*                      every test in file a/b
//! suite:a,b:t1,*                   every test under test path t1
//! suite:a,b:t1,t2:*                every case of test t1,t2
//! suite:a,b:t:{"n":1},*            every case of t whose params start with n=1
//! suite:a,b:t:{"n":1,"s":"a"}      exactly one case
//! ```

mod compare;
mod parse;

pub use compare::{compare_queries, QueryRelation};
pub use parse::{parse_query, validate_name_part, NAME_PATTERN};

use crate::params::CaseParams;
use std::fmt;

/// Path separator within a level
pub const PATH_SEPARATOR: char = ',';
/// Separator between levels
pub const LEVEL_SEPARATOR: char = ':';
/// Trailing wildcard
pub const WILDCARD: &str = "*";

/// How specific a query is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Selects files under a directory prefix
    MultiFile,
    /// Selects tests under a file and test path prefix
    MultiTest,
    /// Selects cases of one test by params prefix
    MultiCase,
    /// Selects exactly one case
    Single,
}

impl Level {
    /// Parse a level name as accepted on the command line
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "1" | "file" | "multi-file" => Some(Self::MultiFile),
            "2" | "test" | "multi-test" => Some(Self::MultiTest),
            "3" | "case" | "multi-case" => Some(Self::MultiCase),
            "4" | "single" => Some(Self::Single),
            _ => None,
        }
    }
}

/// Structured test query
///
/// Equality, ordering and hashing agree with the string form.
#[derive(Debug, Clone)]
pub enum TestQuery {
    /// `suite:a,b,*`
    MultiFile {
        /// Suite name
        suite: String,
        /// Directory/file path prefix
        file: Vec<String>,
    },
    /// `suite:a,b:t1,*`
    MultiTest {
        /// Suite name
        suite: String,
        /// Full file path
        file: Vec<String>,
        /// Test path prefix
        test: Vec<String>,
    },
    /// `suite:a,b:t:{"n":1},*`
    MultiCase {
        /// Suite name
        suite: String,
        /// Full file path
        file: Vec<String>,
        /// Full test path
        test: Vec<String>,
        /// Public params prefix
        params: CaseParams,
    },
    /// `suite:a,b:t:{"n":1}`
    SingleCase {
        /// Suite name
        suite: String,
        /// Full file path
        file: Vec<String>,
        /// Full test path
        test: Vec<String>,
        /// Complete public params
        params: CaseParams,
    },
}

impl TestQuery {
    /// Query for files under a path prefix
    #[must_use]
    pub fn multi_file(suite: impl Into<String>, file: Vec<String>) -> Self {
        Self::MultiFile {
            suite: suite.into(),
            file,
        }
    }

    /// Query for tests under a test path prefix of one file
    #[must_use]
    pub fn multi_test(suite: impl Into<String>, file: Vec<String>, test: Vec<String>) -> Self {
        Self::MultiTest {
            suite: suite.into(),
            file,
            test,
        }
    }

    /// Query for the cases of one test matching a params prefix
    #[must_use]
    pub fn multi_case(
        suite: impl Into<String>,
        file: Vec<String>,
        test: Vec<String>,
        params: CaseParams,
    ) -> Self {
        Self::MultiCase {
            suite: suite.into(),
            file,
            test,
            params: params.public(),
        }
    }

    /// Query for exactly one case
    #[must_use]
    pub fn single_case(
        suite: impl Into<String>,
        file: Vec<String>,
        test: Vec<String>,
        params: CaseParams,
    ) -> Self {
        Self::SingleCase {
            suite: suite.into(),
            file,
            test,
            params: params.public(),
        }
    }

    /// Specificity, derived from the variant
    #[must_use]
    pub const fn level(&self) -> Level {
        match self {
            Self::MultiFile { .. } => Level::MultiFile,
            Self::MultiTest { .. } => Level::MultiTest,
            Self::MultiCase { .. } => Level::MultiCase,
            Self::SingleCase { .. } => Level::Single,
        }
    }

    /// Suite name
    #[must_use]
    pub fn suite(&self) -> &str {
        match self {
            Self::MultiFile { suite, .. }
            | Self::MultiTest { suite, .. }
            | Self::MultiCase { suite, .. }
            | Self::SingleCase { suite, .. } => suite,
        }
    }

    /// File path parts (a prefix for `MultiFile`)
    #[must_use]
    pub fn file_parts(&self) -> &[String] {
        match self {
            Self::MultiFile { file, .. }
            | Self::MultiTest { file, .. }
            | Self::MultiCase { file, .. }
            | Self::SingleCase { file, .. } => file,
        }
    }

    /// Test path parts, absent at file level
    #[must_use]
    pub fn test_parts(&self) -> Option<&[String]> {
        match self {
            Self::MultiFile { .. } => None,
            Self::MultiTest { test, .. }
            | Self::MultiCase { test, .. }
            | Self::SingleCase { test, .. } => Some(test),
        }
    }

    /// Public params, absent above case level
    #[must_use]
    pub const fn params(&self) -> Option<&CaseParams> {
        match self {
            Self::MultiFile { .. } | Self::MultiTest { .. } => None,
            Self::MultiCase { params, .. } | Self::SingleCase { params, .. } => Some(params),
        }
    }

    /// Whether the string form ends in a wildcard
    #[must_use]
    pub const fn ends_with_wildcard(&self) -> bool {
        !matches!(self, Self::SingleCase { .. })
    }

    /// The file-level query for this query's file, if it names a full file
    #[must_use]
    pub fn file_query(&self) -> Option<Self> {
        match self {
            Self::MultiFile { .. } => None,
            _ => Some(Self::multi_test(
                self.suite(),
                self.file_parts().to_vec(),
                Vec::new(),
            )),
        }
    }

    /// Test name with parts joined by `,`
    #[must_use]
    pub fn test_name(&self) -> Option<String> {
        self.test_parts().map(|t| t.join(","))
    }
}

impl fmt::Display for TestQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn with_wildcard(parts: &[String]) -> String {
            parts
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(WILDCARD))
                .collect::<Vec<_>>()
                .join(",")
        }

        match self {
            Self::MultiFile { suite, file } => write!(f, "{suite}:{}", with_wildcard(file)),
            Self::MultiTest { suite, file, test } => {
                write!(f, "{suite}:{}:{}", file.join(","), with_wildcard(test))
            }
            Self::MultiCase {
                suite,
                file,
                test,
                params,
            } => {
                write!(f, "{suite}:{}:{}:", file.join(","), test.join(","))?;
                if params.is_empty() {
                    f.write_str(WILDCARD)
                } else {
                    write!(f, "{},{WILDCARD}", params.key_string())
                }
            }
            Self::SingleCase {
                suite,
                file,
                test,
                params,
            } => write!(
                f,
                "{suite}:{}:{}:{}",
                file.join(","),
                test.join(","),
                params.key_string()
            ),
        }
    }
}

impl std::str::FromStr for TestQuery {
    type Err = crate::result::CtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_query(s)
    }
}

impl PartialEq for TestQuery {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for TestQuery {}

impl std::hash::Hash for TestQuery {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

impl serde::Serialize for TestQuery {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for TestQuery {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_query(&s).map_err(serde::de::Error::custom)
    }
}
