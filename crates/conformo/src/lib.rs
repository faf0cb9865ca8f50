//! Conformo: parameterized conformance-suite engine
//!
//! Conformo turns declarative parameter spaces into concrete test cases,
//! addresses them with hierarchical queries, loads them lazily into a tree and
//! runs each case inside an isolated fixture that always releases what it
//! tracked.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ TestGroup    │   │ TestQuery    │   │ TestTree     │   │ Runner       │
//! │ (params +    │──►│ suite:file:  │──►│ (lazy, per   │──►│ Fixture per  │
//! │  test_fn)    │   │ test:params  │   │  query)      │   │ case → sink  │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//!        ▲                                                        │
//!        │ SuiteRegistry (test files, loaded on first import)     ▼
//!        └──────────────────────────────────────────────── Logger / StatusBoard
//! ```
//!
//! # Example
//!
//! ```ignore
//! let registry = SuiteRegistry::global();
//! registry.register_file("api", "buffer,create", "", || {
//!     let mut g = TestGroup::new(NullBackend);
//!     g.test("size")
//!         .params(|u| u.combine("size", [4u64, 16, 256]))
//!         .test_fn(|t, p| async move {
//!             t.expect(p.u64("size")? % 4 == 0, "aligned")?;
//!             Ok(())
//!         })?;
//!     Ok(g)
//! })?;
//!
//! let runner = Runner::new(registry, RunnerOptions::new());
//! let logger = Logger::new();
//! let summary = runner.run(&[parse_query("api:*")?], &logger).await?;
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

pub mod fixture;
pub mod logging;
pub mod params;
pub mod query;
pub mod tree;

mod group;
mod options;
mod registry;
mod result;
mod runner;

pub use fixture::{Backend, Fixture, NullBackend};
pub use group::{CaseSource, HookFn, RunCase, TestBuilder, TestFn, TestGroup};
pub use logging::{CaseRecorder, CaseResult, CaseStatus, LogRecord, Logger, ResultSink};
pub use options::{ExecutionMode, RunnerOptions};
pub use params::{CaseParams, ParamSpace, ParamsBuilder};
pub use query::{parse_query, Level, TestQuery};
pub use registry::{ListingEntry, LoadFn, SuiteRegistry, TestFileLoader};
pub use result::{CtsError, CtsResult};
pub use runner::{
    CaseOptions, Expectation, ExpectationEntry, ExpectationSet, RunSummary, Runner,
};
pub use tree::{AggregateStatus, CollapseOptions, NodeId, NodeKind, StatusBoard, TestTree};
