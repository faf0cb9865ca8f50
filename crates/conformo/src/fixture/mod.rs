//! Per-case execution context.
//!
//! One [`Fixture`] is created for every case and shared (through `Arc`) by
//! all of that case's subcases. It owns the case's log recorder, the set of
//! tracked backend resources and any eventual expectations. The runner
//! finalizes it once the body has completed, failed, panicked or timed out;
//! after that every recording or tracking method reports
//! [`CtsError::FixtureFinished`].

mod backend;
mod tracker;

pub use backend::{loss_channel, Backend, LossInfo, LossSignal, LossTrigger, NullBackend};
pub use tracker::{Cleanup, Destroy, ResourceTracker, Tracked};

use crate::logging::CaseRecorder;
use crate::params::CaseParams;
use crate::result::{CtsError, CtsResult};
use futures::future::BoxFuture;
use serde_json::json;
use std::fmt::Display;
use std::future::Future;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Outcome of an eventual expectation: `Err` carries the failure message
type Eventual = BoxFuture<'static, Result<(), String>>;

/// Execution context of one case
pub struct Fixture<B: Backend> {
    params: CaseParams,
    device: B::Device,
    recorder: Mutex<CaseRecorder>,
    tracker: ResourceTracker,
    eventual: Mutex<Vec<Eventual>>,
    finished: AtomicBool,
    loss_expected: AtomicBool,
}

impl<B: Backend> std::fmt::Debug for Fixture<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixture")
            .field("params", &self.params)
            .field("tracked", &self.tracker.len())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<B: Backend> Fixture<B> {
    /// Create a fixture for a case
    #[must_use]
    pub fn new(params: CaseParams, device: B::Device, recorder: CaseRecorder) -> Arc<Self> {
        Arc::new(Self {
            params,
            device,
            recorder: Mutex::new(recorder),
            tracker: ResourceTracker::new(),
            eventual: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
            loss_expected: AtomicBool::new(false),
        })
    }

    /// Case params (subcase params are passed to the body separately)
    #[must_use]
    pub const fn params(&self) -> &CaseParams {
        &self.params
    }

    /// Backend device for this case
    #[must_use]
    pub const fn device(&self) -> &B::Device {
        &self.device
    }

    /// Whether the case has been finalized
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Register a resource to be destroyed when the case ends
    pub fn track_for_cleanup<R: Destroy + 'static>(&self, resource: R) -> CtsResult<Tracked<R>> {
        self.check_live("track_for_cleanup")?;
        Ok(self.tracker.track(resource))
    }

    /// Record a pass or an expectation failure; never aborts the body
    pub fn expect(&self, condition: bool, message: impl Into<String>) -> CtsResult<bool> {
        let message = message.into();
        let mut rec = self.live_recorder("expect")?;
        if condition {
            rec.pass(message);
        } else {
            rec.expectation_failed(message, None);
        }
        Ok(condition)
    }

    /// Record a failure if `result` is an error; returns the success value
    pub fn expect_ok<T, E: Display>(
        &self,
        result: Result<T, E>,
        context: &str,
    ) -> CtsResult<Option<T>> {
        let mut rec = self.live_recorder("expect_ok")?;
        match result {
            Ok(value) => {
                rec.pass(context.to_string());
                Ok(Some(value))
            }
            Err(e) => {
                let extra = Arc::new(json!({ "error": e.to_string() }));
                rec.expectation_failed(format!("{context}: {e}"), Some(extra));
                Ok(None)
            }
        }
    }

    /// Expect `f` to fail, optionally with a message containing `expected`
    pub fn should_throw<T, E: Display>(
        &self,
        expected: Option<&str>,
        f: impl FnOnce() -> Result<T, E>,
    ) -> CtsResult<bool> {
        self.check_live("should_throw")?;
        let outcome = check_rejection(expected, f());
        let mut rec = self.live_recorder("should_throw")?;
        Ok(record_outcome(&mut rec, outcome))
    }

    /// Expect `future` to fail; checked when the case is finalized
    ///
    /// The body does not need to await the future.
    pub fn should_reject<T, E, F>(&self, expected: Option<&str>, future: F) -> CtsResult<()>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.check_live("should_reject")?;
        let expected = expected.map(str::to_string);
        let eventual: Eventual =
            Box::pin(async move { check_rejection(expected.as_deref(), future.await) });
        lock(&self.eventual).push(eventual);
        Ok(())
    }

    /// Record a warning
    pub fn warn(&self, message: impl Into<String>) -> CtsResult<()> {
        self.live_recorder("warn")?.warn(message, None);
        Ok(())
    }

    /// Record a failure without aborting the body
    pub fn fail(&self, message: impl Into<String>) -> CtsResult<()> {
        self.live_recorder("fail")?.expectation_failed(message, None);
        Ok(())
    }

    /// Record a backend validation failure
    pub fn validation_failed(&self, message: impl Into<String>) -> CtsResult<()> {
        self.live_recorder("validation_failed")?
            .validation_failed(message, None);
        Ok(())
    }

    /// Record an informational message
    pub fn info(&self, message: impl Into<String>) -> CtsResult<()> {
        self.live_recorder("info")?.info(message);
        Ok(())
    }

    /// Record a debug message (kept only when debugging)
    pub fn debug(&self, message: impl Into<String>) -> CtsResult<()> {
        self.live_recorder("debug")?.debug(message);
        Ok(())
    }

    /// Skip the rest of the case: `return fixture.skip("reason")`
    pub fn skip<T>(&self, reason: impl Into<String>) -> CtsResult<T> {
        Err(CtsError::skip(reason))
    }

    /// Skip the case if `condition` holds
    pub fn skip_if(&self, condition: bool, reason: impl Into<String>) -> CtsResult<()> {
        if condition {
            self.skip(reason)
        } else {
            Ok(())
        }
    }

    /// Declare that this case deliberately loses its device
    ///
    /// Device loss then turns the case into a skip instead of a failure.
    pub fn expect_device_loss(&self) {
        self.loss_expected.store(true, Ordering::Release);
    }

    /// Whether device loss was declared expected
    #[must_use]
    pub fn is_loss_expected(&self) -> bool {
        self.loss_expected.load(Ordering::Acquire)
    }

    /// Number of tracked resources still pending release
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracker.len()
    }

    /// Run `f` against the recorder, even after finalization
    pub(crate) fn with_recorder<T>(&self, f: impl FnOnce(&mut CaseRecorder) -> T) -> T {
        f(&mut lock(&self.recorder))
    }

    pub(crate) fn enter_subcase(&self, subcase: Option<String>) {
        lock(&self.recorder).enter_subcase(subcase);
    }

    /// End the case: await eventual expectations, then release every
    /// tracked resource
    ///
    /// Eventual expectations still pending after `eventual_timeout` are
    /// recorded as failures. A second call reports
    /// [`CtsError::FixtureFinished`].
    pub async fn finalize(&self, eventual_timeout: Option<Duration>) -> CtsResult<()> {
        self.check_live("finalize")?;

        let pending = mem::take(&mut *lock(&self.eventual));
        if !pending.is_empty() {
            let all = futures::future::join_all(pending);
            let outcomes = match eventual_timeout {
                Some(limit) => tokio::time::timeout(limit, all).await.ok(),
                None => Some(all.await),
            };
            let mut rec = lock(&self.recorder);
            match outcomes {
                Some(outcomes) => {
                    for outcome in outcomes {
                        record_outcome(&mut rec, outcome);
                    }
                }
                None => rec.expectation_failed("eventual expectation did not settle", None),
            }
        }

        let released = self.tracker.sweep();
        tracing::trace!(released, "fixture finalized");
        self.finished.store(true, Ordering::Release);
        Ok(())
    }

    /// Release tracked resources without awaiting anything
    pub(crate) fn abort(&self) {
        lock(&self.eventual).clear();
        self.tracker.sweep();
        self.finished.store(true, Ordering::Release);
    }

    /// Take the recorder out, leaving a fresh one in place
    pub(crate) fn take_recorder(&self) -> CaseRecorder {
        let mut rec = lock(&self.recorder);
        let debug = rec.is_debug();
        mem::replace(&mut *rec, CaseRecorder::new(debug))
    }

    fn check_live(&self, operation: &'static str) -> CtsResult<()> {
        if self.is_finished() {
            Err(CtsError::FixtureFinished { operation })
        } else {
            Ok(())
        }
    }

    fn live_recorder(&self, operation: &'static str) -> CtsResult<MutexGuard<'_, CaseRecorder>> {
        self.check_live(operation)?;
        Ok(lock(&self.recorder))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn check_rejection<T, E: Display>(
    expected: Option<&str>,
    result: Result<T, E>,
) -> Result<(), String> {
    match (result, expected) {
        (Ok(_), _) => Err("DID NOT REJECT: operation succeeded".to_string()),
        (Err(e), Some(expected)) => {
            let message = e.to_string();
            if message.contains(expected) {
                Ok(())
            } else {
                Err(format!("expected error containing '{expected}', got: {message}"))
            }
        }
        (Err(_), None) => Ok(()),
    }
}

fn record_outcome(rec: &mut CaseRecorder, outcome: Result<(), String>) -> bool {
    match outcome {
        Ok(()) => {
            rec.pass("rejected as expected");
            true
        }
        Err(message) => {
            rec.expectation_failed(message, None);
            false
        }
    }
}
