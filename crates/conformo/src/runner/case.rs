//! Execution of a single case.

use super::expectation::Expectation;
use crate::fixture::{Backend, Fixture, LossInfo, LossSignal};
use crate::group::{HookFn, TestBody, TestEntry, TestFn};
use crate::logging::{CaseRecorder, CaseResult};
use crate::params::CaseSpec;
use crate::result::{panic_message, CtsError, CtsResult};
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-case execution settings
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseOptions {
    /// Abort the case after this long
    pub timeout: Option<Duration>,
    /// How the outcome is interpreted
    pub expectation: Expectation,
}

impl CaseOptions {
    /// Options with a timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Options with an expectation
    #[must_use]
    pub const fn with_expectation(mut self, expectation: Expectation) -> Self {
        self.expectation = expectation;
        self
    }
}

enum Outcome {
    Completed,
    Lost(LossInfo),
    TimedOut(Duration),
}

/// Run one case of `entry` to completion and produce its result
pub(crate) async fn execute_case<B: Backend>(
    backend: &B,
    entry: &TestEntry<B>,
    case: &CaseSpec,
    options: &CaseOptions,
    mut recorder: CaseRecorder,
) -> CaseResult {
    recorder.start();
    let (test_fn, before_all) = match &entry.body {
        TestBody::Unimplemented => {
            recorder.mark_unimplemented();
            return recorder.finish();
        }
        TestBody::Implemented {
            test_fn,
            before_all_subcases,
        } => (test_fn, before_all_subcases.as_ref()),
    };
    if options.expectation == Expectation::Skip {
        recorder.skipped("skipped by expectation");
        return recorder.finish();
    }

    let device = match guarded(backend.acquire(case.params())).await {
        Ok(device) => device,
        Err(e) => {
            recorder.threw(&e);
            return recorder.finish();
        }
    };
    let loss = match catch_unwind(AssertUnwindSafe(|| backend.loss_signal(&device))) {
        Ok(loss) => loss,
        Err(payload) => {
            recorder.threw(&panicked(payload.as_ref()));
            release(backend, device, &mut recorder).await;
            return recorder.finish();
        }
    };
    let fixture = Fixture::<B>::new(case.params().clone(), device.clone(), recorder);

    let started = Instant::now();
    let body = run_body(&fixture, case, test_fn, before_all);
    match race(body, loss.clone(), options.timeout).await {
        Outcome::Completed => {
            let remaining = options
                .timeout
                .map(|limit| limit.saturating_sub(started.elapsed()));
            if let Err(e) = fixture.finalize(remaining).await {
                fixture.with_recorder(|r| r.threw(&e));
            }
            if let Some(info) = loss.as_ref().and_then(LossSignal::peek) {
                record_loss(&fixture, info);
            }
        }
        Outcome::Lost(info) => {
            fixture.abort();
            record_loss(&fixture, info);
        }
        Outcome::TimedOut(limit) => {
            fixture.abort();
            let err = CtsError::Timeout {
                ms: limit.as_millis() as u64,
            };
            fixture.with_recorder(|r| {
                r.enter_subcase(None);
                r.threw(&err);
            });
        }
    }

    let mut recorder = fixture.take_recorder();
    release(backend, device, &mut recorder).await;
    if options.expectation == Expectation::Fail {
        recorder.expect_failure();
    }
    let result = recorder.finish();
    tracing::trace!(params = %case.key(), status = %result.status, "case finished");
    result
}

fn record_loss<B: Backend>(fixture: &Fixture<B>, info: LossInfo) {
    let expected = fixture.is_loss_expected();
    tracing::debug!(reason = %info.reason, expected, "device lost during case");
    fixture.with_recorder(|r| {
        r.enter_subcase(None);
        r.device_lost(info.reason, expected);
    });
}

async fn release<B: Backend>(backend: &B, device: B::Device, recorder: &mut CaseRecorder) {
    if let Err(e) = guarded(backend.release(device)).await {
        recorder.warn(format!("failed to release device: {e}"), None);
    }
}

async fn race<F: Future<Output = ()>>(
    body: F,
    loss: Option<LossSignal>,
    timeout: Option<Duration>,
) -> Outcome {
    let lost = async move {
        match loss {
            Some(mut signal) => signal.lost().await,
            None => std::future::pending().await,
        }
    };
    let deadline = async move {
        match timeout {
            Some(limit) => {
                tokio::time::sleep(limit).await;
                limit
            }
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        biased;
        () = body => Outcome::Completed,
        info = lost => Outcome::Lost(info),
        limit = deadline => Outcome::TimedOut(limit),
    }
}

async fn run_body<B: Backend>(
    fixture: &Arc<Fixture<B>>,
    case: &CaseSpec,
    test_fn: &TestFn<B>,
    before_all: Option<&HookFn<B>>,
) {
    if let Some(hook) = before_all {
        let fx = Arc::clone(fixture);
        let outcome = guarded(async move { hook(fx).await }).await;
        if let Err(e) = outcome {
            fixture.with_recorder(|r| r.threw(&e));
            return;
        }
    }

    for subcase in case.subcases() {
        let params = match subcase {
            Ok(params) => params,
            Err(e) => {
                fixture.with_recorder(|r| r.threw(&e));
                break;
            }
        };
        if case.has_subcases() {
            fixture.enter_subcase(Some(case.subcase_only(&params).key_string()));
        }
        let fx = Arc::clone(fixture);
        let outcome = guarded(async move { test_fn(fx, params).await }).await;
        if let Err(e) = outcome {
            fixture.with_recorder(|r| r.threw(&e));
        }
    }
    fixture.enter_subcase(None);
}

/// Await a body or backend call, turning a panic into an error
async fn guarded<T, F: Future<Output = CtsResult<T>>>(body: F) -> CtsResult<T> {
    match AssertUnwindSafe(body).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(panicked(payload.as_ref())),
    }
}

fn panicked(payload: &(dyn Any + Send)) -> CtsError {
    CtsError::TestFailure {
        message: format!("panicked: {}", panic_message(payload)),
    }
}

/// Result of a file that failed to load
pub(crate) fn load_error_result(message: &str, mut recorder: CaseRecorder) -> CaseResult {
    recorder.start();
    let extra = Arc::new(json!({ "error": message }));
    recorder.exception(format!("spec file failed to load: {message}"), Some(extra));
    recorder.finish()
}
