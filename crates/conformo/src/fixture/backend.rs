//! Backend capability surface and device-loss signalling.

use crate::params::CaseParams;
use crate::result::CtsResult;
use async_trait::async_trait;
use tokio::sync::watch;

/// The API under test, as seen by fixtures
///
/// The engine never interprets a device; it only acquires one per case,
/// watches it for loss and releases it afterwards.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Handle passed to test bodies
    type Device: Clone + Send + Sync + 'static;

    /// Acquire a device suitable for `params`
    ///
    /// Returning [`crate::CtsError::SkipTestCase`] skips the case.
    async fn acquire(&self, params: &CaseParams) -> CtsResult<Self::Device>;

    /// Return a device after its case finished
    async fn release(&self, device: Self::Device) -> CtsResult<()>;

    /// Signal that resolves when the device is lost, if the backend can report loss
    fn loss_signal(&self, _device: &Self::Device) -> Option<LossSignal> {
        None
    }
}

/// Backend with a unit device, for suites that need no external API
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

#[async_trait]
impl Backend for NullBackend {
    type Device = ();

    async fn acquire(&self, _params: &CaseParams) -> CtsResult<()> {
        Ok(())
    }

    async fn release(&self, _device: ()) -> CtsResult<()> {
        Ok(())
    }
}

/// Why a device was lost
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LossInfo {
    /// Reason reported by the backend
    pub reason: String,
}

/// Sending half of a loss channel, held by the backend
#[derive(Debug)]
pub struct LossTrigger {
    tx: watch::Sender<Option<LossInfo>>,
}

impl LossTrigger {
    /// Report loss; later calls are ignored
    pub fn trigger(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(LossInfo { reason });
            true
        });
    }

    /// Whether loss was reported
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// Receiving half of a loss channel
#[derive(Debug, Clone)]
pub struct LossSignal {
    rx: watch::Receiver<Option<LossInfo>>,
}

impl LossSignal {
    /// Resolve once the device is lost
    ///
    /// Never resolves if the trigger is dropped without reporting loss.
    pub async fn lost(&mut self) -> LossInfo {
        loop {
            if let Some(info) = self.rx.borrow_and_update().clone() {
                return info;
            }
            if self.rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// Loss info if loss was already reported
    #[must_use]
    pub fn peek(&self) -> Option<LossInfo> {
        self.rx.borrow().clone()
    }
}

/// Create a connected trigger and signal
#[must_use]
pub fn loss_channel() -> (LossTrigger, LossSignal) {
    let (tx, rx) = watch::channel(None);
    (LossTrigger { tx }, LossSignal { rx })
}
