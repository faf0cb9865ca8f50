//! Scoped resource tracking.
//!
//! Every resource registered with a [`ResourceTracker`] is destroyed exactly
//! once: either explicitly through its [`Tracked`] handle or by the sweep at
//! the end of the case, whichever comes first. Order does not matter.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A backend resource that must be released
pub trait Destroy: Send + Sync {
    /// Release the resource; called at most once by the tracker
    fn destroy(&self);
}

/// Adapter turning a closure into a [`Destroy`] resource
pub struct Cleanup<F: Fn() + Send + Sync>(F);

impl<F: Fn() + Send + Sync> Cleanup<F> {
    /// Wrap a cleanup closure
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F: Fn() + Send + Sync> Destroy for Cleanup<F> {
    fn destroy(&self) {
        (self.0)();
    }
}

impl<F: Fn() + Send + Sync> fmt::Debug for Cleanup<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

trait Release: Send + Sync {
    fn release(&self) -> bool;
}

struct Slot<R: Destroy> {
    resource: R,
    released: AtomicBool,
}

impl<R: Destroy> Release for Slot<R> {
    fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.resource.destroy();
        true
    }
}

/// Handle to a tracked resource
///
/// Clones share the same release state.
pub struct Tracked<R: Destroy + 'static> {
    slot: Arc<Slot<R>>,
}

impl<R: Destroy + 'static> Tracked<R> {
    /// Release now; returns `false` if it was already released
    pub fn release(&self) -> bool {
        self.slot.release()
    }

    /// Whether the resource has been released
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.slot.released.load(Ordering::Acquire)
    }
}

impl<R: Destroy + 'static> Clone for Tracked<R> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<R: Destroy + 'static> Deref for Tracked<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.slot.resource
    }
}

impl<R: Destroy + 'static> fmt::Debug for Tracked<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Set of resources released together at the end of a case
#[derive(Default)]
pub struct ResourceTracker {
    slots: Mutex<Vec<Arc<dyn Release>>>,
}

impl fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTracker")
            .field("tracked", &self.len())
            .finish()
    }
}

impl ResourceTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource
    pub fn track<R: Destroy + 'static>(&self, resource: R) -> Tracked<R> {
        let slot = Arc::new(Slot {
            resource,
            released: AtomicBool::new(false),
        });
        self.slots().push(Arc::clone(&slot) as Arc<dyn Release>);
        Tracked { slot }
    }

    /// Number of resources registered and not yet swept
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    /// Whether nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release everything still held; returns how many were released by this call
    pub fn sweep(&self) -> usize {
        let drained: Vec<_> = self.slots().drain(..).collect();
        drained.iter().filter(|slot| slot.release()).count()
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Arc<dyn Release>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ResourceTracker {
    fn drop(&mut self) {
        self.sweep();
    }
}
