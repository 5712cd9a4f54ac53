use std::sync::{Arc, OnceLock};

use crate::utils::errors::RecalError;

/**
 * Publishes one read-only value to every worker of a job.
 *
 * The value is moved behind an `Arc` exactly once. Workers hold a `BroadcastHandle`, which
 * is cheap to clone and resolves to the shared value without locking. Publishing a second value
 * is an error, the value seen by workers can never change during a job.
 */
#[derive(Debug)]
pub struct Broadcaster<T> {
    slot: Arc<OnceLock<Arc<T>>>,
}

impl<T> Default for Broadcaster<T> {
    fn default() -> Self {
        Broadcaster {
            slot: Arc::new(OnceLock::new()),
        }
    }
}

impl<T> Broadcaster<T> {
    pub fn new() -> Broadcaster<T> {
        Self::default()
    }

    pub fn publish(&self, value: T) -> Result<BroadcastHandle<T>, RecalError> {
        self.slot.set(Arc::new(value)).map_err(|_| {
            RecalError::distribution("A value has already been broadcast for this job")
        })?;
        Ok(self.handle())
    }

    /// A handle to whatever is, or will be, published by this broadcaster
    pub fn handle(&self) -> BroadcastHandle<T> {
        BroadcastHandle {
            slot: Arc::clone(&self.slot),
        }
    }

    pub fn is_published(&self) -> bool {
        self.slot.get().is_some()
    }
}

#[derive(Debug)]
pub struct BroadcastHandle<T> {
    slot: Arc<OnceLock<Arc<T>>>,
}

impl<T> Clone for BroadcastHandle<T> {
    fn clone(&self) -> Self {
        BroadcastHandle {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> BroadcastHandle<T> {
    /**
     * The shared value. Fails with a distribution error if nothing was published.
     */
    pub fn resolve(&self) -> Result<Arc<T>, RecalError> {
        self.slot.get().cloned().ok_or_else(|| {
            RecalError::distribution("Broadcast value resolved before it was published")
        })
    }

    pub fn value(&self) -> Result<&T, RecalError> {
        self.slot.get().map(|value| value.as_ref()).ok_or_else(|| {
            RecalError::distribution("Broadcast value resolved before it was published")
        })
    }
}
