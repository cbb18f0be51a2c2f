//! FIFO-fair admission gate.
//!
//! Holds a fixed number of permits on a tokio [`Semaphore`]. Callers that find
//! no permit free wait in arrival order, and a released permit goes to the
//! oldest waiter still queued. A cancelled acquire leaves the queue without
//! taking a permit.

use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::trace;

#[derive(Debug)]
pub struct PermitGate {
    permits: usize,
    semaphore: Arc<Semaphore>,
}

/// Held while a caller is admitted. Dropping it releases the permit.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
}

impl PermitGate {
    pub fn new(permits: usize) -> Self {
        assert!(permits > 0, "a gate needs at least one permit");
        Self {
            permits,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn permits(&self) -> usize {
        self.permits
    }

    /// Permits not currently held by anyone.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Take a permit only if one is free and nobody is queued ahead.
    pub fn try_acquire(&self) -> Option<Permit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|p| Permit { _permit: p })
    }

    /// Wait for a permit. Fails only if the gate has been closed.
    pub async fn acquire(&self) -> Result<Permit, AcquireError> {
        trace!("acquiring permit ({} available)", self.available());
        let permit = Arc::clone(&self.semaphore).acquire_owned().await?;
        Ok(Permit { _permit: permit })
    }
}
