//! # Admission Control
//!
//! Bounds how many transcriptions run at once, independent of how many jobs
//! are queued. The accelerator can realistically serve one inference at a
//! time, so the default capacity is 1; everything else waits in submission
//! order on the semaphore's queue.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting gate in front of the transcription phase.
#[derive(Clone)]
pub struct ConcurrencyGate {
    permits: Arc<Semaphore>,
}

/// Proof of admission. Dropping it frees the slot for the next waiter.
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Wait until a slot is free. Grants are handed out in request order.
    pub async fn admit(&self) -> AdmissionSlot {
        // The semaphore is never closed, so acquisition cannot fail.
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("admission semaphore closed");
        AdmissionSlot { _permit: permit }
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_capacity_one_serializes_admission() {
        let gate = ConcurrencyGate::new(1);

        let slot = gate.admit().await;
        assert_eq!(gate.available(), 0);

        // A second admission cannot complete while the slot is held.
        let second = tokio::time::timeout(Duration::from_millis(20), gate.admit()).await;
        assert!(second.is_err());

        drop(slot);
        let second = tokio::time::timeout(Duration::from_millis(100), gate.admit()).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_slot_released_on_drop() {
        let gate = ConcurrencyGate::new(2);
        let a = gate.admit().await;
        let b = gate.admit().await;
        assert_eq!(gate.available(), 0);
        drop(a);
        assert_eq!(gate.available(), 1);
        drop(b);
        assert_eq!(gate.available(), 2);
    }
}
