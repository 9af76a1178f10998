//! # Cancellation
//!
//! Every job gets a cancel flag at submission. The flag is set at most once,
//! read by the orchestrator at its checkpoints, handed to the executing work
//! unit for cooperative checks, and removed when the job reaches a terminal
//! state.
//!
//! The flag is awaitable: a job still waiting for admission can race its
//! admission wait against `canceled()` and resolve immediately instead of
//! discovering the request at its next checkpoint.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-job cancellation flag. Cheap to clone; all clones observe the same
/// state.
#[derive(Debug, Clone)]
pub struct CancelFlag {
    token: CancellationToken,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn canceled(&self) {
        self.token.cancelled().await;
    }
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the map from job id to cancel flag.
///
/// Flags exist only while their job is live; `remove` is called on every
/// terminal transition so the map cannot grow with job history.
pub struct CancellationController {
    flags: Mutex<HashMap<Uuid, CancelFlag>>,
}

impl CancellationController {
    pub fn new() -> Self {
        Self {
            flags: Mutex::new(HashMap::new()),
        }
    }

    /// Create and store the flag for a new job.
    pub fn register(&self, job_id: Uuid) -> CancelFlag {
        let flag = CancelFlag::new();
        self.flags
            .lock()
            .expect("cancel flag map poisoned")
            .insert(job_id, flag.clone());
        flag
    }

    /// Set the flag for a live job. Returns false if no flag exists, which
    /// means the job already finished.
    pub fn trigger(&self, job_id: Uuid) -> bool {
        let flags = self.flags.lock().expect("cancel flag map poisoned");
        match flags.get(&job_id) {
            Some(flag) => {
                flag.trigger();
                true
            }
            None => false,
        }
    }

    /// Drop the flag once its job reached a terminal state.
    pub fn remove(&self, job_id: Uuid) {
        self.flags
            .lock()
            .expect("cancel flag map poisoned")
            .remove(&job_id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.flags.lock().unwrap().len()
    }
}

impl Default for CancellationController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_set_once_visible_to_clones() {
        let flag = CancelFlag::new();
        let seen_by_worker = flag.clone();
        assert!(!seen_by_worker.is_canceled());
        flag.trigger();
        assert!(seen_by_worker.is_canceled());
        // Triggering again changes nothing.
        flag.trigger();
        assert!(flag.is_canceled());
    }

    #[tokio::test]
    async fn test_flag_is_awaitable() {
        let flag = CancelFlag::new();
        let waiter = flag.clone();
        let handle = tokio::spawn(async move { waiter.canceled().await });
        flag.trigger();
        handle.await.unwrap();
    }

    #[test]
    fn test_controller_lifecycle() {
        let controller = CancellationController::new();
        let id = Uuid::new_v4();

        let flag = controller.register(id);
        assert!(controller.trigger(id));
        assert!(flag.is_canceled());

        controller.remove(id);
        assert_eq!(controller.len(), 0);
        // Jobs that already finished report false instead of erroring.
        assert!(!controller.trigger(id));
    }
}
