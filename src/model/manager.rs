//! # Model Resource Manager
//!
//! Owns the single loaded-model slot. Every job acquires the slot before
//! transcribing and releases it afterwards; the manager arbitrates who gets
//! it, refuses model switches while the resident model is in use, and evicts
//! the model after a configurable idle period so the accelerator memory goes
//! back to whoever needs it next.
//!
//! ## Slot rules:
//! - At most one model is resident at a time.
//! - `acquire` for the resident model just bumps the refcount.
//! - `acquire` for a different model is refused while the refcount is
//!   nonzero, and otherwise evicts the stale model synchronously before
//!   loading the new one.
//! - A single-shot idle timer is re-armed on every release; an acquire
//!   invalidates any pending timer. Eviction only happens if the slot was
//!   untouched for the whole idle window with no active users.
//!
//! All slot mutation happens under one async mutex, which also serializes
//! the load itself so two jobs cannot race a fresh load.

use crate::error::JobError;
use crate::model::loader::{LoadedModel, ModelLoader};
use crate::model::sibling::SiblingCoordinator;
use crate::worker::Transcriber;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// The single model slot and its bookkeeping.
struct ModelSlot {
    model: Option<LoadedModel>,
    /// Jobs currently between acquire and release
    active: usize,
    last_used: Instant,
    /// Bumped on every acquire/release; pending idle timers compare against
    /// it and stand down if the slot was touched after they were armed.
    epoch: u64,
}

/// Proof of a successful acquire, carrying what the job needs to execute.
pub struct ModelHandle {
    pub model_name: String,
    pub device: String,
    pub transcriber: Arc<dyn Transcriber>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model_name", &self.model_name)
            .field("device", &self.device)
            .field("transcriber", &"<dyn Transcriber>")
            .finish()
    }
}

/// Read-only snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub loaded: bool,
    pub model_name: Option<String>,
    pub device: String,
    pub memory_bytes: Option<u64>,
    pub active_jobs: usize,
    /// Seconds since the slot was last acquired or released
    pub last_used_seconds_ago: Option<u64>,
    pub idle_timeout_seconds: u64,
}

pub struct ModelResourceManager {
    slot: Mutex<ModelSlot>,
    loader: Arc<dyn ModelLoader>,
    idle_timeout: Duration,
    /// Device reported when nothing is loaded
    default_device: String,
    sibling: Option<SiblingCoordinator>,
}

impl ModelResourceManager {
    pub fn new(
        loader: Arc<dyn ModelLoader>,
        idle_timeout: Duration,
        default_device: String,
        sibling: Option<SiblingCoordinator>,
    ) -> Self {
        Self {
            slot: Mutex::new(ModelSlot {
                model: None,
                active: 0,
                last_used: Instant::now(),
                epoch: 0,
            }),
            loader,
            idle_timeout,
            default_device,
            sibling,
        }
    }

    /// Acquire the slot for `model_name`, loading it if necessary.
    ///
    /// Returns `ResourceBusy` if a different model is resident and in use;
    /// a model switch never waits for the other jobs and never preempts
    /// them. Returns `ResourceLoadFailed` if the load itself fails, in which
    /// case the slot stays empty.
    pub async fn acquire(&self, model_name: &str) -> Result<ModelHandle, JobError> {
        let mut slot = self.slot.lock().await;

        let needs_eviction = match &slot.model {
            Some(loaded) if loaded.model_name != model_name => {
                if slot.active > 0 {
                    return Err(JobError::ResourceBusy(format!(
                        "model '{}' is in use by {} active job(s), cannot switch to '{}'",
                        loaded.model_name, slot.active, model_name
                    )));
                }
                true
            }
            _ => false,
        };
        if needs_eviction {
            // Dropping the handle releases the backing memory before the
            // new load starts.
            let stale = slot.model.take().expect("eviction checked above");
            tracing::info!(
                "Evicting idle model '{}' to load '{}'",
                stale.model_name,
                model_name
            );
        }

        if slot.model.is_none() {
            if let Some(sibling) = &self.sibling {
                sibling.request_release().await;
            }

            tracing::info!("Loading model '{}'", model_name);
            let load_started = Instant::now();
            let loaded = self.loader.load(model_name).await.map_err(|err| match err {
                err @ JobError::ResourceLoadFailed(_) => err,
                other => JobError::ResourceLoadFailed(other.to_string()),
            })?;
            tracing::info!(
                "Model '{}' loaded in {:.2}s on {}",
                model_name,
                load_started.elapsed().as_secs_f64(),
                loaded.device
            );
            slot.model = Some(loaded);
        }

        slot.active += 1;
        slot.last_used = Instant::now();
        slot.epoch += 1;

        let loaded = slot.model.as_ref().expect("slot populated above");
        Ok(ModelHandle {
            model_name: loaded.model_name.clone(),
            device: loaded.device.clone(),
            transcriber: Arc::clone(&loaded.transcriber),
        })
    }

    /// Release one acquisition and re-arm the idle-eviction timer.
    pub async fn release(self: &Arc<Self>) {
        let mut slot = self.slot.lock().await;
        slot.active = slot.active.saturating_sub(1);
        slot.last_used = Instant::now();
        slot.epoch += 1;

        if slot.active == 0 && slot.model.is_some() && !self.idle_timeout.is_zero() {
            self.arm_idle_timer(slot.epoch);
        }
    }

    /// Forcibly evict the resident model. Returns whether an eviction
    /// happened; a no-op while jobs are active.
    pub async fn unload(&self) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.active > 0 {
            return false;
        }
        match slot.model.take() {
            Some(loaded) => {
                tracing::info!("Unloading model '{}', memory freed", loaded.model_name);
                slot.epoch += 1;
                true
            }
            None => false,
        }
    }

    /// Snapshot for the status endpoint.
    pub async fn status(&self) -> ModelStatus {
        let slot = self.slot.lock().await;
        ModelStatus {
            loaded: slot.model.is_some(),
            model_name: slot.model.as_ref().map(|m| m.model_name.clone()),
            device: slot
                .model
                .as_ref()
                .map(|m| m.device.clone())
                .unwrap_or_else(|| self.default_device.clone()),
            memory_bytes: slot.model.as_ref().map(|m| m.memory_bytes),
            active_jobs: slot.active,
            last_used_seconds_ago: slot
                .model
                .as_ref()
                .map(|_| slot.last_used.elapsed().as_secs()),
            idle_timeout_seconds: self.idle_timeout.as_secs(),
        }
    }

    /// Arm a single-shot eviction timer for the current epoch. The timer
    /// stands down if anything touches the slot before it fires.
    fn arm_idle_timer(self: &Arc<Self>, armed_epoch: u64) {
        let manager = Arc::clone(self);
        let idle_timeout = self.idle_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(idle_timeout).await;
            let mut slot = manager.slot.lock().await;
            if slot.epoch != armed_epoch || slot.active > 0 {
                return;
            }
            if let Some(loaded) = slot.model.take() {
                tracing::info!(
                    "Idle timeout ({:?}) reached, unloading model '{}'",
                    idle_timeout,
                    loaded.model_name
                );
                slot.epoch += 1;
            }
        });
    }
}
