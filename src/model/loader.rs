//! # Model Loading
//!
//! The seam between the resource manager and whatever actually provides
//! inference. The manager only knows how to ask a [`ModelLoader`] for a
//! [`LoadedModel`] and how to drop one; everything behind that is opaque to
//! it.
//!
//! The production implementation binds a model name to the process-backed
//! transcriber: the heavyweight load happens inside the child, which reports
//! it through the status-line protocol. Embedded inference backends
//! implement [`ModelLoader`] themselves and hand back a [`Transcriber`] that
//! runs on the blocking pool.

use crate::error::JobError;
use crate::model::catalog::ModelSize;
use crate::worker::process::{ProcessTranscriber, ProcessWorkerSettings};
use crate::worker::Transcriber;
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;

/// A model resident in the slot, ready to execute work.
pub struct LoadedModel {
    pub model_name: String,
    /// Device string the model reports itself on
    pub device: String,
    /// Approximate resident memory in bytes
    pub memory_bytes: u64,
    /// Execution capability bound to this model
    pub transcriber: Arc<dyn Transcriber>,
}

/// Provides loaded models to the resource manager.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the named model. On failure the slot is left empty, so
    /// implementations must not leave partial state behind.
    async fn load(&self, model_name: &str) -> Result<LoadedModel, JobError>;
}

/// Loader for the process-isolated execution mode.
pub struct ProcessModelLoader {
    settings: ProcessWorkerSettings,
    device: String,
}

impl ProcessModelLoader {
    pub fn new(settings: ProcessWorkerSettings, device: String) -> Self {
        Self { settings, device }
    }
}

#[async_trait]
impl ModelLoader for ProcessModelLoader {
    async fn load(&self, model_name: &str) -> Result<LoadedModel, JobError> {
        // Validate against the catalog so a bogus name fails here instead of
        // deep inside a spawned child.
        let size = ModelSize::from_str(model_name).map_err(JobError::ResourceLoadFailed)?;

        tracing::info!("Binding model '{}' to transcriber command", model_name);
        Ok(LoadedModel {
            model_name: model_name.to_string(),
            device: self.device.clone(),
            memory_bytes: size.size_mb() as u64 * 1024 * 1024,
            transcriber: Arc::new(ProcessTranscriber::new(self.settings.clone())),
        })
    }
}
