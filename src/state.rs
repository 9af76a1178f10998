//! # Application State Management
//!
//! Shared state handed to every HTTP request handler. The heavyweight parts
//! (registry, orchestrator, model manager) are behind `Arc`s and manage
//! their own synchronization; this struct is just the bundle actix clones
//! per worker.

use crate::config::AppConfig;
use crate::jobs::orchestrator::JobOrchestrator;
use crate::jobs::registry::JobRegistry;
use crate::model::manager::ModelResourceManager;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Counters over the job lifecycle, surfaced by the health endpoint.
///
/// `active` counts jobs between submission and their terminal transition,
/// including ones still waiting for admission.
#[derive(Debug, Default, Clone)]
pub struct JobMetrics {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub canceled: u64,
    pub active: u32,
}

/// The state shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Configuration as loaded at startup
    pub config: AppConfig,

    /// Job table, for status queries
    pub registry: Arc<JobRegistry>,

    /// Drives submitted jobs to completion
    pub orchestrator: Arc<JobOrchestrator>,

    /// The single model slot
    pub model_manager: Arc<ModelResourceManager>,

    /// Job lifecycle counters, written by the orchestrator
    pub metrics: Arc<RwLock<JobMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        registry: Arc<JobRegistry>,
        orchestrator: Arc<JobOrchestrator>,
        model_manager: Arc<ModelResourceManager>,
        metrics: Arc<RwLock<JobMetrics>>,
    ) -> Self {
        Self {
            config,
            registry,
            orchestrator,
            model_manager,
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Copy of the current counters. Cloning under the read lock keeps the
    /// snapshot consistent without holding the lock during serialization.
    pub fn get_metrics_snapshot(&self) -> JobMetrics {
        self.metrics.read().expect("metrics lock poisoned").clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
