//! # Job Registry
//!
//! Owns the map from job id to job record. State is in-memory only and lost
//! on restart; clients are expected to resubmit.
//!
//! ## Access pattern:
//! - The task driving a job is the only writer of that job's record, going
//!   through [`JobRegistry::update`].
//! - Status queries read through [`JobRegistry::snapshot`], which clones the
//!   record under the read lock. Readers never observe a half-applied
//!   update and never hold a reference into live state.
//! - A periodic sweep deletes terminal records once they are older than the
//!   configured retention window.

use crate::jobs::record::{JobRecord, JobState};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a freshly queued record and return its id.
    pub async fn create(&self, model_name: &str) -> Uuid {
        let job_id = Uuid::new_v4();
        let record = JobRecord::new(job_id, model_name);
        self.jobs.write().await.insert(job_id, record);
        job_id
    }

    /// Clone the current state of a record.
    pub async fn snapshot(&self, job_id: Uuid) -> Option<JobRecord> {
        self.jobs.read().await.get(&job_id).cloned()
    }

    /// Mutate a record in place. Returns false if the record no longer
    /// exists (swept, or never created).
    pub async fn update<F>(&self, job_id: Uuid, mutate: F) -> bool
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job_id) {
            Some(record) => {
                mutate(record);
                true
            }
            None => false,
        }
    }

    /// Current status of a record, if it exists.
    pub async fn status(&self, job_id: Uuid) -> Option<JobState> {
        self.jobs.read().await.get(&job_id).map(|r| r.status)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Delete terminal records whose end time is older than `retention`.
    /// Live jobs are never touched regardless of age.
    pub async fn sweep_expired(&self, retention: Duration) -> usize {
        let now = Utc::now();
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);

        let mut jobs = self.jobs.write().await;
        let expired: Vec<Uuid> = jobs
            .iter()
            .filter(|(_, record)| {
                record.status.is_terminal()
                    && record
                        .ended_at
                        .map(|ended| now - ended > retention)
                        .unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect();

        for job_id in &expired {
            jobs.remove(job_id);
            tracing::debug!("Swept expired job {}", job_id);
        }
        expired.len()
    }

    /// Spawn the periodic retention sweep. Runs for the life of the process.
    pub fn spawn_retention_sweep(
        self: &Arc<Self>,
        interval: Duration,
        retention: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a restart does not
            // race job submission.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let swept = registry.sweep_expired(retention).await;
                if swept > 0 {
                    tracing::info!("Retention sweep removed {} finished jobs", swept);
                }
            }
        })
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
