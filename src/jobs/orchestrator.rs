//! # Job Orchestration
//!
//! Drives one submitted transcription from `queued` to a terminal state:
//!
//! 1. Create the record and cancel flag, spawn the driving task
//! 2. Wait for admission (bounded concurrency)
//! 3. Probe the audio duration (hard precondition for progress tracking)
//! 4. Acquire the model slot
//! 5. Start the worker and relay its decoded status events into the record
//! 6. Apply exactly one terminal transition, releasing the slot and the
//!    admission grant and deleting temporary files on every path
//!
//! Cancellation is checked before committing to a model load, right after
//! the slot is acquired, and at every decoded event. The record only
//! reaches `canceled` once the underlying work has actually stopped.
//!
//! The driving task is the sole writer of its job's record; status queries
//! read consistent snapshots through the registry.

use crate::audio::probe::DurationProbe;
use crate::error::JobError;
use crate::jobs::cancel::{CancelFlag, CancellationController};
use crate::jobs::gate::ConcurrencyGate;
use crate::jobs::progress::ProgressEstimator;
use crate::jobs::record::{JobRecord, JobState, TranscriptionResult};
use crate::jobs::registry::JobRegistry;
use crate::model::catalog::ModelSize;
use crate::model::manager::{ModelHandle, ModelResourceManager};
use crate::state::JobMetrics;
use crate::worker::protocol::{StatusEvent, StatusStreamDecoder, WorkerPhase};
use crate::worker::{RunningWork, WorkRequest};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use uuid::Uuid;

/// Outcome of a cancellation request.
#[derive(Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// No such job
    NotFound,
    /// The job already finished; nothing to do
    AlreadyTerminal(JobState),
    /// Cancellation accepted; the job will reach `canceled` once its work
    /// has stopped
    Accepted,
}

/// What a decoded status event means for the running job.
enum EventDisposition {
    Continue,
    Fail(JobError),
    Canceled(String),
}

pub struct JobOrchestrator {
    registry: Arc<JobRegistry>,
    gate: ConcurrencyGate,
    manager: Arc<ModelResourceManager>,
    cancels: CancellationController,
    probe: Arc<dyn DurationProbe>,
    metrics: Arc<RwLock<JobMetrics>>,
    /// Where result artifacts are written
    output_dir: PathBuf,
    /// Throttle for timestamp-derived progress updates
    progress_interval: Duration,
}

impl JobOrchestrator {
    pub fn new(
        registry: Arc<JobRegistry>,
        gate: ConcurrencyGate,
        manager: Arc<ModelResourceManager>,
        probe: Arc<dyn DurationProbe>,
        metrics: Arc<RwLock<JobMetrics>>,
        output_dir: PathBuf,
        progress_interval: Duration,
    ) -> Self {
        Self {
            registry,
            gate,
            manager,
            cancels: CancellationController::new(),
            probe,
            metrics,
            output_dir,
            progress_interval,
        }
    }

    /// Accept a submission: validate it, create the queued record, and spawn
    /// the driving task. Returns the job id immediately.
    pub async fn submit(
        self: &Arc<Self>,
        input_path: PathBuf,
        model_name: &str,
    ) -> Result<Uuid, JobError> {
        ModelSize::from_str(model_name).map_err(JobError::InvalidInput)?;

        let job_id = self.registry.create(model_name).await;
        let flag = self.cancels.register(job_id);

        {
            let mut metrics = self.metrics.write().expect("metrics lock poisoned");
            metrics.submitted += 1;
            metrics.active += 1;
        }

        tracing::info!(
            "Queued transcription job {} (model '{}', input {})",
            job_id,
            model_name,
            input_path.display()
        );

        let orchestrator = Arc::clone(self);
        let model_name = model_name.to_string();
        tokio::spawn(async move {
            orchestrator.run(job_id, input_path, model_name, flag).await;
        });

        Ok(job_id)
    }

    /// Snapshot of a job's current record.
    pub async fn job_snapshot(&self, job_id: Uuid) -> Option<JobRecord> {
        self.registry.snapshot(job_id).await
    }

    /// Request cancellation. Idempotent on jobs that already finished.
    pub async fn request_cancel(&self, job_id: Uuid) -> CancelOutcome {
        match self.registry.status(job_id).await {
            None => CancelOutcome::NotFound,
            Some(status) if status.is_terminal() => CancelOutcome::AlreadyTerminal(status),
            Some(_) => {
                self.cancels.trigger(job_id);
                self.registry
                    .update(job_id, |record| {
                        if !record.status.is_terminal() {
                            record.status = JobState::Canceling;
                            record.message = Some("Cancellation requested".to_string());
                        }
                    })
                    .await;
                tracing::info!("Cancellation requested for job {}", job_id);
                CancelOutcome::Accepted
            }
        }
    }

    /// Drive one job to its terminal state.
    async fn run(self: Arc<Self>, job_id: Uuid, input: PathBuf, model_name: String, flag: CancelFlag) {
        let artifact = self.output_dir.join(format!("{}.json", job_id));
        let outcome = self
            .execute(job_id, &input, &artifact, &model_name, &flag)
            .await;
        self.finalize(job_id, outcome, &input, &artifact).await;
    }

    /// Everything between submission and the terminal transition.
    async fn execute(
        &self,
        job_id: Uuid,
        input: &Path,
        artifact: &Path,
        model_name: &str,
        flag: &CancelFlag,
    ) -> Result<TranscriptionResult, JobError> {
        // Admission. A cancellation arriving while queued resolves
        // immediately instead of waiting for a slot.
        let _slot = tokio::select! {
            slot = self.gate.admit() => slot,
            _ = flag.canceled() => {
                return Err(JobError::Canceled("Job canceled while queued".to_string()));
            }
        };

        // Checkpoint before committing to a model load.
        if flag.is_canceled() {
            return Err(JobError::Canceled("Job canceled before model load".to_string()));
        }

        self.registry
            .update(job_id, |record| {
                record.started_at = Some(Utc::now());
            })
            .await;
        self.set_phase(job_id, JobState::ModelLoading, &format!("Loading model '{}'", model_name))
            .await;

        let duration = self.probe.duration_seconds(input).await?;
        self.registry
            .update(job_id, |record| {
                if record.duration.is_none() {
                    record.duration = Some(duration);
                }
            })
            .await;

        let handle = self.manager.acquire(model_name).await?;

        // The slot must be given back on every path from here on.
        let result = self
            .execute_with_model(job_id, input, artifact, &handle, flag, duration)
            .await;
        self.manager.release().await;
        result
    }

    /// The portion of execution that holds a model acquisition.
    async fn execute_with_model(
        &self,
        job_id: Uuid,
        input: &Path,
        artifact: &Path,
        handle: &ModelHandle,
        flag: &CancelFlag,
        total_duration: f64,
    ) -> Result<TranscriptionResult, JobError> {
        // Checkpoint between acquiring the model and handing off to the
        // worker.
        if flag.is_canceled() {
            return Err(JobError::Canceled("Job canceled after model load".to_string()));
        }

        self.set_phase(job_id, JobState::Transcribing, "Transcribing audio").await;

        let work = handle.transcriber.begin(WorkRequest {
            input: input.to_path_buf(),
            artifact: artifact.to_path_buf(),
            model_name: handle.model_name.clone(),
            cancel: flag.clone(),
        })?;

        let exit = self.drive(job_id, work, flag, total_duration).await?;

        if flag.is_canceled() {
            return Err(JobError::Canceled("Job canceled during transcription".to_string()));
        }
        if !exit.success {
            return Err(JobError::ExecutionFailed(
                exit.detail.unwrap_or_else(|| "worker failed".to_string()),
            ));
        }

        // A clean exit does not guarantee output; a missing artifact is its
        // own failure, not a silent success.
        let text = match tokio::fs::read_to_string(artifact).await {
            Ok(text) => text,
            Err(_) => {
                return Err(JobError::OutputMissing(
                    "worker exited successfully but the result artifact was not found".to_string(),
                ));
            }
        };
        serde_json::from_str::<TranscriptionResult>(&text).map_err(|err| {
            JobError::ExecutionFailed(format!("result artifact did not parse: {}", err))
        })
    }

    /// Relay worker output into the record until the stream ends, then reap
    /// the work. Decoded error/cancel events and an externally requested
    /// cancellation stop the work before returning.
    async fn drive(
        &self,
        job_id: Uuid,
        mut work: RunningWork,
        flag: &CancelFlag,
        total_duration: f64,
    ) -> Result<crate::worker::WorkExit, JobError> {
        let mut decoder = StatusStreamDecoder::new();
        let mut progress = ProgressEstimator::new(self.progress_interval);

        loop {
            let chunk = tokio::select! {
                chunk = work.next_chunk() => chunk,
                _ = flag.canceled() => {
                    work.stop().await;
                    return Err(JobError::Canceled("Job canceled during transcription".to_string()));
                }
            };
            let Some(chunk) = chunk else { break };

            for event in decoder.feed(&chunk) {
                match self.apply_event(job_id, event, &mut progress, total_duration).await {
                    EventDisposition::Continue => {}
                    EventDisposition::Fail(err) => {
                        work.stop().await;
                        return Err(err);
                    }
                    EventDisposition::Canceled(message) => {
                        work.stop().await;
                        return Err(JobError::Canceled(message));
                    }
                }
            }

            // Progress update boundary doubles as a cancellation checkpoint.
            if flag.is_canceled() {
                work.stop().await;
                return Err(JobError::Canceled("Job canceled during transcription".to_string()));
            }
        }

        let exit = work.wait().await;

        // A final line without a trailing newline can still carry an error
        // or cancellation acknowledgement.
        if let Some(event) = decoder.finish() {
            match self.apply_event(job_id, event, &mut progress, total_duration).await {
                EventDisposition::Continue => {}
                EventDisposition::Fail(err) => return Err(err),
                EventDisposition::Canceled(message) => return Err(JobError::Canceled(message)),
            }
        }

        Ok(exit)
    }

    /// Fold one decoded status event into the job record.
    async fn apply_event(
        &self,
        job_id: Uuid,
        event: StatusEvent,
        progress: &mut ProgressEstimator,
        total_duration: f64,
    ) -> EventDisposition {
        match event {
            StatusEvent::Duration { seconds } => {
                self.registry
                    .update(job_id, |record| {
                        if record.duration.is_none() {
                            record.duration = Some(seconds);
                        }
                    })
                    .await;
            }
            StatusEvent::DeviceInfo { message } => {
                tracing::debug!("Job {} device info: {}", job_id, message);
            }
            StatusEvent::Phase(phase) => {
                let (state, message) = match phase {
                    WorkerPhase::Loading => (JobState::ModelLoading, "Loading model"),
                    WorkerPhase::Downloading => (JobState::ModelDownloading, "Downloading model data"),
                    WorkerPhase::Started => (JobState::Transcribing, "Transcribing audio"),
                };
                self.set_phase(job_id, state, message).await;
            }
            StatusEvent::Progress { percent } => {
                if let Some(percent) = progress.explicit(percent) {
                    self.store_progress(job_id, percent).await;
                }
            }
            StatusEvent::SegmentEnd { seconds } => {
                if let Some(percent) = progress.from_timestamp(seconds, Some(total_duration)) {
                    self.store_progress(job_id, percent).await;
                }
            }
            StatusEvent::Errored { code, message } => {
                let detail = match code {
                    Some(code) => format!("{} ({})", message, code),
                    None => message,
                };
                return EventDisposition::Fail(JobError::ExecutionFailed(detail));
            }
            StatusEvent::Canceled { message } => {
                return EventDisposition::Canceled(
                    message.unwrap_or_else(|| "Worker acknowledged cancellation".to_string()),
                );
            }
            StatusEvent::Ignored => {}
        }
        EventDisposition::Continue
    }

    /// Move the job to a non-terminal phase, unless a cancellation is
    /// already in flight or the job somehow finished.
    async fn set_phase(&self, job_id: Uuid, state: JobState, message: &str) {
        self.registry
            .update(job_id, |record| {
                if record.status.is_terminal() || record.status == JobState::Canceling {
                    return;
                }
                record.status = state;
                record.message = Some(message.to_string());
            })
            .await;
    }

    async fn store_progress(&self, job_id: Uuid, percent: f64) {
        self.registry
            .update(job_id, |record| {
                if percent > record.progress {
                    record.progress = percent;
                }
            })
            .await;
    }

    /// Apply the terminal transition exactly once and clean up.
    async fn finalize(
        &self,
        job_id: Uuid,
        outcome: Result<TranscriptionResult, JobError>,
        input: &Path,
        artifact: &Path,
    ) {
        match &outcome {
            Ok(_) => tracing::info!("Job {} completed", job_id),
            Err(JobError::Canceled(message)) => {
                tracing::info!("Job {} canceled: {}", job_id, message)
            }
            Err(JobError::Internal(message)) => {
                tracing::error!("Job {} hit an unexpected internal error: {}", job_id, message)
            }
            Err(err) => tracing::warn!("Job {} failed: {}", job_id, err),
        }

        enum TerminalKind {
            Completed,
            Canceled,
            Failed,
        }
        let kind = match &outcome {
            Ok(_) => TerminalKind::Completed,
            Err(JobError::Canceled(_)) => TerminalKind::Canceled,
            Err(_) => TerminalKind::Failed,
        };

        self.registry
            .update(job_id, |record| {
                if record.status.is_terminal() {
                    return;
                }
                match outcome {
                    Ok(result) => {
                        record.status = JobState::Completed;
                        record.progress = 100.0;
                        record.result = Some(result);
                        record.message = Some("Transcription completed".to_string());
                    }
                    Err(JobError::Canceled(message)) => {
                        record.status = JobState::Canceled;
                        record.error = Some(message);
                        record.message = Some("Job canceled".to_string());
                    }
                    Err(JobError::Internal(_)) => {
                        record.status = JobState::Failed;
                        record.error = Some("Unexpected internal error".to_string());
                        record.message = Some("Transcription failed".to_string());
                    }
                    Err(err) => {
                        record.status = JobState::Failed;
                        record.error = Some(err.to_string());
                        record.message = Some("Transcription failed".to_string());
                    }
                }
                record.ended_at = Some(Utc::now());
            })
            .await;

        self.cancels.remove(job_id);

        {
            let mut metrics = self.metrics.write().expect("metrics lock poisoned");
            metrics.active = metrics.active.saturating_sub(1);
            match kind {
                TerminalKind::Completed => metrics.completed += 1,
                TerminalKind::Canceled => metrics.canceled += 1,
                TerminalKind::Failed => metrics.failed += 1,
            }
        }

        remove_temp_file(input).await;
        remove_temp_file(artifact).await;
    }
}

/// Delete a temporary file, tolerating that it never existed.
async fn remove_temp_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed temporary file {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!("Could not remove {}: {}", path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::loader::{LoadedModel, ModelLoader};
    use crate::worker::task::spawn_blocking_work;
    use crate::worker::Transcriber;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedProbe(f64);

    #[async_trait]
    impl DurationProbe for FixedProbe {
        async fn duration_seconds(&self, _path: &Path) -> Result<f64, JobError> {
            Ok(self.0)
        }
    }

    struct FailingProbe;

    #[async_trait]
    impl DurationProbe for FailingProbe {
        async fn duration_seconds(&self, path: &Path) -> Result<f64, JobError> {
            Err(JobError::DurationProbeFailed(format!(
                "no stream info in {}",
                path.display()
            )))
        }
    }

    /// Emits a fixed script of protocol lines, optionally writes the
    /// artifact, then exits.
    struct ScriptedTranscriber {
        lines: Vec<String>,
        artifact_body: Option<String>,
        line_delay: Duration,
        exit: Result<(), String>,
    }

    impl ScriptedTranscriber {
        fn succeeding(lines: &[&str], artifact_body: &str) -> Arc<Self> {
            Arc::new(Self {
                lines: lines.iter().map(|s| s.to_string()).collect(),
                artifact_body: Some(artifact_body.to_string()),
                line_delay: Duration::ZERO,
                exit: Ok(()),
            })
        }
    }

    impl Transcriber for ScriptedTranscriber {
        fn begin(&self, request: WorkRequest) -> Result<RunningWork, JobError> {
            let lines = self.lines.clone();
            let artifact_body = self.artifact_body.clone();
            let delay = self.line_delay;
            let exit = self.exit.clone();
            let artifact = request.artifact;
            Ok(spawn_blocking_work(move |status| {
                for line in lines {
                    status.line(&line);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                if let Some(body) = artifact_body {
                    std::fs::write(&artifact, body)
                        .map_err(|err| JobError::Internal(err.to_string()))?;
                }
                exit.map_err(JobError::ExecutionFailed)
            }))
        }
    }

    /// Runs until its cancel flag is set, checking it every few ms.
    struct CancelableTranscriber;

    impl Transcriber for CancelableTranscriber {
        fn begin(&self, request: WorkRequest) -> Result<RunningWork, JobError> {
            let cancel = request.cancel;
            Ok(spawn_blocking_work(move |status| {
                status.line(r#"{"status": "started"}"#);
                for _ in 0..1000 {
                    if cancel.is_canceled() {
                        return Ok(());
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(())
            }))
        }
    }

    /// Records which models were loaded and hands out a shared transcriber.
    struct TestLoader {
        loads: Mutex<Vec<String>>,
        transcriber: Arc<dyn Transcriber>,
    }

    impl TestLoader {
        fn new(transcriber: Arc<dyn Transcriber>) -> Arc<Self> {
            Arc::new(Self {
                loads: Mutex::new(Vec::new()),
                transcriber,
            })
        }

        fn loads(&self) -> Vec<String> {
            self.loads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelLoader for TestLoader {
        async fn load(&self, model_name: &str) -> Result<LoadedModel, JobError> {
            self.loads.lock().unwrap().push(model_name.to_string());
            Ok(LoadedModel {
                model_name: model_name.to_string(),
                device: "cpu".to_string(),
                memory_bytes: 0,
                transcriber: Arc::clone(&self.transcriber),
            })
        }
    }

    struct Fixture {
        orchestrator: Arc<JobOrchestrator>,
        registry: Arc<JobRegistry>,
        loader: Arc<TestLoader>,
        manager: Arc<ModelResourceManager>,
        metrics: Arc<RwLock<JobMetrics>>,
        _dir: tempfile::TempDir,
    }

    fn fixture(transcriber: Arc<dyn Transcriber>, probe: Arc<dyn DurationProbe>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(JobRegistry::new());
        let loader = TestLoader::new(transcriber);
        let manager = Arc::new(ModelResourceManager::new(
            loader.clone() as Arc<dyn ModelLoader>,
            Duration::ZERO,
            "cpu".to_string(),
            None,
        ));
        let metrics = Arc::new(RwLock::new(JobMetrics::default()));
        let orchestrator = Arc::new(JobOrchestrator::new(
            Arc::clone(&registry),
            ConcurrencyGate::new(1),
            Arc::clone(&manager),
            probe,
            Arc::clone(&metrics),
            dir.path().to_path_buf(),
            Duration::ZERO,
        ));
        Fixture {
            orchestrator,
            registry,
            loader,
            manager,
            metrics,
            _dir: dir,
        }
    }

    async fn wait_for_terminal(orchestrator: &Arc<JobOrchestrator>, job_id: Uuid) -> JobRecord {
        for _ in 0..1000 {
            let snapshot = orchestrator.job_snapshot(job_id).await.expect("job exists");
            if snapshot.status.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} never reached a terminal state", job_id);
    }

    async fn wait_for_status(
        orchestrator: &Arc<JobOrchestrator>,
        job_id: Uuid,
        wanted: JobState,
    ) -> JobRecord {
        for _ in 0..1000 {
            let snapshot = orchestrator.job_snapshot(job_id).await.expect("job exists");
            if snapshot.status == wanted {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} never reached {:?}", job_id, wanted);
    }

    const ARTIFACT: &str = r#"{"text": "hello world", "segments": [{"start": 0.0, "end": 12.5, "text": "hello world"}], "language": "en"}"#;

    #[tokio::test]
    async fn test_successful_job_reports_monotonic_progress() {
        let transcriber = Arc::new(ScriptedTranscriber {
            lines: vec![
                r#"{"status": "started"}"#.to_string(),
                "[00:00.000 --> 00:06.250]  hello".to_string(),
                "[00:00.000 --> 00:12.500]  world".to_string(),
            ],
            artifact_body: Some(ARTIFACT.to_string()),
            line_delay: Duration::from_millis(20),
            exit: Ok(()),
        });
        let fx = fixture(transcriber, Arc::new(FixedProbe(12.5)));

        let job_id = fx
            .orchestrator
            .submit(fx._dir.path().join("in.wav"), "tiny")
            .await
            .unwrap();

        // Sample progress while the job runs; it must never decrease.
        let mut observed = Vec::new();
        let record = loop {
            let snapshot = fx.orchestrator.job_snapshot(job_id).await.unwrap();
            observed.push(snapshot.progress);
            if snapshot.status.is_terminal() {
                break snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert!(observed.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(record.status, JobState::Completed);
        assert_eq!(record.progress, 100.0);
        assert_eq!(record.duration, Some(12.5));
        assert!(record.error.is_none());
        assert!(record.ended_at.is_some());
        let result = record.result.expect("completed job has a result");
        assert_eq!(result.text, "hello world");
        assert_eq!(result.language, "en");

        assert_eq!(fx.loader.loads(), vec!["tiny".to_string()]);
        // Counters are updated just after the terminal transition.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let metrics = fx.metrics.read().unwrap();
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.active, 0);
    }

    #[tokio::test]
    async fn test_clean_exit_without_artifact_fails() {
        let transcriber = Arc::new(ScriptedTranscriber {
            lines: vec![r#"{"status": "started"}"#.to_string()],
            artifact_body: None,
            line_delay: Duration::ZERO,
            exit: Ok(()),
        });
        let fx = fixture(transcriber, Arc::new(FixedProbe(10.0)));

        let job_id = fx
            .orchestrator
            .submit(fx._dir.path().join("in.wav"), "tiny")
            .await
            .unwrap();
        let record = wait_for_terminal(&fx.orchestrator, job_id).await;

        assert_eq!(record.status, JobState::Failed);
        assert!(record.result.is_none());
        assert!(record.error.unwrap().contains("output missing"));
    }

    #[tokio::test]
    async fn test_decoded_error_event_fails_job() {
        let transcriber = ScriptedTranscriber::succeeding(
            &[r#"{"status": "error", "code": "oom", "message": "CUDA out of memory"}"#],
            ARTIFACT,
        );
        let fx = fixture(transcriber, Arc::new(FixedProbe(10.0)));

        let job_id = fx
            .orchestrator
            .submit(fx._dir.path().join("in.wav"), "tiny")
            .await
            .unwrap();
        let record = wait_for_terminal(&fx.orchestrator, job_id).await;

        assert_eq!(record.status, JobState::Failed);
        assert!(record.error.unwrap().contains("CUDA out of memory"));
    }

    #[tokio::test]
    async fn test_nonzero_worker_exit_fails_job() {
        let transcriber = Arc::new(ScriptedTranscriber {
            lines: vec![],
            artifact_body: None,
            line_delay: Duration::ZERO,
            exit: Err("model weights corrupt".to_string()),
        });
        let fx = fixture(transcriber, Arc::new(FixedProbe(10.0)));

        let job_id = fx
            .orchestrator
            .submit(fx._dir.path().join("in.wav"), "tiny")
            .await
            .unwrap();
        let record = wait_for_terminal(&fx.orchestrator, job_id).await;

        assert_eq!(record.status, JobState::Failed);
        assert!(record.error.unwrap().contains("model weights corrupt"));
    }

    #[tokio::test]
    async fn test_probe_failure_fails_before_model_load() {
        let transcriber = ScriptedTranscriber::succeeding(&[], ARTIFACT);
        let fx = fixture(transcriber, Arc::new(FailingProbe));

        let job_id = fx
            .orchestrator
            .submit(fx._dir.path().join("in.wav"), "tiny")
            .await
            .unwrap();
        let record = wait_for_terminal(&fx.orchestrator, job_id).await;

        assert_eq!(record.status, JobState::Failed);
        assert!(record.error.unwrap().contains("Duration probe failed"));
        assert!(fx.loader.loads().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_model_rejected_at_submission() {
        let transcriber = ScriptedTranscriber::succeeding(&[], ARTIFACT);
        let fx = fixture(transcriber, Arc::new(FixedProbe(10.0)));

        let err = fx
            .orchestrator
            .submit(fx._dir.path().join("in.wav"), "enormous")
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidInput(_)));
        // No record was created for the rejected submission.
        assert_eq!(fx.registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_while_queued_never_touches_model() {
        let fx = fixture(Arc::new(CancelableTranscriber), Arc::new(FixedProbe(10.0)));

        let blocker = fx
            .orchestrator
            .submit(fx._dir.path().join("a.wav"), "tiny")
            .await
            .unwrap();
        wait_for_status(&fx.orchestrator, blocker, JobState::Transcribing).await;

        // Gate capacity is 1, so the second job waits in the queue.
        let queued = fx
            .orchestrator
            .submit(fx._dir.path().join("b.wav"), "tiny")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            fx.orchestrator.job_snapshot(queued).await.unwrap().status,
            JobState::Queued
        );

        assert_eq!(
            fx.orchestrator.request_cancel(queued).await,
            CancelOutcome::Accepted
        );
        let record = wait_for_terminal(&fx.orchestrator, queued).await;
        assert_eq!(record.status, JobState::Canceled);
        assert!(record.result.is_none());
        assert!(record.error.is_some());
        // Only the blocker ever loaded a model.
        assert_eq!(fx.loader.loads(), vec!["tiny".to_string()]);

        fx.orchestrator.request_cancel(blocker).await;
        wait_for_terminal(&fx.orchestrator, blocker).await;
    }

    #[tokio::test]
    async fn test_cancel_during_transcription_releases_slot() {
        let fx = fixture(Arc::new(CancelableTranscriber), Arc::new(FixedProbe(10.0)));

        let job_id = fx
            .orchestrator
            .submit(fx._dir.path().join("in.wav"), "tiny")
            .await
            .unwrap();
        wait_for_status(&fx.orchestrator, job_id, JobState::Transcribing).await;

        assert_eq!(
            fx.orchestrator.request_cancel(job_id).await,
            CancelOutcome::Accepted
        );
        let record = wait_for_terminal(&fx.orchestrator, job_id).await;

        assert_eq!(record.status, JobState::Canceled);
        assert!(record.error.is_some());
        assert!(record.ended_at.is_some());
        // The acquisition was given back when the work stopped.
        assert_eq!(fx.manager.status().await.active_jobs, 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.metrics.read().unwrap().canceled, 1);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_on_finished_jobs() {
        let transcriber = ScriptedTranscriber::succeeding(&[], ARTIFACT);
        let fx = fixture(transcriber, Arc::new(FixedProbe(10.0)));

        let job_id = fx
            .orchestrator
            .submit(fx._dir.path().join("in.wav"), "tiny")
            .await
            .unwrap();
        wait_for_terminal(&fx.orchestrator, job_id).await;

        assert_eq!(
            fx.orchestrator.request_cancel(job_id).await,
            CancelOutcome::AlreadyTerminal(JobState::Completed)
        );
        assert_eq!(
            fx.orchestrator.request_cancel(Uuid::new_v4()).await,
            CancelOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_back_to_back_jobs_with_different_models() {
        let transcriber = ScriptedTranscriber::succeeding(&[], ARTIFACT);
        let fx = fixture(transcriber, Arc::new(FixedProbe(10.0)));

        let first = fx
            .orchestrator
            .submit(fx._dir.path().join("a.wav"), "tiny")
            .await
            .unwrap();
        let second = fx
            .orchestrator
            .submit(fx._dir.path().join("b.wav"), "base")
            .await
            .unwrap();

        let first = wait_for_terminal(&fx.orchestrator, first).await;
        let second = wait_for_terminal(&fx.orchestrator, second).await;
        assert_eq!(first.status, JobState::Completed);
        assert_eq!(second.status, JobState::Completed);

        // The second job waited for the first and then got a fresh load.
        assert_eq!(
            fx.loader.loads(),
            vec!["tiny".to_string(), "base".to_string()]
        );
    }
}
