//! # Job Records
//!
//! The data tracked for one submitted transcription request, from submission
//! to its terminal outcome. Records are owned by the registry; the task
//! driving a job is the only writer, and status queries receive cloned
//! snapshots rather than references into live state.
//!
//! ## State Machine:
//! `queued → model_loading → (model_downloading)* → transcribing →
//! {completed | failed | canceled}`, with `canceling` reachable from any
//! non-terminal state once a cancellation request has been accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current phase of a transcription job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, waiting for an execution slot
    Queued,
    /// Admitted; the model is being prepared
    ModelLoading,
    /// The worker reported it is fetching model data from a remote source
    ModelDownloading,
    /// Audio is being transcribed
    Transcribing,
    /// Cancellation accepted, waiting for the work to actually stop
    Canceling,
    /// Finished with a result
    Completed,
    /// Finished with an error
    Failed,
    /// Stopped on request
    Canceled,
}

impl JobState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Canceled
        )
    }

    /// Status string used in API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::ModelLoading => "model_loading",
            JobState::ModelDownloading => "model_downloading",
            JobState::Transcribing => "transcribing",
            JobState::Canceling => "canceling",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One transcribed span of audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start offset in seconds
    pub start: f64,
    /// End offset in seconds
    pub end: f64,
    /// Text recognized within the span
    pub text: String,
}

/// The artifact a finished worker produces: full text, the ordered segment
/// list, and the detected language code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
    pub language: String,
}

/// Everything tracked about one job.
///
/// ## Field invariants:
/// - `result` is present exactly when `status` is `completed`
/// - `error` is present exactly when `status` is `failed` or `canceled`
/// - `ended_at` is set exactly once, when a terminal state is reached
/// - `progress` never decreases while the job is running
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub status: JobState,
    /// Percentage, 0.0 to 100.0
    pub progress: f64,
    /// Total audio duration in seconds, set once the probe has run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TranscriptionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human-readable description of what the job is doing right now
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a freshly queued record for a submission.
    pub fn new(job_id: Uuid, model_name: &str) -> Self {
        Self {
            job_id,
            status: JobState::Queued,
            progress: 0.0,
            duration: None,
            result: None,
            error: None,
            message: Some("Job queued".to_string()),
            model_name: model_name.to_string(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }
}
