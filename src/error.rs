//! # Error Handling
//!
//! Two layers of errors live here:
//!
//! - **JobError**: everything that can go wrong while a transcription job is
//!   being admitted, resourced, or executed. These end up stored on the job
//!   record (`error` field) or returned from a submission attempt.
//! - **AppError**: the HTTP-facing error type. Implements actix-web's
//!   `ResponseError` so handlers can bubble errors with `?` and clients get a
//!   consistent JSON body.
//!
//! ## JSON Response Format:
//! All HTTP errors return JSON with a consistent structure:
//! ```json
//! {
//!   "error": {
//!     "type": "bad_request",
//!     "message": "unknown model name: enormous",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Failures in the lifecycle of a single transcription job.
///
/// ## Categories:
/// - **InvalidInput**: the submission itself is unusable (empty upload,
///   unknown model name). Surfaced before a job record is created.
/// - **DurationProbeFailed**: the audio duration could not be determined.
///   Without a duration there is no progress tracking, so the job fails
///   before the model is touched.
/// - **ResourceBusy**: a different model is loaded and still in use; the
///   acquire attempt is refused rather than queued behind the switch.
/// - **ResourceLoadFailed**: the model itself failed to load; the slot is
///   left empty.
/// - **ExecutionFailed**: non-zero worker exit, a decoded error event, or a
///   corrupt result artifact.
/// - **OutputMissing**: the worker exited cleanly but produced no result
///   artifact. Kept distinct from ExecutionFailed so the condition is
///   visible in the stored error message.
/// - **Canceled**: the job was stopped on request. Not a fault, but carried
///   through the same channel so the orchestrator has one terminal path.
/// - **Internal**: anything unanticipated. Always logged with context before
///   being stored.
#[derive(Debug)]
pub enum JobError {
    InvalidInput(String),
    DurationProbeFailed(String),
    ResourceBusy(String),
    ResourceLoadFailed(String),
    ExecutionFailed(String),
    OutputMissing(String),
    Canceled(String),
    Internal(String),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            JobError::DurationProbeFailed(msg) => write!(f, "Duration probe failed: {}", msg),
            JobError::ResourceBusy(msg) => write!(f, "Model busy: {}", msg),
            JobError::ResourceLoadFailed(msg) => write!(f, "Model load failed: {}", msg),
            JobError::ExecutionFailed(msg) => write!(f, "Transcription failed: {}", msg),
            JobError::OutputMissing(msg) => write!(f, "Transcription output missing: {}", msg),
            JobError::Canceled(msg) => write!(f, "Canceled: {}", msg),
            JobError::Internal(msg) => write!(f, "Unexpected internal error: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

/// HTTP-facing error type for request handlers.
///
/// ## HTTP Status Code Mapping:
/// - Internal → 500 (Internal Server Error)
/// - BadRequest/ValidationError → 400 (Bad Request)
/// - NotFound → 404 (Not Found)
#[derive(Debug)]
pub enum AppError {
    /// Server-side problems (orchestrator wiring, I/O failures)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// User input failed validation rules
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Submission-time job errors map onto client-visible HTTP errors.
/// Anything that can only happen after a job record exists never travels
/// this way; it is stored on the record instead.
impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::InvalidInput(msg) => AppError::BadRequest(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

/// Type alias for Results that use the HTTP error type.
pub type AppResult<T> = Result<T, AppError>;
