//! HTTP request handlers, grouped by concern.

pub mod jobs;
pub mod model;
pub mod transcribe;

pub use jobs::{cancel_job, get_job_status};
pub use model::{list_models, model_status, unload_model};
pub use transcribe::submit_transcription;
