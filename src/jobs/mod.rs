//! # Job Management
//!
//! The background-job side of the service: records and their registry,
//! admission control, cancellation, progress estimation, and the
//! orchestrator that composes them to drive each submitted transcription
//! to a terminal state.

pub mod cancel;
pub mod gate;
pub mod orchestrator;
pub mod progress;
pub mod record;
pub mod registry;

pub use cancel::{CancelFlag, CancellationController};
pub use gate::ConcurrencyGate;
pub use orchestrator::{CancelOutcome, JobOrchestrator};
pub use record::{JobRecord, JobState, Segment, TranscriptionResult};
pub use registry::JobRegistry;
