//! # Audio Utilities
//!
//! File-level audio concerns. Transcoding and chunking of uploads is done by
//! the external media tool; the only thing the job pipeline needs locally is
//! the duration probe.

pub mod probe;

pub use probe::{DurationProbe, FfprobeDurationProbe};
