//! # Audio Duration Probe
//!
//! Progress estimation needs the total audio duration before transcription
//! starts, and the probe is the job's first hard precondition: no duration
//! means no progress tracking, so the job fails before any model resources
//! are touched.
//!
//! The production probe shells out to ffprobe, which is already present for
//! the upload re-encoding pipeline. It is kept behind a trait so job-level
//! tests can substitute a fixed duration.

use crate::error::JobError;
use async_trait::async_trait;
use std::path::Path;

/// Reports total audio duration in seconds for a file.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn duration_seconds(&self, path: &Path) -> Result<f64, JobError>;
}

/// ffprobe-backed implementation.
pub struct FfprobeDurationProbe;

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn duration_seconds(&self, path: &Path) -> Result<f64, JobError> {
        let output = tokio::process::Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|err| {
                JobError::DurationProbeFailed(format!("could not run ffprobe: {}", err))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JobError::DurationProbeFailed(format!(
                "ffprobe exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let duration: f64 = stdout.trim().parse().map_err(|_| {
            JobError::DurationProbeFailed(format!(
                "ffprobe produced no parseable duration: '{}'",
                stdout.trim()
            ))
        })?;

        if duration <= 0.0 {
            return Err(JobError::DurationProbeFailed(format!(
                "non-positive duration {} for {}",
                duration,
                path.display()
            )));
        }
        Ok(duration)
    }
}
