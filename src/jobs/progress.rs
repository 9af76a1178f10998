//! # Progress Estimation
//!
//! Turns worker output into the 0–100 percentage stored on the job record.
//! Two sources feed it: segment timestamps (the end bound of each
//! `[.. --> ..]` line, divided by the probed audio duration) and explicit
//! percentages reported by the worker. Explicit reports win; timestamp
//! estimates are additionally rate-limited so a fast worker does not turn
//! every decoded line into a record write.
//!
//! Progress never regresses. Whisper segment timestamps can overlap
//! slightly, so a smaller estimate after a larger one is normal and dropped.

use std::time::{Duration, Instant};

/// Per-job progress state. Owned by the task driving the job.
pub struct ProgressEstimator {
    reported: f64,
    report_interval: Duration,
    last_report: Option<Instant>,
}

impl ProgressEstimator {
    /// `report_interval` throttles timestamp-derived updates; explicit worker
    /// reports and the 100% mark always pass through.
    pub fn new(report_interval: Duration) -> Self {
        Self {
            reported: 0.0,
            report_interval,
            last_report: None,
        }
    }

    /// Last value that was accepted.
    pub fn current(&self) -> f64 {
        self.reported
    }

    /// Estimate from a segment end timestamp. Returns the new percentage if
    /// the record should be updated, None otherwise. An unknown or
    /// non-positive total yields no update.
    pub fn from_timestamp(&mut self, current_seconds: f64, total_seconds: Option<f64>) -> Option<f64> {
        let total = total_seconds.filter(|t| *t > 0.0)?;
        let percent = round2((current_seconds / total * 100.0).min(100.0));

        if percent <= self.reported {
            return None;
        }

        // Throttle intermediate updates; the final value is never held back.
        if percent < 100.0 {
            if let Some(last) = self.last_report {
                if last.elapsed() < self.report_interval {
                    return None;
                }
            }
        }

        self.accept(percent);
        Some(percent)
    }

    /// Apply a percentage the worker reported directly.
    pub fn explicit(&mut self, percent: f64) -> Option<f64> {
        let percent = round2(percent.clamp(0.0, 100.0));
        if percent <= self.reported {
            return None;
        }
        self.accept(percent);
        Some(percent)
    }

    fn accept(&mut self, percent: f64) {
        self.reported = percent;
        self.last_report = Some(Instant::now());
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
