//! # In-Process Transcription
//!
//! Runs a unit of work on tokio's blocking thread pool instead of in a child
//! process. The closure receives a [`StatusWriter`] and reports through the
//! same line protocol a child process would print, so the orchestrator's
//! decode path is identical for both execution modes. Cooperative
//! cancellation happens through the job's [`CancelFlag`], which the closure
//! is expected to poll between units of work.
//!
//! [`CancelFlag`]: crate::jobs::cancel::CancelFlag

use crate::error::JobError;
use crate::worker::RunningWork;
use serde_json::Value;
use tokio::sync::mpsc;

/// Status-line sink handed to an in-process work closure.
///
/// Sends are best-effort: if the receiving side is gone the job is already
/// being torn down and there is nobody left to tell.
pub struct StatusWriter {
    tx: mpsc::Sender<Vec<u8>>,
}

impl StatusWriter {
    /// Emit one structured status record.
    pub fn record(&self, record: Value) {
        let mut line = record.to_string().into_bytes();
        line.push(b'\n');
        let _ = self.tx.blocking_send(line);
    }

    /// Emit one raw protocol line, e.g. a segment timestamp line.
    pub fn line(&self, text: &str) {
        let mut line = text.as_bytes().to_vec();
        line.push(b'\n');
        let _ = self.tx.blocking_send(line);
    }
}

/// Run `work` on the blocking pool and expose it as a [`RunningWork`].
pub fn spawn_blocking_work<F>(work: F) -> RunningWork
where
    F: FnOnce(StatusWriter) -> Result<(), JobError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Vec<u8>>(64);
    let writer = StatusWriter { tx };
    let handle = tokio::task::spawn_blocking(move || work(writer));
    RunningWork::from_task(handle, rx)
}
