//! # Worker Execution
//!
//! The orchestrator does not care how transcription actually runs. It asks a
//! [`Transcriber`] to begin work on one input file and receives a
//! [`RunningWork`]: a stream of raw output chunks (decoded by
//! [`protocol::StatusStreamDecoder`]) plus a way to await or stop the
//! underlying work.
//!
//! Two implementations exist:
//! - [`process::ProcessTranscriber`] supervises an external transcriber
//!   child process, the mode the server ships with.
//! - [`task::spawn_blocking_work`] runs a closure on the blocking thread
//!   pool and routes its status lines through the same byte protocol, for
//!   backends that can run embedded.

pub mod process;
pub mod protocol;
pub mod task;

use crate::error::JobError;
use crate::jobs::cancel::CancelFlag;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What a transcriber needs to start one unit of work.
pub struct WorkRequest {
    /// Audio file to transcribe
    pub input: PathBuf,
    /// Where the result artifact must be written
    pub artifact: PathBuf,
    /// Model the work should run with
    pub model_name: String,
    /// Cooperative cancellation flag for in-process backends
    pub cancel: CancelFlag,
}

/// The capability of executing transcription work.
pub trait Transcriber: Send + Sync {
    fn begin(&self, request: WorkRequest) -> Result<RunningWork, JobError>;
}

/// How a finished unit of work ended.
#[derive(Debug)]
pub struct WorkExit {
    pub success: bool,
    /// Exit-code text or failure description for the record's error message
    pub detail: Option<String>,
}

/// One executing unit of work, either a child process or a blocking task.
#[derive(Debug)]
pub struct RunningWork {
    chunks: mpsc::Receiver<Vec<u8>>,
    driver: WorkDriver,
}

#[derive(Debug)]
enum WorkDriver {
    Process { child: Child, grace: Duration },
    Task { handle: JoinHandle<Result<(), JobError>> },
}

impl RunningWork {
    pub(crate) fn from_process(child: Child, chunks: mpsc::Receiver<Vec<u8>>, grace: Duration) -> Self {
        Self {
            chunks,
            driver: WorkDriver::Process { child, grace },
        }
    }

    pub(crate) fn from_task(
        handle: JoinHandle<Result<(), JobError>>,
        chunks: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        Self {
            chunks,
            driver: WorkDriver::Task { handle },
        }
    }

    /// Next raw output chunk, None at end of stream.
    pub async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.chunks.recv().await
    }

    /// Wait for the work to finish on its own.
    pub async fn wait(self) -> WorkExit {
        match self.driver {
            WorkDriver::Process { mut child, .. } => match child.wait().await {
                Ok(status) if status.success() => WorkExit {
                    success: true,
                    detail: None,
                },
                Ok(status) => WorkExit {
                    success: false,
                    detail: Some(match status.code() {
                        Some(code) => format!("transcriber exited with code {}", code),
                        None => "transcriber terminated by signal".to_string(),
                    }),
                },
                Err(err) => WorkExit {
                    success: false,
                    detail: Some(format!("failed to reap transcriber: {}", err)),
                },
            },
            WorkDriver::Task { handle } => match handle.await {
                Ok(Ok(())) => WorkExit {
                    success: true,
                    detail: None,
                },
                Ok(Err(err)) => WorkExit {
                    success: false,
                    detail: Some(err.to_string()),
                },
                Err(err) => WorkExit {
                    success: false,
                    detail: Some(format!("worker task died: {}", err)),
                },
            },
        }
    }

    /// Stop the work and wait until it has actually stopped.
    ///
    /// For a child process this sends SIGTERM, allows the grace period, then
    /// escalates to SIGKILL. Termination races (the process exiting on its
    /// own first) are tolerated. For an in-process task the cancel flag has
    /// already been set by the caller; the task is expected to notice it
    /// within one polling interval, so this just waits for it to return.
    pub async fn stop(self) {
        let RunningWork { chunks, driver } = self;
        // Closing the chunk channel first unblocks a worker that is mid-way
        // through reporting status nobody will read anymore.
        drop(chunks);
        match driver {
            WorkDriver::Process { mut child, grace } => {
                if let Some(pid) = child.id() {
                    // SIGTERM first so the worker can announce cancellation
                    // and clean up. An ESRCH from a process that already
                    // exited is fine.
                    unsafe {
                        libc::kill(pid as libc::pid_t, libc::SIGTERM);
                    }
                } else {
                    let _ = child.wait().await;
                    return;
                }

                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(Ok(status)) => {
                        tracing::debug!("Transcriber stopped after SIGTERM: {}", status);
                    }
                    Ok(Err(err)) => {
                        tracing::warn!("Error reaping transcriber after SIGTERM: {}", err);
                    }
                    Err(_) => {
                        tracing::warn!(
                            "Transcriber ignored SIGTERM for {:?}, sending SIGKILL",
                            grace
                        );
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                    }
                }
            }
            WorkDriver::Task { handle } => {
                if let Err(err) = handle.await {
                    tracing::warn!("Worker task died during cancellation: {}", err);
                }
            }
        }
    }
}
