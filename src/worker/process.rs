//! # Process-Backed Transcription
//!
//! Runs the transcriber as a supervised child process. The command is
//! configurable and receives three appended arguments:
//! `<input-audio> <artifact-path> <model-name>`. The child reports status on
//! stdout/stderr using the line protocol of [`super::protocol`], writes the
//! result artifact on success, and exits 0. It is expected to honor SIGTERM
//! by announcing cancellation and shutting down; SIGKILL follows after the
//! configured grace period if it does not.

use crate::error::JobError;
use crate::worker::{RunningWork, Transcriber, WorkRequest};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// Configuration for launching transcriber processes.
#[derive(Debug, Clone)]
pub struct ProcessWorkerSettings {
    /// Program and leading arguments, e.g. `["python3", "transcribe.py"]`
    pub command: Vec<String>,
    /// How long a SIGTERM'd child may take to exit before SIGKILL
    pub grace_period: Duration,
}

/// [`Transcriber`] that spawns one child process per job.
pub struct ProcessTranscriber {
    settings: ProcessWorkerSettings,
}

impl ProcessTranscriber {
    pub fn new(settings: ProcessWorkerSettings) -> Self {
        Self { settings }
    }
}

impl Transcriber for ProcessTranscriber {
    fn begin(&self, request: WorkRequest) -> Result<RunningWork, JobError> {
        let (program, leading_args) = self
            .settings
            .command
            .split_first()
            .ok_or_else(|| JobError::Internal("transcriber command is empty".to_string()))?;

        let mut child = tokio::process::Command::new(program)
            .args(leading_args)
            .arg(&request.input)
            .arg(&request.artifact)
            .arg(&request.model_name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                JobError::ExecutionFailed(format!("failed to spawn transcriber: {}", err))
            })?;

        tracing::info!(
            "Spawned transcriber pid={:?} model={} input={}",
            child.id(),
            request.model_name,
            request.input.display()
        );

        // Both output channels feed one chunk stream; the child may report
        // status on either, like whisper printing segments on stdout while
        // warnings land on stderr.
        let (tx, rx) = mpsc::channel::<Vec<u8>>(64);
        if let Some(stdout) = child.stdout.take() {
            spawn_pump(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_pump(stderr, tx);
        }

        Ok(RunningWork::from_process(
            child,
            rx,
            self.settings.grace_period,
        ))
    }
}

/// Forward raw bytes from one child stream into the chunk channel until EOF.
fn spawn_pump<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!("Worker output stream closed: {}", err);
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::cancel::CancelFlag;
    use crate::worker::protocol::{StatusEvent, StatusStreamDecoder, WorkerPhase};

    fn sh_transcriber(script: &str) -> ProcessTranscriber {
        ProcessTranscriber::new(ProcessWorkerSettings {
            // Appended args arrive as $1 (input), $2 (artifact), $3 (model).
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string(), "worker".to_string()],
            grace_period: Duration::from_millis(300),
        })
    }

    fn request(dir: &tempfile::TempDir) -> WorkRequest {
        WorkRequest {
            input: dir.path().join("input.wav"),
            artifact: dir.path().join("result.json"),
            model_name: "tiny".to_string(),
            cancel: CancelFlag::new(),
        }
    }

    async fn drain(work: &mut RunningWork) -> Vec<StatusEvent> {
        let mut decoder = StatusStreamDecoder::new();
        let mut events = Vec::new();
        while let Some(chunk) = work.next_chunk().await {
            events.extend(decoder.feed(&chunk));
        }
        events.extend(decoder.finish());
        events
    }

    #[tokio::test]
    async fn test_child_output_and_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let transcriber = sh_transcriber(
            r#"echo '{"status": "started"}'
               printf '{"text": "hi", "segments": [], "language": "en"}' > "$2"
               echo '[00:00.000 --> 00:03.000]  hi'"#,
        );

        let request = request(&dir);
        let artifact = request.artifact.clone();
        let mut work = transcriber.begin(request).unwrap();

        let events = drain(&mut work).await;
        assert_eq!(
            events,
            vec![
                StatusEvent::Phase(WorkerPhase::Started),
                StatusEvent::SegmentEnd { seconds: 3.0 },
            ]
        );

        let exit = work.wait().await;
        assert!(exit.success);
        assert!(artifact.exists());
    }

    #[tokio::test]
    async fn test_nonzero_exit_reported() {
        let dir = tempfile::tempdir().unwrap();
        let transcriber = sh_transcriber(
            r#"echo '{"status": "error", "message": "model file corrupt"}' >&2
               exit 3"#,
        );

        let mut work = transcriber.begin(request(&dir)).unwrap();
        let events = drain(&mut work).await;
        assert_eq!(
            events,
            vec![StatusEvent::Errored {
                code: None,
                message: "model file corrupt".to_string()
            }]
        );

        let exit = work.wait().await;
        assert!(!exit.success);
        assert!(exit.detail.unwrap().contains("code 3"));
    }

    #[tokio::test]
    async fn test_stop_escalates_to_sigkill() {
        let dir = tempfile::tempdir().unwrap();
        // The child ignores SIGTERM, so only the escalation can end it.
        let transcriber = sh_transcriber(r#"trap '' TERM; sleep 30"#);

        let work = transcriber.begin(request(&dir)).unwrap();
        let started = std::time::Instant::now();
        work.stop().await;
        // Grace period is 300ms; well before the 30s sleep.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stop_tolerates_already_exited_child() {
        let dir = tempfile::tempdir().unwrap();
        let transcriber = sh_transcriber("true");

        let mut work = transcriber.begin(request(&dir)).unwrap();
        // Drain to EOF so the child has certainly exited.
        while work.next_chunk().await.is_some() {}
        work.stop().await;
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_begin() {
        let dir = tempfile::tempdir().unwrap();
        let transcriber = ProcessTranscriber::new(ProcessWorkerSettings {
            command: vec!["/nonexistent/transcriber".to_string()],
            grace_period: Duration::from_secs(1),
        });
        let err = transcriber.begin(request(&dir)).unwrap_err();
        assert!(matches!(err, JobError::ExecutionFailed(_)));
    }
}
