//! # Worker Status Protocol
//!
//! Workers report what they are doing over a line-oriented channel that mixes
//! machine-readable JSON records with whisper's human-readable verbose
//! output. The decoder consumes raw byte chunks as they arrive (chunks need
//! not align with line boundaries), reassembles lines, and yields one
//! [`StatusEvent`] per complete line.
//!
//! ## Line forms, tried in order:
//! 1. A flat JSON record with a `status` discriminator and optional `code`,
//!    `message`, `progress`, `duration` fields:
//!    `{"status": "info", "code": "audio_duration", "message": "Audio duration: 12.5s"}`
//! 2. A segment timestamp range, `[MM:SS.mmm --> MM:SS.mmm]` (hours optional),
//!    whose end bound becomes an implicit progress signal.
//! 3. Anything else decodes to [`StatusEvent::Ignored`]. The protocol is
//!    best-effort; an unrecognized line must never fail the job.
//!
//! Byte sequences that are not valid UTF-8 are decoded lossily per line, so
//! one mangled line cannot poison the rest of the stream.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Phase markers a worker can announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Model is being loaded from local storage
    Loading,
    /// Model data is being fetched from a remote source
    Downloading,
    /// Transcription proper has started
    Started,
}

/// One decoded line of worker output.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// Total audio duration in seconds
    Duration { seconds: f64 },
    /// Device or acceleration information, informational only
    DeviceInfo { message: String },
    /// The worker moved to a new phase
    Phase(WorkerPhase),
    /// Explicit progress percentage reported by the worker
    Progress { percent: f64 },
    /// End bound of a transcribed segment, in seconds
    SegmentEnd { seconds: f64 },
    /// The worker reported an error
    Errored {
        code: Option<String>,
        message: String,
    },
    /// The worker acknowledged cancellation
    Canceled { message: Option<String> },
    /// Line matched no known form and carries no information
    Ignored,
}

/// Incremental line decoder over one output channel.
///
/// Not restartable: feed chunks until EOF, then call [`finish`] to flush a
/// trailing line that arrived without a newline.
///
/// [`finish`]: StatusStreamDecoder::finish
pub struct StatusStreamDecoder {
    buf: Vec<u8>,
}

impl StatusStreamDecoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Consume one chunk and return the events for every line it completed.
    /// A trailing partial line (including one cut mid multi-byte character)
    /// is buffered until the remainder arrives.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StatusEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let event = decode_line(line.trim_end_matches('\r').trim());
            if !matches!(event, StatusEvent::Ignored) {
                events.push(event);
            }
        }
        events
    }

    /// Flush the buffered remainder at end of stream.
    pub fn finish(mut self) -> Option<StatusEvent> {
        if self.buf.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf);
        let event = decode_line(line.trim_end_matches('\r').trim());
        self.buf.clear();
        match event {
            StatusEvent::Ignored => None,
            event => Some(event),
        }
    }
}

impl Default for StatusStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn timestamp_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\[((?:\d{1,2}:)?\d{1,2}:\d{2}\.\d{3})\s*-->\s*((?:\d{1,2}:)?\d{1,2}:\d{2}\.\d{3})\]",
        )
        .expect("timestamp range pattern")
    })
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(\.\d+)?)").expect("number pattern"))
}

/// Decode one complete line.
fn decode_line(line: &str) -> StatusEvent {
    if line.is_empty() {
        return StatusEvent::Ignored;
    }

    if let Ok(Value::Object(record)) = serde_json::from_str::<Value>(line) {
        if let Some(status) = record.get("status").and_then(Value::as_str) {
            return decode_record(status, &record);
        }
        return StatusEvent::Ignored;
    }

    if let Some(caps) = timestamp_range_re().captures(line) {
        if let Some(seconds) = parse_timestamp(&caps[2]) {
            return StatusEvent::SegmentEnd { seconds };
        }
    }

    StatusEvent::Ignored
}

/// Decode a structured status record given its discriminator.
fn decode_record(status: &str, record: &serde_json::Map<String, Value>) -> StatusEvent {
    let code = record.get("code").and_then(Value::as_str);
    let message = record.get("message").and_then(Value::as_str);

    match status {
        "info" if code == Some("device") => StatusEvent::DeviceInfo {
            message: message.unwrap_or("").to_string(),
        },
        "info" => {
            // Duration arrives either as a numeric field or, for records
            // tagged audio_duration, embedded in the message text
            // ("Audio duration: 2785.08s").
            let seconds = record.get("duration").and_then(Value::as_f64).or_else(|| {
                if code == Some("audio_duration") {
                    message.and_then(parse_number)
                } else {
                    None
                }
            });
            match seconds {
                Some(seconds) if seconds > 0.0 => StatusEvent::Duration { seconds },
                _ => StatusEvent::Ignored,
            }
        }
        "loading" => StatusEvent::Phase(WorkerPhase::Loading),
        "downloading" | "model_downloading" => StatusEvent::Phase(WorkerPhase::Downloading),
        "started" | "transcribing" => StatusEvent::Phase(WorkerPhase::Started),
        "progress" => match record.get("progress").and_then(Value::as_f64) {
            Some(percent) => StatusEvent::Progress { percent },
            None => StatusEvent::Ignored,
        },
        "error" => StatusEvent::Errored {
            code: code.map(str::to_string),
            message: message.unwrap_or("Worker reported an error").to_string(),
        },
        "canceled" => StatusEvent::Canceled {
            message: message.map(str::to_string),
        },
        _ => StatusEvent::Ignored,
    }
}

/// Parse `MM:SS.mmm` or `HH:MM:SS.mmm` into seconds.
fn parse_timestamp(text: &str) -> Option<f64> {
    let parts: Vec<&str> = text.split(':').collect();
    match parts.as_slice() {
        [minutes, seconds] => {
            let minutes: f64 = minutes.parse().ok()?;
            let seconds: f64 = seconds.parse().ok()?;
            Some(minutes * 60.0 + seconds)
        }
        [hours, minutes, seconds] => {
            let hours: f64 = hours.parse().ok()?;
            let minutes: f64 = minutes.parse().ok()?;
            let seconds: f64 = seconds.parse().ok()?;
            Some(hours * 3600.0 + minutes * 60.0 + seconds)
        }
        _ => None,
    }
}

/// First decimal number embedded in free-form text.
fn parse_number(text: &str) -> Option<f64> {
    number_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<StatusEvent> {
        let mut decoder = StatusStreamDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.feed(chunk));
        }
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn test_json_records() {
        let events = decode_all(&[
            b"{\"status\": \"loading\", \"message\": \"Loading model: tiny\"}\n" as &[u8],
            b"{\"status\": \"started\", \"message\": \"Transcription started\"}\n",
            b"{\"status\": \"progress\", \"progress\": 37.5}\n",
            b"{\"status\": \"canceled\", \"message\": \"Received SIGTERM\"}\n",
        ]);
        assert_eq!(
            events,
            vec![
                StatusEvent::Phase(WorkerPhase::Loading),
                StatusEvent::Phase(WorkerPhase::Started),
                StatusEvent::Progress { percent: 37.5 },
                StatusEvent::Canceled {
                    message: Some("Received SIGTERM".to_string())
                },
            ]
        );
    }

    #[test]
    fn test_duration_from_field_and_from_message() {
        let events = decode_all(&[
            b"{\"status\": \"info\", \"duration\": 12.5, \"message\": \"Audio duration: 12.5s\"}\n" as &[u8],
        ]);
        assert_eq!(events, vec![StatusEvent::Duration { seconds: 12.5 }]);

        let events = decode_all(&[
            b"{\"status\": \"info\", \"code\": \"audio_duration\", \"message\": \"Audio duration: 2785.08s\"}\n" as &[u8],
        ]);
        assert_eq!(events, vec![StatusEvent::Duration { seconds: 2785.08 }]);
    }

    #[test]
    fn test_device_info() {
        let events = decode_all(&[
            b"{\"status\": \"info\", \"code\": \"device\", \"message\": \"Using device: cuda:0\"}\n" as &[u8],
        ]);
        assert_eq!(
            events,
            vec![StatusEvent::DeviceInfo {
                message: "Using device: cuda:0".to_string()
            }]
        );
    }

    #[test]
    fn test_error_record() {
        let events =
            decode_all(&[b"{\"status\": \"error\", \"code\": \"oom\", \"message\": \"CUDA out of memory\"}\n"]);
        assert_eq!(
            events,
            vec![StatusEvent::Errored {
                code: Some("oom".to_string()),
                message: "CUDA out of memory".to_string()
            }]
        );
    }

    #[test]
    fn test_timestamp_lines_both_formats() {
        let events = decode_all(&[
            b"[00:00.000 --> 00:06.250]  Hello there.\n" as &[u8],
            b"[01:02:03.500 --> 01:02:07.250]  Much later.\n",
        ]);
        assert_eq!(
            events,
            vec![
                StatusEvent::SegmentEnd { seconds: 6.25 },
                StatusEvent::SegmentEnd { seconds: 3727.25 },
            ]
        );
    }

    #[test]
    fn test_line_split_across_chunks() {
        let events = decode_all(&[
            b"[00:00.000 --> 00:0" as &[u8],
            b"6.250]  split mid-line\n",
        ]);
        assert_eq!(events, vec![StatusEvent::SegmentEnd { seconds: 6.25 }]);
    }

    #[test]
    fn test_split_inside_multibyte_character() {
        // "génial" in the segment text, cut in the middle of the é bytes.
        let line = "[00:00.000 --> 00:02.000]  g\u{00e9}nial\n".as_bytes();
        let cut = line.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let events = decode_all(&[&line[..cut], &line[cut..]]);
        assert_eq!(events, vec![StatusEvent::SegmentEnd { seconds: 2.0 }]);
    }

    #[test]
    fn test_unrecognized_lines_are_discarded() {
        let events = decode_all(&[
            b"Detecting language using up to the first 30 seconds.\n" as &[u8],
            b"\n",
            b"{\"status\": \"completed\", \"message\": \"done\"}\n",
            b"not json [also not a timestamp\n",
        ]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_trailing_line_without_newline() {
        let mut decoder = StatusStreamDecoder::new();
        assert!(decoder.feed(b"{\"status\": \"progress\", \"progress\": 80}").is_empty());
        assert_eq!(
            decoder.finish(),
            Some(StatusEvent::Progress { percent: 80.0 })
        );
    }

    #[test]
    fn test_crlf_lines() {
        let events = decode_all(&[b"{\"status\": \"loading\"}\r\n"]);
        assert_eq!(events, vec![StatusEvent::Phase(WorkerPhase::Loading)]);
    }

    #[test]
    fn test_invalid_utf8_does_not_poison_stream() {
        let events = decode_all(&[
            b"\xff\xfe garbage bytes\n" as &[u8],
            b"{\"status\": \"started\"}\n",
        ]);
        assert_eq!(events, vec![StatusEvent::Phase(WorkerPhase::Started)]);
    }
}
