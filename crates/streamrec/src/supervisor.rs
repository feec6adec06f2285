//! Lifecycle Supervisor
//!
//! One task per launched capture. It drains the process's stderr, waits for
//! exit, and hands the classified outcome to the registry's exit transition.
//! That call is the task's only effect on the registry.

use crate::launcher::CaptureProcess;
use crate::registry::Recorder;
use crate::types::RecordingId;
use bytes::BytesMut;
use futures::StreamExt;
use std::collections::VecDeque;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::ChildStderr;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, FramedRead};

/// Retained stderr lines per capture.
const TAIL_LINES: usize = 8;
/// Retained stderr bytes per capture.
const TAIL_BYTES: usize = 2048;
/// How long to keep reading stderr after the leader exits. Surviving group
/// members may hold the pipe open indefinitely.
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// How a supervised process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exit status 0.
    Clean,
    /// Non-zero exit, death by signal, or a failed wait.
    Failed(String),
}

/// Bounded tail of a process's stderr.
#[derive(Debug, Default)]
pub(crate) struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    pub(crate) fn push(&mut self, line: String) {
        let mut line = line.trim_end().to_string();
        if line.is_empty() {
            return;
        }
        if line.len() > TAIL_BYTES {
            let mut end = TAIL_BYTES;
            while !line.is_char_boundary(end) {
                end -= 1;
            }
            line.truncate(end);
        }
        self.bytes += line.len();
        self.lines.push_back(line);
        while self.lines.len() > TAIL_LINES || self.bytes > TAIL_BYTES {
            if let Some(dropped) = self.lines.pop_front() {
                self.bytes -= dropped.len();
            }
        }
    }

    pub(crate) fn last_line(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }
}

/// Splits stderr at `\n` or `\r`, so carriage-return progress output from
/// encoders arrives as separate lines. A line longer than `max_len` is cut
/// there and the rest of it is skipped up to the next break.
#[derive(Debug)]
pub(crate) struct StderrLines {
    max_len: usize,
    skipping: bool,
}

impl StderrLines {
    pub(crate) fn new(max_len: usize) -> Self {
        Self {
            max_len,
            skipping: false,
        }
    }
}

impl Decoder for StderrLines {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<String>> {
        loop {
            let Some(end) = buf.iter().position(|b| matches!(b, b'\n' | b'\r')) else {
                if self.skipping {
                    buf.clear();
                    return Ok(None);
                }
                if buf.len() > self.max_len {
                    let line = lossy(&buf[..self.max_len]);
                    buf.clear();
                    self.skipping = true;
                    return Ok(Some(line));
                }
                return Ok(None);
            };

            let chunk = buf.split_to(end + 1);
            if std::mem::take(&mut self.skipping) {
                continue;
            }
            return Ok(Some(lossy(&chunk[..end.min(self.max_len)])));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<String>> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split();
        if std::mem::take(&mut self.skipping) {
            return Ok(None);
        }
        Ok(Some(lossy(&rest[..rest.len().min(self.max_len)])))
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Turn a wait result into an outcome, citing the last stderr line.
pub(crate) fn classify(result: io::Result<ExitStatus>, tail: &StderrTail) -> ExitOutcome {
    let detail = match result {
        Ok(status) if status.success() => return ExitOutcome::Clean,
        Ok(status) => status.to_string(),
        Err(e) => format!("wait failed: {}", e),
    };

    match tail.last_line() {
        Some(line) => ExitOutcome::Failed(format!("{}: {}", detail, line)),
        None => ExitOutcome::Failed(detail),
    }
}

/// Spawn the supervisor task for `id`.
pub(crate) fn spawn(recorder: Recorder, id: RecordingId, process: CaptureProcess) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = supervise(&id, process).await;
        recorder.finish(&id, outcome);
    })
}

async fn supervise(id: &RecordingId, process: CaptureProcess) -> ExitOutcome {
    let mut child = process.into_child();
    let mut lines = child
        .stderr
        .take()
        .map(|s| FramedRead::new(s, StderrLines::new(TAIL_BYTES)));
    let mut tail = StderrTail::default();

    let result = loop {
        tokio::select! {
            line = next_line(&mut lines) => match line {
                Some(line) => record_line(id, &mut tail, line),
                None => lines = None,
            },
            status = child.wait() => break status,
        }
    };

    if lines.is_some() {
        let drain = async {
            while let Some(line) = next_line(&mut lines).await {
                record_line(id, &mut tail, line);
            }
        };
        if tokio::time::timeout(STDERR_GRACE, drain).await.is_err() {
            tracing::debug!(recording.id = %id, "stderr still open after exit, not waiting further");
        }
    }

    classify(result, &tail)
}

/// Next stderr line; pends forever once the stream is gone so `select!`
/// falls through to the wait branch.
async fn next_line(lines: &mut Option<FramedRead<ChildStderr, StderrLines>>) -> Option<String> {
    match lines {
        Some(reader) => match reader.next().await {
            Some(Ok(line)) => Some(line),
            Some(Err(_)) | None => None,
        },
        None => std::future::pending().await,
    }
}

fn record_line(id: &RecordingId, tail: &mut StderrTail, line: String) {
    tracing::debug!(recording.id = %id, "capture: {}", line);
    tail.push(line);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn status(raw: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(raw)
    }

    #[test]
    fn tail_keeps_last_lines() {
        let mut tail = StderrTail::default();
        for i in 0..20 {
            tail.push(format!("line {i}"));
        }
        assert_eq!(tail.lines.len(), TAIL_LINES);
        assert_eq!(tail.last_line(), Some("line 19"));
    }

    #[test]
    fn tail_is_byte_bounded() {
        let mut tail = StderrTail::default();
        tail.push("a".repeat(1500));
        tail.push("b".repeat(1500));
        assert_eq!(tail.lines.len(), 1);
        assert!(tail.last_line().unwrap().starts_with('b'));
    }

    #[test]
    fn tail_cuts_oversized_lines() {
        let mut tail = StderrTail::default();
        tail.push("x".repeat(10 * TAIL_BYTES));
        assert_eq!(tail.lines.len(), 1);
        assert_eq!(tail.last_line().unwrap().len(), TAIL_BYTES);

        // Never split a multibyte character.
        let mut tail = StderrTail::default();
        tail.push(format!("a{}", "é".repeat(TAIL_BYTES)));
        let kept = tail.last_line().unwrap();
        assert!(kept.len() <= TAIL_BYTES);
        assert!(kept.ends_with('é'));
    }

    fn decode_all(codec: &mut StderrLines, input: &[u8]) -> Vec<String> {
        let mut buf = BytesMut::from(input);
        let mut lines = Vec::new();
        while let Some(line) = codec.decode_eof(&mut buf).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn carriage_returns_break_lines() {
        let mut codec = StderrLines::new(TAIL_BYTES);
        let lines = decode_all(
            &mut codec,
            b"Input #0, hls\nframe=1 speed=1x \rframe=2 speed=1x \rConversion failed!\r\n",
        );
        assert_eq!(
            lines,
            vec![
                "Input #0, hls",
                "frame=1 speed=1x ",
                "frame=2 speed=1x ",
                "Conversion failed!",
                "",
            ]
        );
    }

    #[test]
    fn unterminated_output_is_capped() {
        let mut codec = StderrLines::new(16);
        let mut buf = BytesMut::from(&[b'x'; 100][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("x".repeat(16)));
        assert!(buf.is_empty());

        // The rest of the runaway line is dropped, the next one is kept.
        buf.extend_from_slice(&[b'y'; 100]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"yyy\nexit\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("exit".to_string()));
    }

    #[test]
    fn long_terminated_line_is_cut() {
        let mut codec = StderrLines::new(4);
        let lines = decode_all(&mut codec, b"abcdefgh\rok\rtail");
        assert_eq!(lines, vec!["abcd", "ok", "tail"]);
    }

    #[test]
    fn tail_ignores_blank_lines() {
        let mut tail = StderrTail::default();
        tail.push("pipe closed".to_string());
        tail.push("   ".to_string());
        assert_eq!(tail.last_line(), Some("pipe closed"));
    }

    #[cfg(unix)]
    #[test]
    fn clean_exit() {
        let tail = StderrTail::default();
        assert_eq!(classify(Ok(status(0)), &tail), ExitOutcome::Clean);
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_cites_stderr() {
        let mut tail = StderrTail::default();
        tail.push("pipe closed".to_string());
        // Raw wait status: exit code in the high byte.
        let outcome = classify(Ok(status(1 << 8)), &tail);
        assert_eq!(
            outcome,
            ExitOutcome::Failed("exit status: 1: pipe closed".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn signal_exit() {
        let tail = StderrTail::default();
        match classify(Ok(status(libc::SIGINT)), &tail) {
            ExitOutcome::Failed(reason) => assert!(reason.starts_with("signal: 2")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn wait_error() {
        let tail = StderrTail::default();
        let outcome = classify(Err(io::Error::other("interrupted")), &tail);
        assert_eq!(outcome, ExitOutcome::Failed("wait failed: interrupted".to_string()));
    }
}
