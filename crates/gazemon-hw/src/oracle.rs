//! Landmark oracles, the face-mesh stage of the pipeline.
//!
//! Inference itself happens outside this crate. [`ProcessOracle`] drives an
//! external helper over a line-oriented pipe protocol:
//!
//! ```text
//! -> {"width":640,"height":480,"sequence":12,"len":307200}\n<len raw grayscale bytes>
//! <- {"landmarks":[[x,y],...]}\n      (or {"landmarks":null} when no face)
//! ```
//!
//! Pipe I/O runs on two helper threads so a hung helper costs at most the
//! reply timeout per frame. A reply that arrives after its deadline is
//! discarded when the next frame is detected.

use crate::frame::Frame;
use gazemon_core::LandmarkFrame;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("failed to start landmark helper {command:?}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("landmark helper i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("landmark helper exited")]
    Exited,
    #[error("landmark helper did not answer within {0:?}")]
    Timeout(Duration),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Detects at most one face per frame.
pub trait LandmarkOracle: Send {
    /// Landmarks in frame-pixel coordinates, or `Ok(None)` when no face is found.
    fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkFrame>, OracleError>;
}

impl<O: LandmarkOracle + ?Sized> LandmarkOracle for Box<O> {
    fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkFrame>, OracleError> {
        (**self).detect(frame)
    }
}

#[derive(Debug, Serialize)]
struct RequestHeader {
    width: u32,
    height: u32,
    sequence: u32,
    len: usize,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    landmarks: Option<LandmarkFrame>,
}

/// Parse one reply line from a landmark helper.
pub fn parse_reply(line: &str) -> Result<Option<LandmarkFrame>, OracleError> {
    let reply: Reply = serde_json::from_str(line.trim())
        .map_err(|e| OracleError::Protocol(format!("bad reply {:?}: {e}", line.trim())))?;
    Ok(reply.landmarks.filter(|l| !l.is_empty()))
}

/// Default time a helper has to answer one frame.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Landmark oracle backed by a long-running child process.
///
/// Pipe I/O runs on two detached threads so a wedged helper costs the
/// caller at most `timeout` per frame. Replies that arrive after their
/// deadline are discarded in order.
pub struct ProcessOracle {
    command: String,
    child: Child,
    requests: SyncSender<Vec<u8>>,
    replies: Receiver<std::io::Result<String>>,
    timeout: Duration,
    /// Replies still owed for requests that timed out.
    stale: usize,
}

impl ProcessOracle {
    /// Spawn `command` through `sh -c` with piped stdin/stdout.
    pub fn spawn(command: &str, timeout: Duration) -> Result<Self, OracleError> {
        let spawn_err = |source| OracleError::Spawn {
            command: command.to_string(),
            source,
        };
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_err)?;

        let stdin = child.stdin.take().ok_or(OracleError::Exited)?;
        let stdout = child.stdout.take().ok_or(OracleError::Exited)?;

        // One request queued behind the one being written.
        let (requests, request_rx) = mpsc::sync_channel(1);
        let (reply_tx, replies) = mpsc::channel();
        thread::Builder::new()
            .name("gazemon-oracle-writer".into())
            .spawn(move || write_requests(stdin, request_rx))
            .map_err(spawn_err)?;
        thread::Builder::new()
            .name("gazemon-oracle-reader".into())
            .spawn(move || read_replies(stdout, reply_tx))
            .map_err(spawn_err)?;

        tracing::info!(command, pid = child.id(), timeout_ms = timeout.as_millis() as u64, "landmark helper started");

        Ok(Self {
            command: command.to_string(),
            child,
            requests,
            replies,
            timeout,
            stale: 0,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

fn write_requests(mut stdin: ChildStdin, requests: Receiver<Vec<u8>>) {
    for message in requests {
        if let Err(e) = stdin.write_all(&message).and_then(|()| stdin.flush()) {
            tracing::debug!(error = %e, "landmark helper stdin closed");
            break;
        }
    }
}

fn read_replies(stdout: ChildStdout, replies: Sender<std::io::Result<String>>) {
    let mut reader = BufReader::new(stdout);
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if replies.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = replies.send(Err(e));
                break;
            }
        }
    }
}

impl LandmarkOracle for ProcessOracle {
    fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkFrame>, OracleError> {
        let header = RequestHeader {
            width: frame.width,
            height: frame.height,
            sequence: frame.sequence,
            len: frame.data.len(),
        };
        let mut message = serde_json::to_vec(&header)
            .map_err(|e| OracleError::Protocol(format!("encode header: {e}")))?;
        message.push(b'\n');
        message.extend_from_slice(&frame.data);

        match self.requests.try_send(message) {
            Ok(()) => {}
            // Still writing earlier frames; this one is dropped unsent.
            Err(TrySendError::Full(_)) => return Err(OracleError::Timeout(self.timeout)),
            Err(TrySendError::Disconnected(_)) => return Err(OracleError::Exited),
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.replies.recv_timeout(remaining) {
                Ok(Ok(line)) if self.stale > 0 => {
                    self.stale -= 1;
                    tracing::debug!(reply = line.trim(), "discarding late helper reply");
                }
                Ok(Ok(line)) => return parse_reply(&line),
                Ok(Err(e)) => return Err(OracleError::Io(e)),
                Err(RecvTimeoutError::Timeout) => {
                    self.stale += 1;
                    return Err(OracleError::Timeout(self.timeout));
                }
                Err(RecvTimeoutError::Disconnected) => return Err(OracleError::Exited),
            }
        }
    }
}

impl Drop for ProcessOracle {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!(error = %e, "landmark helper already gone");
        }
        let _ = self.child.wait();
    }
}
