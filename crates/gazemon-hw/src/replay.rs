//! Landmark recordings for replaying a captured session without a camera.
//!
//! A recording is JSON Lines, one object per frame:
//!
//! ```text
//! {"width":640,"height":480,"landmarks":[[x,y],...]}
//! {"width":640,"height":480,"landmarks":null}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. [`open`] splits a
//! recording into a frame source and a matching oracle; the source hands
//! each frame's landmarks to the oracle through a channel.

use crate::frame::Frame;
use crate::oracle::{LandmarkOracle, OracleError};
use crate::source::{FrameSource, SourceError};
use gazemon_core::LandmarkFrame;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::{Duration, Instant};

/// One recorded frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayRecord {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub landmarks: Option<LandmarkFrame>,
}

/// Parse a single recording line. Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<ReplayRecord>, SourceError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| SourceError::Parse {
            line: line_no,
            message: e.to_string(),
        })
}

/// Frame source half of a recording.
pub struct ReplaySource {
    reader: Box<dyn BufRead + Send>,
    name: String,
    tx: Sender<(u32, Option<LandmarkFrame>)>,
    start: Instant,
    frame_interval: Duration,
    line_no: usize,
    sequence: u32,
    buf: String,
}

/// Oracle half of a recording.
pub struct ReplayOracle {
    rx: Receiver<(u32, Option<LandmarkFrame>)>,
}

/// Open a recording file. Frame timestamps advance by `1 / fps`.
pub fn open(path: &Path, fps: u32) -> Result<(ReplaySource, ReplayOracle), SourceError> {
    let file = File::open(path)?;
    Ok(from_reader(
        BufReader::new(file),
        path.display().to_string(),
        fps,
    ))
}

/// Build a replay pair over any buffered reader.
pub fn from_reader<R>(reader: R, name: String, fps: u32) -> (ReplaySource, ReplayOracle)
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let source = ReplaySource {
        reader: Box::new(reader),
        name,
        tx,
        start: Instant::now(),
        frame_interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
        line_no: 0,
        sequence: 0,
        buf: String::new(),
    };
    (source, ReplayOracle { rx })
}

impl ReplaySource {
    /// Synthetic capture time of frame `sequence`.
    fn timestamp_for(&self, sequence: u32) -> Instant {
        self.start + self.frame_interval * sequence
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let Some(record) = parse_line(&self.buf, self.line_no)? else {
                continue;
            };

            let sequence = self.sequence;
            self.sequence += 1;
            // The oracle may have been dropped (e.g. frame-only use); that is fine.
            let _ = self.tx.send((sequence, record.landmarks));

            return Ok(Some(Frame {
                data: Vec::new(),
                width: record.width,
                height: record.height,
                timestamp: self.timestamp_for(sequence),
                sequence,
            }));
        }
    }

    fn describe(&self) -> String {
        format!("replay {}", self.name)
    }
}

impl LandmarkOracle for ReplayOracle {
    fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkFrame>, OracleError> {
        loop {
            match self.rx.try_recv() {
                Ok((seq, landmarks)) if seq == frame.sequence => return Ok(landmarks),
                // Frames the caller never asked about.
                Ok((seq, _)) if seq < frame.sequence => continue,
                Ok((seq, _)) => {
                    return Err(OracleError::Protocol(format!(
                        "recording is at frame {seq}, asked for {}",
                        frame.sequence
                    )))
                }
                Err(TryRecvError::Empty) => {
                    return Err(OracleError::Protocol(format!(
                        "no recorded landmarks for frame {}",
                        frame.sequence
                    )))
                }
                Err(TryRecvError::Disconnected) => return Err(OracleError::Exited),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pair(text: &str) -> (ReplaySource, ReplayOracle) {
        from_reader(Cursor::new(text.to_string()), "test".into(), 30)
    }

    #[test]
    fn test_parse_line_skips_blank_and_comments() {
        assert!(parse_line("   ", 1).unwrap().is_none());
        assert!(parse_line("# header", 2).unwrap().is_none());
    }

    #[test]
    fn test_parse_line_error_has_line_number() {
        match parse_line("{\"width\": 1}", 7) {
            Err(SourceError::Parse { line, .. }) => assert_eq!(line, 7),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_replay_pairs_frames_with_landmarks() {
        let text = "# session\n\
            {\"width\":640,\"height\":480,\"landmarks\":[[1,2],[3,4]]}\n\
            \n\
            {\"width\":640,\"height\":480,\"landmarks\":null}\n";
        let (mut src, mut oracle) = pair(text);

        let f0 = src.next_frame().unwrap().unwrap();
        assert_eq!((f0.width, f0.height, f0.sequence), (640, 480, 0));
        assert_eq!(oracle.detect(&f0).unwrap().unwrap().len(), 2);

        let f1 = src.next_frame().unwrap().unwrap();
        assert_eq!(f1.sequence, 1);
        assert!(oracle.detect(&f1).unwrap().is_none());

        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_replay_timestamps_follow_fps() {
        let line = "{\"width\":2,\"height\":2}\n";
        let (mut src, _oracle) = pair(&line.repeat(31));
        let first = src.next_frame().unwrap().unwrap();
        let mut last = first.clone();
        while let Some(f) = src.next_frame().unwrap() {
            last = f;
        }
        assert_eq!(last.sequence, 30);
        let elapsed = last.timestamp - first.timestamp;
        assert!((elapsed.as_secs_f64() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_oracle_skips_frames_not_asked_for() {
        let line = "{\"width\":2,\"height\":2,\"landmarks\":[[0,0]]}\n";
        let (mut src, mut oracle) = pair(&line.repeat(3));
        let _ = src.next_frame().unwrap();
        let _ = src.next_frame().unwrap();
        let f2 = src.next_frame().unwrap().unwrap();
        assert!(oracle.detect(&f2).unwrap().is_some());
    }

    #[test]
    fn test_oracle_without_frame_errors() {
        let (src, mut oracle) = pair("");
        let frame = Frame {
            data: Vec::new(),
            width: 1,
            height: 1,
            timestamp: Instant::now(),
            sequence: 0,
        };
        assert!(matches!(oracle.detect(&frame), Err(OracleError::Protocol(_))));
        drop(src);
        assert!(matches!(oracle.detect(&frame), Err(OracleError::Exited)));
    }
}
