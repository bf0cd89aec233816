//! Per-frame monitoring pipeline shared by the daemon and the offline CLI.
//!
//! A [`Monitor`] owns one frame source, one landmark oracle, the classifier,
//! the session's tracker, and the alert sink. [`Monitor::step`] runs exactly
//! one frame through them and never fails: per-frame problems are counted
//! and reported as a [`Step`] variant.

use crate::frame::Frame;
use crate::oracle::{LandmarkOracle, OracleError};
use crate::source::FrameSource;
use gazemon_core::notifier;
use gazemon_core::{
    Alert, ClassifyError, ConfigError, DistractionTracker, GazeClassifier, GazeSample,
    MonitorConfig, Notifier, SessionStats,
};
use std::time::Duration;
use thiserror::Error;

/// Upper bound on the pause between attempts on a failing source.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("landmark oracle error: {0}")]
    Oracle(#[from] OracleError),
    #[error("classification failed: {0}")]
    Classify(#[from] ClassifyError),
    #[error("invalid monitor config: {0}")]
    Config(#[from] ConfigError),
}

/// What happened to one acquired frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// The oracle found no face; tracker untouched.
    NoFace,
    /// Classified and fed to the tracker.
    Tracked {
        sample: GazeSample,
        alert: Option<Alert>,
    },
}

/// Result of one loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Frame { sequence: u32, outcome: FrameOutcome },
    /// The source failed to produce a frame.
    SourceFailed,
    /// A frame was acquired but dropped by the oracle or classifier.
    Skipped { sequence: u32 },
    EndOfStream,
}

/// Frames dropped before reaching the tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipCounters {
    pub no_face: u64,
    pub errors: u64,
}

pub struct Monitor {
    source: Box<dyn FrameSource>,
    oracle: Box<dyn LandmarkOracle>,
    classifier: GazeClassifier,
    tracker: DistractionTracker,
    notifier: Box<dyn Notifier>,
    skipped: SkipCounters,
    frame_interval: Duration,
    source_failures: u32,
}

impl Monitor {
    pub fn new(
        config: &MonitorConfig,
        source: Box<dyn FrameSource>,
        oracle: Box<dyn LandmarkOracle>,
        notifier: Box<dyn Notifier>,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        Ok(Self {
            source,
            oracle,
            classifier: GazeClassifier::new(config.gaze_center_threshold),
            tracker: DistractionTracker::from_config(config),
            notifier,
            skipped: SkipCounters::default(),
            frame_interval: config.frame_interval(),
            source_failures: 0,
        })
    }

    /// Classify one frame and feed the tracker. Delivers an alert if one fires.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameOutcome, MonitorError> {
        let Some(landmarks) = self.oracle.detect(frame)? else {
            return Ok(FrameOutcome::NoFace);
        };
        let sample = self.classifier.classify(&landmarks, frame.width, frame.height)?;

        let alert = self.tracker.observe(&sample, frame.timestamp);
        if let Some(a) = &alert {
            // The alert counts as sent whether or not delivery succeeds.
            notifier::deliver(self.notifier.as_ref(), a);
        }
        tracing::trace!(
            seq = frame.sequence,
            direction = %sample.direction,
            x = sample.x_ratio,
            y = sample.y_ratio,
            run = self.tracker.state().run_length,
            "frame classified"
        );
        Ok(FrameOutcome::Tracked { sample, alert })
    }

    /// Acquire and process the next frame.
    pub fn step(&mut self) -> Step {
        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Step::EndOfStream,
            Err(e) => {
                self.source_failures = self.source_failures.saturating_add(1);
                self.skipped.errors += 1;
                // Only the first failure of a streak is a warning.
                if self.source_failures == 1 {
                    tracing::warn!(error = %e, "frame acquisition failed; skipping");
                } else {
                    tracing::debug!(error = %e, failures = self.source_failures, "frame acquisition failed again");
                }
                return Step::SourceFailed;
            }
        };
        if self.source_failures > 0 {
            tracing::info!(failures = self.source_failures, "frame source recovered");
            self.source_failures = 0;
        }

        let sequence = frame.sequence;
        match self.process_frame(&frame) {
            Ok(FrameOutcome::NoFace) => {
                tracing::debug!(seq = sequence, "no face detected");
                self.skipped.no_face += 1;
                Step::Frame {
                    sequence,
                    outcome: FrameOutcome::NoFace,
                }
            }
            Ok(outcome) => Step::Frame { sequence, outcome },
            Err(e) => {
                tracing::warn!(seq = sequence, error = %e, "frame skipped");
                self.skipped.errors += 1;
                Step::Skipped { sequence }
            }
        }
    }

    /// Consecutive source failures since the last good frame.
    pub fn source_failures(&self) -> u32 {
        self.source_failures
    }

    /// How long to wait before asking a failing source again: one frame
    /// interval doubled per consecutive failure, capped at [`MAX_RETRY_DELAY`].
    /// Zero while the source is healthy.
    pub fn retry_delay(&self) -> Duration {
        retry_delay(self.frame_interval, self.source_failures)
    }

    pub fn stats(&self) -> SessionStats {
        self.tracker.stats()
    }

    pub fn skipped(&self) -> SkipCounters {
        self.skipped
    }

    pub fn tracker(&self) -> &DistractionTracker {
        &self.tracker
    }

    pub fn describe_source(&self) -> String {
        self.source.describe()
    }
}

fn retry_delay(base: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let factor = 1u32 << (failures - 1).min(16);
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}
