//! gazemon-core — Gaze classification and distraction tracking.
//!
//! Turns per-frame iris landmarks into a discrete gaze direction and decides,
//! with a run-length threshold and a cooldown, when sustained gaze warrants
//! an alert. Pure logic: no camera, no OS calls.

pub mod classifier;
pub mod config;
pub mod cursor;
pub mod notifier;
pub mod stats;
pub mod tracker;
pub mod types;

pub use classifier::{classify, ClassifyError, GazeClassifier};
pub use config::{ConfigError, MonitorConfig, NotifyGate};
pub use notifier::Notifier;
pub use stats::SessionStats;
pub use tracker::{Alert, DistractionTracker, TrackerPolicy, TrackerState};
pub use types::{GazeDirection, GazeSample, IrisCenters, LandmarkFrame, Point};
