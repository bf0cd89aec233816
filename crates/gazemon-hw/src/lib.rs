//! gazemon-hw — Frame acquisition and landmark oracles.
//!
//! Provides V4L2-based camera access, the external landmark helper
//! protocol, JSONL landmark recordings for camera-less replay, and the
//! per-frame monitoring pipeline that ties them to the core tracker.

pub mod camera;
pub mod frame;
pub mod monitor;
pub mod oracle;
pub mod replay;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo};
pub use frame::{Frame, FrameError, PixelFormat};
pub use monitor::{FrameOutcome, Monitor, MonitorError, SkipCounters, Step};
pub use oracle::{LandmarkOracle, OracleError, ProcessOracle};
pub use replay::{ReplayOracle, ReplaySource};
pub use source::{FrameSource, SourceError};
