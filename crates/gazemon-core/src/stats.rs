use crate::types::GazeDirection;
use serde::{Deserialize, Serialize};

/// Point-in-time view of a monitoring session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    /// RFC 3339 wall-clock start time.
    pub started_at: String,
    pub total_frames: u64,
    pub focused_frames: u64,
    pub notification_count: u64,
    /// Focused share of classified frames, in percent.
    pub focus_rate: f64,
    pub last_direction: GazeDirection,
    pub run_length: u64,
}

impl SessionStats {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }

    /// One-line human summary, e.g. for shutdown logs.
    pub fn summary(&self) -> String {
        format!(
            "frames={} focused={} focus_rate={:.1}% alerts={}",
            self.total_frames, self.focused_frames, self.focus_rate, self.notification_count
        )
    }
}
