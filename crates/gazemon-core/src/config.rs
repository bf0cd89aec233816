use crate::classifier::DEFAULT_CENTER_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("gaze_center_threshold must be in (0, 1], got {0}")]
    CenterThreshold(f32),
    #[error("distraction_seconds must be a non-negative number, got {0}")]
    DistractionSeconds(f32),
    #[error("cooldown_seconds must be a non-negative number of representable seconds, got {0}")]
    CooldownSeconds(f32),
    #[error("fps must be positive")]
    Fps,
    #[error("unknown notify gate {0:?} (expected \"focused\" or \"distracted\")")]
    NotifyGate(String),
}

/// Which sustained state arms a notification.
///
/// `Focused` reproduces the prototype this monitor grew out of, which fired
/// after a long run of CENTER frames. `Distracted` fires after a long run of
/// off-centre frames, which is what the alert text describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyGate {
    Focused,
    #[default]
    Distracted,
}

impl NotifyGate {
    pub fn admits(self, is_focused: bool) -> bool {
        match self {
            NotifyGate::Focused => is_focused,
            NotifyGate::Distracted => !is_focused,
        }
    }
}

impl FromStr for NotifyGate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "focused" => Ok(NotifyGate::Focused),
            "distracted" => Ok(NotifyGate::Distracted),
            other => Err(ConfigError::NotifyGate(other.to_string())),
        }
    }
}

impl fmt::Display for NotifyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyGate::Focused => f.write_str("focused"),
            NotifyGate::Distracted => f.write_str("distracted"),
        }
    }
}

/// Tunables for the classifier and the distraction tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub gaze_center_threshold: f32,
    /// Seconds of same-direction gaze before an alert is armed.
    pub distraction_seconds: f32,
    /// Minimum seconds between two alerts.
    pub cooldown_seconds: f32,
    pub fps: u32,
    pub notify_gate: NotifyGate,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            gaze_center_threshold: DEFAULT_CENTER_THRESHOLD,
            distraction_seconds: 3.0,
            cooldown_seconds: 60.0,
            fps: 30,
            notify_gate: NotifyGate::default(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.gaze_center_threshold;
        if t.is_nan() || t <= 0.0 || t > 1.0 {
            return Err(ConfigError::CenterThreshold(t));
        }
        if !self.distraction_seconds.is_finite() || self.distraction_seconds < 0.0 {
            return Err(ConfigError::DistractionSeconds(self.distraction_seconds));
        }
        // Also rejects values too large to represent as a `Duration`.
        if Duration::try_from_secs_f32(self.cooldown_seconds).is_err() {
            return Err(ConfigError::CooldownSeconds(self.cooldown_seconds));
        }
        if self.fps == 0 {
            return Err(ConfigError::Fps);
        }
        Ok(())
    }

    /// `round(distraction_seconds * fps)`.
    pub fn distraction_threshold_frames(&self) -> u64 {
        (self.distraction_seconds as f64 * self.fps as f64).round() as u64
    }

    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f32(self.cooldown_seconds).unwrap_or(if self.cooldown_seconds > 0.0 {
            Duration::MAX
        } else {
            Duration::ZERO
        })
    }

    /// Nominal time between frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}
