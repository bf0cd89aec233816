//! Distraction tracker: run-length state machine with a notification cooldown.
//!
//! Each classified frame is fed to [`DistractionTracker::observe`] exactly once.
//! Frames without a face never reach the tracker, so they neither extend nor
//! break a run.

use crate::config::{MonitorConfig, NotifyGate};
use crate::stats::SessionStats;
use crate::types::{GazeDirection, GazeSample};
use std::time::{Duration, Instant};

/// Mutable per-session counters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackerState {
    /// Consecutive frames with the same direction, not counting the first.
    pub run_length: u64,
    pub last_direction: GazeDirection,
    /// `None` until the first alert of the session.
    pub last_notification: Option<Instant>,
    pub total_frames: u64,
    pub focused_frames: u64,
    pub notification_count: u64,
}

/// Thresholds the tracker compares against, derived from [`MonitorConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerPolicy {
    pub threshold_frames: u64,
    pub cooldown: Duration,
    pub gate: NotifyGate,
}

impl From<&MonitorConfig> for TrackerPolicy {
    fn from(cfg: &MonitorConfig) -> Self {
        Self {
            threshold_frames: cfg.distraction_threshold_frames(),
            cooldown: cfg.cooldown(),
            gate: cfg.notify_gate,
        }
    }
}

/// Emitted when a notification should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    /// 1-based alert number within the session.
    pub sequence: u64,
    pub direction: GazeDirection,
    pub run_length: u64,
}

impl TrackerState {
    /// Advance the state by one classified frame. Returns an alert when one fires.
    pub fn step(&mut self, sample: &GazeSample, now: Instant, policy: &TrackerPolicy) -> Option<Alert> {
        if sample.direction != self.last_direction {
            self.run_length = 0;
            self.last_direction = sample.direction;
        } else {
            self.run_length += 1;
        }

        self.total_frames += 1;
        if sample.is_focused {
            self.focused_frames += 1;
        }

        if !policy.gate.admits(sample.is_focused) || self.run_length < policy.threshold_frames {
            return None;
        }

        let cooled_down = match self.last_notification {
            None => true,
            Some(last) => now.saturating_duration_since(last) > policy.cooldown,
        };
        if !cooled_down {
            return None;
        }

        self.last_notification = Some(now);
        self.notification_count += 1;
        Some(Alert {
            sequence: self.notification_count,
            direction: sample.direction,
            run_length: self.run_length,
        })
    }

    /// Percentage of classified frames that were focused (0 when empty).
    pub fn focus_rate(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        self.focused_frames as f64 / self.total_frames as f64 * 100.0
    }
}

/// Session-scoped owner of a [`TrackerState`].
pub struct DistractionTracker {
    policy: TrackerPolicy,
    state: TrackerState,
    session_id: String,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl DistractionTracker {
    /// Start a new session with zeroed counters.
    pub fn new(policy: TrackerPolicy) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(
            session = %session_id,
            threshold_frames = policy.threshold_frames,
            cooldown_secs = policy.cooldown.as_secs_f32(),
            gate = %policy.gate,
            "tracker session started"
        );
        Self {
            policy,
            state: TrackerState::default(),
            session_id,
            started_at: chrono::Utc::now(),
        }
    }

    pub fn from_config(cfg: &MonitorConfig) -> Self {
        Self::new(TrackerPolicy::from(cfg))
    }

    pub fn observe(&mut self, sample: &GazeSample, now: Instant) -> Option<Alert> {
        let alert = self.state.step(sample, now, &self.policy);
        if let Some(a) = &alert {
            tracing::info!(
                sequence = a.sequence,
                direction = %a.direction,
                run_length = a.run_length,
                "distraction alert"
            );
        }
        alert
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn policy(&self) -> &TrackerPolicy {
        &self.policy
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.session_id.clone(),
            started_at: self.started_at.to_rfc3339(),
            total_frames: self.state.total_frames,
            focused_frames: self.state.focused_frames,
            notification_count: self.state.notification_count,
            focus_rate: self.state.focus_rate(),
            last_direction: self.state.last_direction,
            run_length: self.state.run_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FPS: f64 = 30.0;

    fn sample(direction: GazeDirection) -> GazeSample {
        let (x, y) = match direction {
            GazeDirection::Center => (0.0, 0.0),
            GazeDirection::Left => (-0.8, 0.0),
            GazeDirection::Right => (0.8, 0.0),
            GazeDirection::Up => (0.0, -0.8),
            GazeDirection::Down => (0.0, 0.8),
        };
        GazeSample::new(direction, x, y)
    }

    fn policy(threshold_frames: u64, cooldown_secs: u64, gate: NotifyGate) -> TrackerPolicy {
        TrackerPolicy {
            threshold_frames,
            cooldown: Duration::from_secs(cooldown_secs),
            gate,
        }
    }

    fn at(base: Instant, frame: u64) -> Instant {
        base + Duration::from_secs_f64(frame as f64 / FPS)
    }

    #[test]
    fn test_direction_change_resets_run() {
        let all = [
            GazeDirection::Center,
            GazeDirection::Left,
            GazeDirection::Right,
            GazeDirection::Up,
            GazeDirection::Down,
        ];
        let p = policy(u64::MAX, 0, NotifyGate::Distracted);
        let base = Instant::now();
        for &d1 in &all {
            for &d2 in &all {
                if d1 == d2 {
                    continue;
                }
                let mut st = TrackerState::default();
                for i in 0..10 {
                    st.step(&sample(d1), at(base, i), &p);
                }
                st.step(&sample(d2), at(base, 10), &p);
                assert_eq!(st.run_length, 0, "{d1} -> {d2}");
                assert_eq!(st.last_direction, d2);
            }
        }
    }

    #[test]
    fn test_first_frame_same_as_initial_direction_increments() {
        let mut st = TrackerState::default();
        let p = policy(u64::MAX, 0, NotifyGate::Focused);
        st.step(&sample(GazeDirection::Center), Instant::now(), &p);
        assert_eq!(st.run_length, 1);
        assert_eq!(st.total_frames, 1);
        assert_eq!(st.focused_frames, 1);
    }

    #[test]
    fn test_focused_never_exceeds_total() {
        let mut st = TrackerState::default();
        let p = policy(5, 1, NotifyGate::Distracted);
        let base = Instant::now();
        let seq = [
            GazeDirection::Center,
            GazeDirection::Left,
            GazeDirection::Center,
            GazeDirection::Down,
            GazeDirection::Down,
        ];
        for (i, d) in seq.iter().cycle().take(200).enumerate() {
            st.step(&sample(*d), at(base, i as u64), &p);
            assert!(st.focused_frames <= st.total_frames);
        }
        assert_eq!(st.total_frames, 200);
        assert_eq!(st.focused_frames, 80);
        assert!((st.focus_rate() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_one_alert_per_cooldown_window() {
        let mut st = TrackerState::default();
        let p = policy(10, 60, NotifyGate::Focused);
        let base = Instant::now();
        let mut alerts = 0;
        // 30 s of continuous CENTER: well past the threshold, within one cooldown.
        for i in 0..900 {
            if st.step(&sample(GazeDirection::Center), at(base, i), &p).is_some() {
                alerts += 1;
            }
        }
        assert_eq!(alerts, 1);
        assert_eq!(st.notification_count, 1);
    }

    #[test]
    fn test_cooldown_short_gap_single_alert() {
        let p = policy(3, 10, NotifyGate::Distracted);
        let base = Instant::now();
        let mut st = TrackerState::default();

        for i in 0..4 {
            st.step(&sample(GazeDirection::Left), base + Duration::from_millis(i * 10), &p);
        }
        assert_eq!(st.notification_count, 1);

        // Break the run, then cross the threshold again 5 s later.
        st.step(&sample(GazeDirection::Up), base + Duration::from_secs(5), &p);
        for i in 0..4 {
            st.step(&sample(GazeDirection::Left), base + Duration::from_secs(5) + Duration::from_millis(i * 10), &p);
        }
        assert_eq!(st.notification_count, 1);
    }

    #[test]
    fn test_cooldown_long_gap_two_alerts() {
        let p = policy(3, 10, NotifyGate::Distracted);
        let base = Instant::now();
        let mut st = TrackerState::default();

        for i in 0..4 {
            st.step(&sample(GazeDirection::Left), base + Duration::from_millis(i * 10), &p);
        }
        st.step(&sample(GazeDirection::Up), base + Duration::from_secs(11), &p);
        for i in 0..4 {
            st.step(&sample(GazeDirection::Left), base + Duration::from_secs(12) + Duration::from_millis(i * 10), &p);
        }
        assert_eq!(st.notification_count, 2);
    }

    #[test]
    fn test_cooldown_is_strict() {
        let p = policy(0, 10, NotifyGate::Distracted);
        let base = Instant::now();
        let mut st = TrackerState::default();
        assert!(st.step(&sample(GazeDirection::Down), base, &p).is_some());
        assert!(st.step(&sample(GazeDirection::Down), base + Duration::from_secs(10), &p).is_none());
        assert!(st
            .step(&sample(GazeDirection::Down), base + Duration::from_secs(10) + Duration::from_millis(1), &p)
            .is_some());
    }

    #[test]
    fn test_sustained_right_literal_gate_never_fires() {
        let p = policy(90, 60, NotifyGate::Focused);
        let base = Instant::now();
        let mut st = TrackerState::default();
        for i in 0..900 {
            assert!(st.step(&sample(GazeDirection::Right), at(base, i), &p).is_none());
        }
        assert_eq!(st.notification_count, 0);
    }

    #[test]
    fn test_sustained_right_distracted_gate() {
        let p = policy(90, 60, NotifyGate::Distracted);
        let base = Instant::now();
        let mut st = TrackerState::default();
        let mut fired_at = Vec::new();
        for i in 0..2000u64 {
            if st.step(&sample(GazeDirection::Right), at(base, i), &p).is_some() {
                fired_at.push(i);
            }
        }
        // Frame 0 switches CENTER -> RIGHT (run 0); frame 90 reaches run 90.
        assert_eq!(fired_at[0], 90);
        assert_eq!(fired_at.iter().filter(|&&f| f < 900).count(), 1);
        // Next alert needs strictly more than 60 s (1800 frames) after frame 90.
        assert_eq!(fired_at[1], 90 + 1800 + 1);
        assert_eq!(fired_at.len(), 2);
    }

    #[test]
    fn test_alert_sequence_numbers() {
        let p = policy(0, 0, NotifyGate::Distracted);
        let base = Instant::now();
        let mut st = TrackerState::default();
        let a1 = st.step(&sample(GazeDirection::Up), base, &p).unwrap();
        let a2 = st.step(&sample(GazeDirection::Up), base + Duration::from_millis(1), &p).unwrap();
        assert_eq!(a1.sequence, 1);
        assert_eq!(a2.sequence, 2);
        assert_eq!(a2.run_length, 1);
        assert_eq!(a2.direction, GazeDirection::Up);
    }

    #[test]
    fn test_tracker_stats_snapshot() {
        let cfg = MonitorConfig::default();
        let mut tracker = DistractionTracker::from_config(&cfg);
        assert_eq!(tracker.policy().threshold_frames, 90);
        let now = Instant::now();
        tracker.observe(&sample(GazeDirection::Center), now);
        tracker.observe(&sample(GazeDirection::Left), now);
        let stats = tracker.stats();
        assert_eq!(stats.total_frames, 2);
        assert_eq!(stats.focused_frames, 1);
        assert_eq!(stats.last_direction, GazeDirection::Left);
        assert!((stats.focus_rate - 50.0).abs() < 1e-9);
        assert!(!stats.session_id.is_empty());
        assert_eq!(tracker.state().total_frames, 2);
    }

    #[test]
    fn test_huge_cooldown_does_not_panic() {
        let cfg = MonitorConfig { cooldown_seconds: 1e20, distraction_seconds: 0.0, ..Default::default() };
        let mut tracker = DistractionTracker::from_config(&cfg);
        assert_eq!(tracker.policy().cooldown, Duration::MAX);
        let base = Instant::now();
        assert!(tracker.observe(&sample(GazeDirection::Left), base).is_some());
        assert!(tracker.observe(&sample(GazeDirection::Left), at(base, 10_000)).is_none());
    }

    #[test]
    fn test_empty_focus_rate() {
        assert_eq!(TrackerState::default().focus_rate(), 0.0);
    }
}
