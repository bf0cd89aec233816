//! Alert delivery contract.
//!
//! Implementations are side-effecting sinks (desktop notifications, speech,
//! logs). Delivery failures are reported through the return value and never
//! interrupt monitoring.

use crate::tracker::Alert;

pub const ALERT_TITLE: &str = "Focus Monitor";
pub const ALERT_MESSAGE: &str =
    "Your gaze has drifted away from the screen. Take a moment to re-evaluate your task schedule.";

/// A human-visible alert sink.
pub trait Notifier: Send {
    /// Deliver one alert. Returns `true` on confirmed delivery.
    ///
    /// Must return within a bounded time; errors are logged by the
    /// implementation, not raised.
    fn notify(&self, message: &str, title: &str, subtitle: &str) -> bool;
}

impl<N: Notifier + Sync + ?Sized> Notifier for std::sync::Arc<N> {
    fn notify(&self, message: &str, title: &str, subtitle: &str) -> bool {
        (**self).notify(message, title, subtitle)
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&self, message: &str, title: &str, subtitle: &str) -> bool {
        (**self).notify(message, title, subtitle)
    }
}

/// Subtitle shown with the n-th alert of a session.
pub fn alert_subtitle(alert: &Alert) -> String {
    format!("Warning #{}", alert.sequence)
}

/// Send the standard alert text for `alert` through `notifier`.
pub fn deliver(notifier: &dyn Notifier, alert: &Alert) -> bool {
    let subtitle = alert_subtitle(alert);
    let delivered = notifier.notify(ALERT_MESSAGE, ALERT_TITLE, &subtitle);
    if delivered {
        tracing::info!(sequence = alert.sequence, "alert delivered");
    } else {
        tracing::warn!(sequence = alert.sequence, "alert delivery failed");
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GazeDirection;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, String, String)>>,
        succeed: bool,
    }

    impl Notifier for Recording {
        fn notify(&self, message: &str, title: &str, subtitle: &str) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push((message.into(), title.into(), subtitle.into()));
            self.succeed
        }
    }

    fn alert(sequence: u64) -> Alert {
        Alert { sequence, direction: GazeDirection::Left, run_length: 90 }
    }

    #[test]
    fn test_deliver_uses_standard_text() {
        let n = Recording { succeed: true, ..Default::default() };
        assert!(deliver(&n, &alert(3)));
        let calls = n.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, ALERT_MESSAGE);
        assert_eq!(calls[0].1, ALERT_TITLE);
        assert_eq!(calls[0].2, "Warning #3");
    }

    #[test]
    fn test_deliver_reports_failure() {
        let n = Recording::default();
        assert!(!deliver(&n, &alert(1)));
    }
}
