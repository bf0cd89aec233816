//! Desktop alert backends.
//!
//! Every backend shells out to a platform tool under a hard deadline; a hung
//! notification daemon can delay at most one frame by `timeout`.

use crate::config::NotifierKind;
use gazemon_core::Notifier;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Extra time `osascript` gets to exit after a dialog gives up.
const DIALOG_GRACE: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },
    #[error("wait failed: {0}")]
    Wait(#[from] std::io::Error),
}

/// Run `cmd` to completion, killing it once `timeout` elapses.
pub fn run_bounded(mut cmd: Command, timeout: Duration) -> Result<(), NotifyError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| NotifyError::Spawn {
            program: program.clone(),
            source,
        })?;

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            if status.success() {
                return Ok(());
            }
            return Err(NotifyError::Failed { program, status });
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(NotifyError::Timeout { program, timeout });
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Quote a value for embedding in an AppleScript string literal.
fn applescript_quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// macOS Notification Center via `osascript`.
pub struct OsascriptNotifier {
    pub timeout: Duration,
    pub sound: Option<String>,
}

impl OsascriptNotifier {
    fn script(&self, message: &str, title: &str, subtitle: &str) -> String {
        let mut script = format!(
            "display notification {} with title {} subtitle {}",
            applescript_quote(message),
            applescript_quote(title),
            applescript_quote(subtitle)
        );
        if let Some(sound) = &self.sound {
            script.push_str(&format!(" sound name {}", applescript_quote(sound)));
        }
        script
    }

    fn command(&self, message: &str, title: &str, subtitle: &str) -> Command {
        let mut cmd = Command::new("osascript");
        cmd.arg("-e").arg(self.script(message, title, subtitle));
        cmd
    }
}

/// Modal caution dialog via `osascript`, dismissed automatically after `timeout`.
///
/// The engine waits while the dialog is up, so `timeout` also bounds how many
/// frames the alert can cost.
pub struct DialogNotifier {
    pub timeout: Duration,
}

impl DialogNotifier {
    fn script(&self, message: &str, title: &str, subtitle: &str) -> String {
        format!(
            "display dialog {} with title {} buttons {{\"OK\"}} default button \"OK\" with icon caution giving up after {}",
            applescript_quote(message),
            applescript_quote(&format!("{title}: {subtitle}")),
            self.timeout.as_secs().max(1)
        )
    }

    fn command(&self, message: &str, title: &str, subtitle: &str) -> Command {
        let mut cmd = Command::new("osascript");
        cmd.arg("-e").arg(self.script(message, title, subtitle));
        cmd
    }
}

/// freedesktop notifications via `notify-send`.
pub struct NotifySendNotifier {
    pub timeout: Duration,
}

impl NotifySendNotifier {
    fn command(&self, message: &str, title: &str, subtitle: &str) -> Command {
        let mut cmd = Command::new("notify-send");
        cmd.arg("--app-name=gazemon")
            .arg("--urgency=normal")
            .arg(format!("{title}: {subtitle}"))
            .arg(message);
        cmd
    }
}

/// Spoken alert via macOS `say`.
pub struct SpeechNotifier {
    pub timeout: Duration,
}

impl SpeechNotifier {
    fn command(&self, message: &str, _title: &str, _subtitle: &str) -> Command {
        let mut cmd = Command::new("say");
        cmd.arg(message);
        cmd
    }
}

fn report(result: Result<(), NotifyError>, backend: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(backend, error = %err, "notification failed");
            false
        }
    }
}

impl Notifier for OsascriptNotifier {
    fn notify(&self, message: &str, title: &str, subtitle: &str) -> bool {
        report(run_bounded(self.command(message, title, subtitle), self.timeout), "osascript")
    }
}

impl Notifier for DialogNotifier {
    fn notify(&self, message: &str, title: &str, subtitle: &str) -> bool {
        // A dialog that gave up exits cleanly and still counts as delivered.
        let deadline = self.timeout.max(Duration::from_secs(1)) + DIALOG_GRACE;
        report(run_bounded(self.command(message, title, subtitle), deadline), "osascript dialog")
    }
}

impl Notifier for NotifySendNotifier {
    fn notify(&self, message: &str, title: &str, subtitle: &str) -> bool {
        report(run_bounded(self.command(message, title, subtitle), self.timeout), "notify-send")
    }
}

impl Notifier for SpeechNotifier {
    fn notify(&self, message: &str, title: &str, subtitle: &str) -> bool {
        report(run_bounded(self.command(message, title, subtitle), self.timeout), "say")
    }
}

/// Writes the alert to the log. Always succeeds.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, title: &str, subtitle: &str) -> bool {
        tracing::warn!(title, subtitle, "{message}");
        true
    }
}

/// Build the configured backend.
pub fn build(kind: NotifierKind, timeout: Duration) -> Box<dyn Notifier> {
    match kind.resolve() {
        NotifierKind::Osascript | NotifierKind::Auto => Box::new(OsascriptNotifier {
            timeout,
            sound: Some("Glass".to_string()),
        }),
        NotifierKind::Dialog => Box::new(DialogNotifier { timeout }),
        NotifierKind::NotifySend => Box::new(NotifySendNotifier { timeout }),
        NotifierKind::Say => Box::new(SpeechNotifier { timeout }),
        NotifierKind::Log => Box::new(LogNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_osascript_script_quotes() {
        let n = OsascriptNotifier { timeout: Duration::from_secs(1), sound: Some("Glass".into()) };
        let script = n.script("say \"hi\"", "Focus Monitor", "Warning #1");
        assert_eq!(
            script,
            "display notification \"say \\\"hi\\\"\" with title \"Focus Monitor\" subtitle \"Warning #1\" sound name \"Glass\""
        );
        let cmd = n.command("m", "t", "s");
        assert_eq!(cmd.get_program(), "osascript");
        assert_eq!(args(&cmd)[0], "-e");
    }

    #[test]
    fn test_osascript_without_sound() {
        let n = OsascriptNotifier { timeout: Duration::from_secs(1), sound: None };
        assert!(!n.script("m", "t", "s").contains("sound name"));
    }

    #[test]
    fn test_dialog_script() {
        let n = DialogNotifier { timeout: Duration::from_secs(5) };
        let script = n.script("look back", "Focus Monitor", "Warning #3");
        assert_eq!(
            script,
            "display dialog \"look back\" with title \"Focus Monitor: Warning #3\" buttons {\"OK\"} default button \"OK\" with icon caution giving up after 5"
        );
        assert_eq!(n.command("m", "t", "s").get_program(), "osascript");
    }

    #[test]
    fn test_dialog_gives_up_after_at_least_one_second() {
        let n = DialogNotifier { timeout: Duration::from_millis(200) };
        assert!(n.script("m", "t", "s").ends_with("giving up after 1"));
    }

    #[test]
    fn test_notify_send_args() {
        let n = NotifySendNotifier { timeout: Duration::from_secs(1) };
        let cmd = n.command("look back", "Focus Monitor", "Warning #2");
        assert_eq!(cmd.get_program(), "notify-send");
        let a = args(&cmd);
        assert_eq!(a[a.len() - 2], "Focus Monitor: Warning #2");
        assert_eq!(a[a.len() - 1], "look back");
    }

    #[test]
    fn test_speech_args() {
        let n = SpeechNotifier { timeout: Duration::from_secs(1) };
        assert_eq!(args(&n.command("hello", "t", "s")), vec!["hello".to_string()]);
    }

    #[test]
    fn test_log_notifier_succeeds() {
        assert!(LogNotifier.notify("m", "t", "s"));
    }

    #[test]
    fn test_build_log() {
        let n = build(NotifierKind::Log, Duration::from_secs(1));
        assert!(n.notify("m", "t", "s"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_bounded_success() {
        assert!(run_bounded(Command::new("true"), Duration::from_secs(5)).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_bounded_failure_status() {
        assert!(matches!(
            run_bounded(Command::new("false"), Duration::from_secs(5)),
            Err(NotifyError::Failed { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_bounded_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let started = Instant::now();
        let result = run_bounded(cmd, Duration::from_millis(100));
        assert!(matches!(result, Err(NotifyError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_run_bounded_missing_program() {
        let result = run_bounded(Command::new("gazemon-no-such-binary"), Duration::from_secs(1));
        assert!(matches!(result, Err(NotifyError::Spawn { .. })));
    }
}
