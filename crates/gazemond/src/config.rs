use gazemon_core::MonitorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("{0}")]
    Invalid(#[from] gazemon_core::ConfigError),
    #[error("unknown notifier {0:?}")]
    Notifier(String),
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// V4L2 device path.
    Camera(String),
    /// JSONL landmark recording.
    Replay(PathBuf),
}

impl FromStr for SourceSpec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.strip_prefix("replay:") {
            Some(path) => SourceSpec::Replay(PathBuf::from(path)),
            None => SourceSpec::Camera(s.to_string()),
        })
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::Camera(dev) => f.write_str(dev),
            SourceSpec::Replay(path) => write!(f, "replay:{}", path.display()),
        }
    }
}

/// Alert delivery backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotifierKind {
    /// `osascript` on macOS, `notify-send` elsewhere.
    #[default]
    Auto,
    Osascript,
    /// Modal `osascript` dialog that must be dismissed (or times out).
    Dialog,
    NotifySend,
    Say,
    Log,
}

impl FromStr for NotifierKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(NotifierKind::Auto),
            "osascript" => Ok(NotifierKind::Osascript),
            "dialog" => Ok(NotifierKind::Dialog),
            "notify-send" => Ok(NotifierKind::NotifySend),
            "say" => Ok(NotifierKind::Say),
            "log" => Ok(NotifierKind::Log),
            other => Err(ConfigError::Notifier(other.to_string())),
        }
    }
}

impl NotifierKind {
    /// Resolve `Auto` for the current platform.
    pub fn resolve(self) -> Self {
        match self {
            NotifierKind::Auto if cfg!(target_os = "macos") => NotifierKind::Osascript,
            NotifierKind::Auto => NotifierKind::NotifySend,
            other => other,
        }
    }
}

/// Daemon configuration: optional TOML file, then `GAZEMON_*` overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(flatten)]
    pub monitor: MonitorConfig,
    /// Camera device path, or `replay:<path>` for a recording.
    pub source: String,
    /// Shell command of the external landmark helper (camera sources only).
    pub oracle_command: Option<String>,
    /// Deadline for one helper reply.
    pub oracle_timeout_ms: u64,
    pub notifier: NotifierKind,
    pub notify_timeout_secs: u64,
    /// `host:port` for the background latency probe; disabled when unset.
    pub probe_addr: Option<String>,
    pub probe_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            source: "/dev/video0".to_string(),
            oracle_command: None,
            oracle_timeout_ms: 2000,
            notifier: NotifierKind::default(),
            notify_timeout_secs: 5,
            probe_addr: None,
            probe_interval_secs: 5,
        }
    }
}

impl Config {
    /// Load the config file (if any), apply environment overrides, validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match config_path() {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "loading config file");
                Self::from_file(&path)?
            }
            _ => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.monitor.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Override fields from `GAZEMON_*` variables. Unparseable numbers are
    /// logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let m = &mut self.monitor;
        if let Some(v) = env_parse(&lookup, "GAZEMON_CENTER_THRESHOLD") {
            m.gaze_center_threshold = v;
        }
        if let Some(v) = env_parse(&lookup, "GAZEMON_DISTRACTION_SECONDS") {
            m.distraction_seconds = v;
        }
        if let Some(v) = env_parse(&lookup, "GAZEMON_COOLDOWN_SECONDS") {
            m.cooldown_seconds = v;
        }
        if let Some(v) = env_parse(&lookup, "GAZEMON_FPS") {
            m.fps = v;
        }
        if let Some(v) = lookup("GAZEMON_NOTIFY_GATE") {
            m.notify_gate = v.parse()?;
        }
        if let Some(v) = lookup("GAZEMON_SOURCE") {
            self.source = v;
        }
        if let Some(v) = lookup("GAZEMON_ORACLE") {
            self.oracle_command = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = env_parse(&lookup, "GAZEMON_ORACLE_TIMEOUT_MS") {
            self.oracle_timeout_ms = v;
        }
        if let Some(v) = lookup("GAZEMON_NOTIFIER") {
            self.notifier = v.parse()?;
        }
        if let Some(v) = env_parse(&lookup, "GAZEMON_NOTIFY_TIMEOUT_SECS") {
            self.notify_timeout_secs = v;
        }
        if let Some(v) = lookup("GAZEMON_PROBE_ADDR") {
            self.probe_addr = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = env_parse(&lookup, "GAZEMON_PROBE_INTERVAL_SECS") {
            self.probe_interval_secs = v;
        }
        Ok(())
    }

    pub fn source_spec(&self) -> SourceSpec {
        match self.source.parse() {
            Ok(spec) => spec,
            Err(never) => match never {},
        }
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs.max(1))
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms.max(1))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }
}

/// `GAZEMON_CONFIG`, else `$XDG_CONFIG_HOME/gazemon/config.toml`
/// (falling back to `~/.config`).
fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("GAZEMON_CONFIG") {
        return Some(PathBuf::from(p));
    }
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;
    Some(base.join("gazemon").join("config.toml"))
}

fn env_parse<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}
