use anyhow::{bail, Context, Result};
use gazemon_hw::{replay, Camera, FrameSource, LandmarkOracle, Monitor, ProcessOracle};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod notify;
mod probe;

use config::{Config, SourceSpec};
use dbus_interface::MonitorService;
use engine::EngineState;

/// How long shutdown waits for the engine to finish its current frame.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

type Pipeline = (Box<dyn FrameSource>, Box<dyn LandmarkOracle>);

fn open_pipeline(cfg: &Config) -> Result<Pipeline> {
    match cfg.source_spec() {
        SourceSpec::Camera(device) => {
            let Some(command) = cfg.oracle_command.as_deref() else {
                bail!("camera source {device} needs a landmark helper; set oracle_command or GAZEMON_ORACLE");
            };
            let camera =
                Camera::open(&device).with_context(|| format!("failed to open camera {device}"))?;
            let oracle = ProcessOracle::spawn(command, cfg.oracle_timeout())?;
            Ok((Box::new(camera), Box::new(oracle)))
        }
        SourceSpec::Replay(path) => {
            let (source, oracle) = replay::open(&path, cfg.monitor.fps)
                .with_context(|| format!("failed to open recording {}", path.display()))?;
            Ok((Box::new(source), Box::new(oracle)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gazemond starting");

    let cfg = Config::load().context("failed to load configuration")?;
    tracing::info!(
        source = %cfg.source,
        distraction_secs = cfg.monitor.distraction_seconds,
        threshold_frames = cfg.monitor.distraction_threshold_frames(),
        cooldown_secs = cfg.monitor.cooldown_seconds,
        gate = %cfg.monitor.notify_gate,
        notifier = ?cfg.notifier.resolve(),
        "configuration loaded"
    );

    let (source, oracle) = open_pipeline(&cfg)?;
    let notifier = notify::build(cfg.notifier, cfg.notify_timeout());
    let monitor = Monitor::new(&cfg.monitor, source, oracle, notifier)?;
    let engine = engine::spawn_engine(monitor)?;

    let latency = probe::LatencySlot::default();
    let probe_task = cfg
        .probe_addr
        .clone()
        .map(|addr| probe::spawn(addr, cfg.probe_interval(), latency.clone()));

    let service = MonitorService {
        engine: engine.clone(),
        latency,
        source: cfg.source_spec().to_string(),
    };

    // The daemon keeps monitoring without a session bus; it just can't be queried.
    let _connection = match zbus::connection::Builder::session()
        .and_then(|b| b.name(dbus_interface::BUS_NAME))
        .and_then(|b| b.serve_at(dbus_interface::OBJECT_PATH, service))
    {
        Ok(builder) => match builder.build().await {
            Ok(conn) => {
                tracing::info!(name = dbus_interface::BUS_NAME, "D-Bus interface registered");
                Some(conn)
            }
            Err(e) => {
                tracing::warn!(error = %e, "D-Bus unavailable; continuing without it");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "D-Bus unavailable; continuing without it");
            None
        }
    };

    tracing::info!("gazemond ready");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("gazemond shutting down");
        }
        state = engine.finished() => {
            if state == EngineState::Exhausted {
                tracing::info!("source exhausted; stopping");
            }
        }
    }

    if let Some(task) = probe_task {
        task.abort();
    }

    match tokio::time::timeout(STOP_TIMEOUT, engine.stop()).await {
        Ok(Ok(stats)) => tracing::info!(summary = %stats.summary(), "final session stats"),
        // Already stopped over D-Bus.
        Ok(Err(e)) => tracing::debug!(error = %e, "engine already stopped"),
        Err(_) => tracing::warn!(timeout_secs = STOP_TIMEOUT.as_secs(), "engine did not stop in time; exiting anyway"),
    }

    Ok(())
}
