use crate::engine::{EngineHandle, EngineState};
use crate::probe::LatencySlot;
use zbus::interface;

pub const BUS_NAME: &str = "org.gazemon.Monitor1";
pub const OBJECT_PATH: &str = "/org/gazemon/Monitor1";

/// D-Bus interface for the gaze monitor daemon.
///
/// Bus name: org.gazemon.Monitor1
/// Object path: /org/gazemon/Monitor1
pub struct MonitorService {
    pub engine: EngineHandle,
    pub latency: LatencySlot,
    pub source: String,
}

fn state_name(state: EngineState) -> &'static str {
    match state {
        EngineState::Running => "running",
        EngineState::Exhausted => "exhausted",
        EngineState::Stopped => "stopped",
    }
}

fn engine_error(e: crate::engine::EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

impl MonitorService {
    /// Status document. `stats` is null once the engine has shut down.
    async fn status_json(&self) -> serde_json::Value {
        let stats = match self.engine.stats().await {
            Ok(stats) => serde_json::to_value(stats).unwrap_or(serde_json::Value::Null),
            Err(e) => {
                tracing::debug!(error = %e, "status without stats");
                serde_json::Value::Null
            }
        };
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "source": self.source,
            "state": state_name(self.engine.state()),
            "latency_ms": self.latency.millis(),
            "stats": stats,
        })
    }
}

#[interface(name = "org.gazemon.Monitor1")]
impl MonitorService {
    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(self.status_json().await.to_string())
    }

    /// Current session statistics as JSON.
    async fn stats(&self) -> zbus::fdo::Result<String> {
        tracing::debug!("stats requested");
        let stats = self.engine.stats().await.map_err(engine_error)?;
        Ok(stats.to_json())
    }

    /// Stop monitoring. Returns the final statistics as JSON.
    async fn stop(&self) -> zbus::fdo::Result<String> {
        tracing::info!("stop requested over D-Bus");
        let stats = self.engine.stop().await.map_err(engine_error)?;
        Ok(stats.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use crate::notify::LogNotifier;
    use gazemon_core::MonitorConfig;
    use gazemon_hw::{replay, Monitor};
    use std::io::Cursor;

    fn service(frames: usize) -> MonitorService {
        let text = "{\"width\":640,\"height\":480,\"landmarks\":null}\n".repeat(frames);
        let (source, oracle) = replay::from_reader(Cursor::new(text), "status".into(), 30);
        let monitor = Monitor::new(
            &MonitorConfig::default(),
            Box::new(source),
            Box::new(oracle),
            Box::new(LogNotifier),
        )
        .unwrap();
        MonitorService {
            engine: spawn_engine(monitor).unwrap(),
            latency: LatencySlot::default(),
            source: "replay:status".into(),
        }
    }

    #[tokio::test]
    async fn test_status_while_serving() {
        let svc = service(3);
        svc.engine.finished().await;
        let status = svc.status_json().await;
        assert_eq!(status["state"], "exhausted");
        assert_eq!(status["source"], "replay:status");
        assert!(status["latency_ms"].is_null());
        assert_eq!(status["stats"]["total_frames"], 0);
    }

    #[tokio::test]
    async fn test_status_after_stop_reports_stopped() {
        let svc = service(3);
        svc.engine.stop().await.unwrap();
        let status = svc.status_json().await;
        assert_eq!(status["state"], "stopped");
        assert!(status["stats"].is_null());
        assert!(status["version"].is_string());
    }
}
