use gazemon_core::SessionStats;
use gazemon_hw::{Monitor, MonitorError, Step};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

/// Longest the engine sleeps between request checks while backing off.
const REQUEST_POLL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Lifecycle of the engine thread, observable through [`EngineHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Running,
    /// The source ran dry; stats are still served.
    Exhausted,
    Stopped,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Stats {
        reply: oneshot::Sender<SessionStats>,
    },
    Stop {
        reply: oneshot::Sender<SessionStats>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    state: watch::Receiver<EngineState>,
}

impl EngineHandle {
    /// Current session statistics.
    pub async fn stats(&self) -> Result<SessionStats, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Stats { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Ask the loop to stop after the current frame; returns the final stats.
    pub async fn stop(&self) -> Result<SessionStats, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Stop { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Resolves once the engine is no longer running.
    pub async fn finished(&self) -> EngineState {
        let mut rx = self.state.clone();
        let state = match rx.wait_for(|s| *s != EngineState::Running).await {
            Ok(state) => *state,
            Err(_) => EngineState::Stopped,
        };
        state
    }
}

/// Outcome of draining the request queue.
enum Control {
    Continue,
    Stop(Option<oneshot::Sender<SessionStats>>),
}

fn drain_requests(rx: &mut mpsc::Receiver<EngineRequest>, monitor: &Monitor) -> Control {
    loop {
        match rx.try_recv() {
            Ok(EngineRequest::Stats { reply }) => {
                let _ = reply.send(monitor.stats());
            }
            Ok(EngineRequest::Stop { reply }) => return Control::Stop(Some(reply)),
            Err(mpsc::error::TryRecvError::Empty) => return Control::Continue,
            Err(mpsc::error::TryRecvError::Disconnected) => return Control::Stop(None),
        }
    }
}

/// Sleep for `delay`, answering requests every [`REQUEST_POLL`].
fn backoff(rx: &mut mpsc::Receiver<EngineRequest>, monitor: &Monitor, delay: Duration) -> Control {
    let deadline = Instant::now() + delay;
    loop {
        if let Control::Stop(reply) = drain_requests(rx, monitor) {
            return Control::Stop(reply);
        }
        let now = Instant::now();
        if now >= deadline {
            return Control::Continue;
        }
        std::thread::sleep((deadline - now).min(REQUEST_POLL));
    }
}

/// Spawn the monitor on a dedicated OS thread.
///
/// Control requests are drained once per frame, so a stop takes effect after
/// at most one in-flight frame. A failing source is retried with a capped
/// exponential delay.
pub fn spawn_engine(mut monitor: Monitor) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);
    let (state_tx, state_rx) = watch::channel(EngineState::Running);

    tracing::info!(source = %monitor.describe_source(), "starting monitor");

    std::thread::Builder::new()
        .name("gazemon-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");

            let stop_reply = loop {
                if let Control::Stop(reply) = drain_requests(&mut rx, &monitor) {
                    break reply;
                }

                match monitor.step() {
                    Step::EndOfStream => {
                        tracing::info!("frame source exhausted");
                        state_tx.send_replace(EngineState::Exhausted);
                        let mut stop = None;
                        while let Some(req) = rx.blocking_recv() {
                            match req {
                                EngineRequest::Stats { reply } => {
                                    let _ = reply.send(monitor.stats());
                                }
                                EngineRequest::Stop { reply } => {
                                    stop = Some(reply);
                                    break;
                                }
                            }
                        }
                        break stop;
                    }
                    Step::SourceFailed => {
                        if let Control::Stop(reply) = backoff(&mut rx, &monitor, monitor.retry_delay()) {
                            break reply;
                        }
                    }
                    Step::Frame { .. } | Step::Skipped { .. } => {}
                }
            };

            let stats = monitor.stats();
            let skipped = monitor.skipped();
            tracing::info!(
                total_frames = stats.total_frames,
                focused_frames = stats.focused_frames,
                focus_rate = %format!("{:.1}%", stats.focus_rate),
                notifications = stats.notification_count,
                no_face = skipped.no_face,
                errors = skipped.errors,
                "session finished"
            );
            state_tx.send_replace(EngineState::Stopped);
            if let Some(reply) = stop_reply {
                let _ = reply.send(stats);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, state: state_rx })
}
