use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gazemon_core::classifier::iris_centers;
use gazemon_core::cursor::{CalibratedMapping, CursorMapper, Size};
use gazemon_core::{MonitorConfig, Notifier, NotifyGate, SessionStats};
use gazemon_hw::{
    replay, Camera, FrameOutcome, FrameSource, LandmarkOracle, Monitor, SkipCounters, Step,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.gazemon.Monitor1",
    default_service = "org.gazemon.Monitor1",
    default_path = "/org/gazemon/Monitor1"
)]
trait Monitor {
    fn status(&self) -> zbus::Result<String>;
    fn stats(&self) -> zbus::Result<String>;
    fn stop(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "gazemon", about = "Gaze attention monitor CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// Show current session statistics
    Stats,
    /// Stop the running monitor and print final statistics
    Stop,
    /// Run a landmark recording through the classifier and tracker offline
    Replay {
        /// JSONL landmark recording
        file: PathBuf,
        /// Print final statistics as JSON
        #[arg(long)]
        json: bool,
        /// Print every classified frame
        #[arg(long)]
        frames: bool,
        /// Which frames may raise an alert ("distracted" or "focused")
        #[arg(long, default_value = "distracted")]
        gate: NotifyGate,
        /// Recording frame rate
        #[arg(long, default_value_t = 30)]
        fps: u32,
        /// Seconds of sustained gaze before alerting
        #[arg(long, default_value_t = 3.0)]
        distraction_seconds: f32,
        /// Minimum seconds between alerts
        #[arg(long, default_value_t = 60.0)]
        cooldown_seconds: f32,
    },
    /// Print the cursor position each frame of a recording would map to
    Cursor {
        /// JSONL landmark recording
        file: PathBuf,
        /// Screen size, e.g. 1920x1080
        #[arg(long, value_parser = parse_screen)]
        screen: Size,
        /// Use the calibrated range mapping instead of the centre-relative one
        #[arg(long)]
        calibrated: bool,
        /// Gain of the centre-relative mapping
        #[arg(long, default_value_t = 600.0)]
        sensitivity: f32,
    },
    /// List V4L2 capture devices
    Devices,
}

fn parse_screen(s: &str) -> Result<Size, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let width: u32 = w.trim().parse().map_err(|e| format!("bad width {w:?}: {e}"))?;
    let height: u32 = h.trim().parse().map_err(|e| format!("bad height {h:?}: {e}"))?;
    if width == 0 || height == 0 {
        return Err("screen dimensions must be non-zero".into());
    }
    Ok(Size::new(width, height))
}

async fn proxy() -> Result<MonitorProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    MonitorProxy::new(&conn)
        .await
        .context("gazemond is not reachable on D-Bus")
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Consecutive unreadable records tolerated before a recording is abandoned.
const MAX_CONSECUTIVE_FAILURES: u32 = 64;

/// The CLI prints alerts itself; nothing to deliver.
struct QuietNotifier;

impl Notifier for QuietNotifier {
    fn notify(&self, _message: &str, _title: &str, _subtitle: &str) -> bool {
        true
    }
}

struct ReplayOptions {
    json: bool,
    frames: bool,
    config: MonitorConfig,
}

fn run_replay(file: &Path, opts: ReplayOptions) -> Result<()> {
    let (source, oracle) = replay::open(file, opts.config.fps)
        .with_context(|| format!("failed to open {}", file.display()))?;
    let monitor = Monitor::new(
        &opts.config,
        Box::new(source),
        Box::new(oracle),
        Box::new(QuietNotifier),
    )?;
    replay_session(monitor, &opts, &mut io::stdout().lock())?;
    Ok(())
}

/// Drive `monitor` to the end of its source, printing alerts (and frames when
/// asked) to `out`. Unreadable records are skipped and counted.
fn replay_session(
    mut monitor: Monitor,
    opts: &ReplayOptions,
    out: &mut dyn Write,
) -> Result<(SessionStats, SkipCounters)> {
    let fps = f64::from(opts.config.fps.max(1));
    loop {
        match monitor.step() {
            Step::EndOfStream => break,
            Step::SourceFailed => {
                if monitor.source_failures() >= MAX_CONSECUTIVE_FAILURES {
                    bail!(
                        "{} consecutive unreadable records; giving up",
                        monitor.source_failures()
                    );
                }
            }
            Step::Skipped { .. }
            | Step::Frame {
                outcome: FrameOutcome::NoFace,
                ..
            } => {}
            Step::Frame {
                sequence,
                outcome: FrameOutcome::Tracked { sample, alert },
            } => {
                if opts.frames {
                    writeln!(
                        out,
                        "{:>6}  {:<6} x={:+.3} y={:+.3}",
                        sequence, sample.direction, sample.x_ratio, sample.y_ratio
                    )?;
                }
                if let Some(a) = alert {
                    let secs = f64::from(sequence) / fps;
                    writeln!(
                        out,
                        "alert #{} at frame {sequence} ({secs:.1}s): {} for {} frames",
                        a.sequence, a.direction, a.run_length
                    )?;
                }
            }
        }
    }

    let stats = monitor.stats();
    let skipped = monitor.skipped();
    if opts.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
    } else {
        writeln!(out, "{}", stats.summary())?;
        if skipped.no_face + skipped.errors > 0 {
            writeln!(out, "no_face={} errors={}", skipped.no_face, skipped.errors)?;
        }
    }
    Ok((stats, skipped))
}

struct CursorOptions {
    screen: Size,
    calibrated: bool,
    sensitivity: f32,
}

fn run_cursor(file: &Path, opts: CursorOptions) -> Result<()> {
    let (mut source, mut oracle) =
        replay::open(file, 30).with_context(|| format!("failed to open {}", file.display()))?;
    map_cursor(&mut source, &mut oracle, &opts, &mut io::stdout().lock())
}

fn map_cursor(
    source: &mut dyn FrameSource,
    oracle: &mut dyn LandmarkOracle,
    opts: &CursorOptions,
    out: &mut dyn Write,
) -> Result<()> {
    let mapper = CursorMapper {
        sensitivity: opts.sensitivity,
        ..Default::default()
    };
    let calibration = CalibratedMapping::default();
    let mut failures = 0u32;

    loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                failures += 1;
                tracing::warn!(error = %e, "record skipped");
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    bail!("{failures} consecutive unreadable records; giving up");
                }
                continue;
            }
        };
        failures = 0;

        let landmarks = match oracle.detect(&frame) {
            Ok(Some(landmarks)) => landmarks,
            Ok(None) => {
                writeln!(out, "{:>6}  no face", frame.sequence)?;
                continue;
            }
            Err(e) => {
                writeln!(out, "{:>6}  {e}", frame.sequence)?;
                continue;
            }
        };
        let eyes = match iris_centers(&landmarks) {
            Ok(centers) => centers.eyes_center(),
            Err(e) => {
                writeln!(out, "{:>6}  {e}", frame.sequence)?;
                continue;
            }
        };
        let position = if opts.calibrated {
            Some(calibration.map(eyes, opts.screen))
        } else {
            mapper.map(eyes, Size::new(frame.width, frame.height), opts.screen)
        };
        match position {
            Some((x, y)) => writeln!(out, "{:>6}  {x} {y}", frame.sequence)?,
            None => writeln!(out, "{:>6}  dead zone", frame.sequence)?,
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status => {
            let status = proxy().await?.status().await?;
            print_json(&status)?;
        }
        Commands::Stats => {
            let stats = proxy().await?.stats().await?;
            print_json(&stats)?;
        }
        Commands::Stop => {
            let stats = proxy().await?.stop().await?;
            println!("monitor stopped");
            print_json(&stats)?;
        }
        Commands::Replay {
            file,
            json,
            frames,
            gate,
            fps,
            distraction_seconds,
            cooldown_seconds,
        } => {
            let config = MonitorConfig {
                distraction_seconds,
                cooldown_seconds,
                fps,
                notify_gate: gate,
                ..Default::default()
            };
            run_replay(&file, ReplayOptions { json, frames, config })?;
        }
        Commands::Cursor {
            file,
            screen,
            calibrated,
            sensitivity,
        } => run_cursor(
            &file,
            CursorOptions {
                screen,
                calibrated,
                sensitivity,
            },
        )?,
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("no capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
    }

    Ok(())
}
