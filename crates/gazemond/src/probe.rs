//! Background network latency probe.
//!
//! Measures TCP connect time to a fixed address on an interval and publishes
//! the latest value through a single atomic slot. The monitor loop never
//! touches it; the D-Bus status call reads it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

const UNKNOWN: u64 = u64::MAX;

/// Last measured latency in microseconds, overwritten in place.
#[derive(Clone, Debug)]
pub struct LatencySlot(Arc<AtomicU64>);

impl Default for LatencySlot {
    fn default() -> Self {
        Self(Arc::new(AtomicU64::new(UNKNOWN)))
    }
}

impl LatencySlot {
    pub fn set(&self, value: Option<Duration>) {
        let micros = value.map_or(UNKNOWN, |d| d.as_micros().min((UNKNOWN - 1) as u128) as u64);
        self.0.store(micros, Ordering::Relaxed);
    }

    pub fn get(&self) -> Option<Duration> {
        match self.0.load(Ordering::Relaxed) {
            UNKNOWN => None,
            micros => Some(Duration::from_micros(micros)),
        }
    }

    /// Latency in milliseconds, for status output.
    pub fn millis(&self) -> Option<f64> {
        self.get().map(|d| d.as_secs_f64() * 1000.0)
    }
}

/// One connect attempt. `None` on failure or timeout.
pub async fn measure(addr: &str, timeout: Duration) -> Option<Duration> {
    let started = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Some(started.elapsed()),
        Ok(Err(e)) => {
            tracing::debug!(addr, error = %e, "latency probe connect failed");
            None
        }
        Err(_) => {
            tracing::debug!(addr, "latency probe timed out");
            None
        }
    }
}

/// Spawn the probe loop on the current tokio runtime.
pub fn spawn(addr: String, interval: Duration, slot: LatencySlot) -> tokio::task::JoinHandle<()> {
    tracing::info!(addr = %addr, interval_secs = interval.as_secs(), "latency probe started");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let latency = measure(&addr, interval).await;
            slot.set(latency);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_starts_unknown() {
        let slot = LatencySlot::default();
        assert!(slot.get().is_none());
        assert!(slot.millis().is_none());
    }

    #[test]
    fn test_slot_overwrite() {
        let slot = LatencySlot::default();
        let reader = slot.clone();
        slot.set(Some(Duration::from_millis(12)));
        assert_eq!(reader.get(), Some(Duration::from_millis(12)));
        assert!((reader.millis().unwrap() - 12.0).abs() < 1e-9);
        slot.set(None);
        assert!(reader.get().is_none());
    }

    #[tokio::test]
    async fn test_measure_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let latency = measure(&addr, Duration::from_secs(2)).await;
        assert!(latency.is_some());
    }

    #[tokio::test]
    async fn test_probe_fills_slot() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let slot = LatencySlot::default();
        let task = spawn(addr, Duration::from_millis(50), slot.clone());
        for _ in 0..40 {
            if slot.get().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        task.abort();
        assert!(slot.get().is_some());
    }
}
