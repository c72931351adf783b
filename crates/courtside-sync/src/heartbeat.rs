//! Last successful update, shared between the sync loop and its observers.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Outcome of a staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Stale,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => f.write_str("healthy"),
            HealthStatus::Stale => f.write_str("stale"),
        }
    }
}

/// Stale when more than `threshold` has passed since `last`.
pub fn evaluate(now: DateTime<Utc>, last: DateTime<Utc>, threshold: Duration) -> HealthStatus {
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    if elapsed > threshold {
        HealthStatus::Stale
    } else {
        HealthStatus::Healthy
    }
}

/// Create a heartbeat that starts at `started`.
pub fn heartbeat(started: DateTime<Utc>) -> (HeartbeatWriter, HeartbeatReader) {
    let (tx, rx) = watch::channel(started);
    (HeartbeatWriter(tx), HeartbeatReader(rx))
}

/// Write side, owned by the sync engine.
#[derive(Debug)]
pub struct HeartbeatWriter(watch::Sender<DateTime<Utc>>);

impl HeartbeatWriter {
    /// Record a successful cycle.
    pub fn beat(&self, at: DateTime<Utc>) {
        self.0.send_replace(at);
    }

    pub fn subscribe(&self) -> HeartbeatReader {
        HeartbeatReader(self.0.subscribe())
    }
}

/// Read-only view for the monitor and the health endpoint.
#[derive(Debug, Clone)]
pub struct HeartbeatReader(watch::Receiver<DateTime<Utc>>);

impl HeartbeatReader {
    pub fn last(&self) -> DateTime<Utc> {
        *self.0.borrow()
    }

    pub fn status(&self, now: DateTime<Utc>, threshold: Duration) -> HealthStatus {
        evaluate(now, self.last(), threshold)
    }
}
