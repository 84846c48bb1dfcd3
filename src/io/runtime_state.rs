//! Dashboard snapshots: `state.json` and `metrics.json`
//!
//! Both files are overwritten in place on every write.

use crate::domain::events::{AlertLogEntry, RciRecord};
use crate::domain::policy::Policy;
use crate::domain::types::epoch_secs;
use crate::services::scoring::EvalSnapshot;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const STATE_FILE: &str = "state.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const STATE_ALERTS: usize = 20;
pub const STATE_RCI: usize = 10;

#[derive(Debug, Serialize)]
struct StateSnapshot<'a> {
    policy: &'a Policy,
    last_alerts: &'a [AlertLogEntry],
    last_rci: &'a [RciRecord],
    ts: f64,
    updated_at: String,
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

/// Read a JSON file, falling back to `default` when missing or corrupt
pub fn read_json_or<T: DeserializeOwned>(path: &Path, default: T) -> T {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or(default)
}

pub struct RuntimeState {
    dir: PathBuf,
}

impl RuntimeState {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(METRICS_FILE)
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) {
        let result = std::fs::create_dir_all(&self.dir)
            .and_then(|_| Ok(serde_json::to_string_pretty(value)?))
            .and_then(|json| std::fs::write(path, json));
        if let Err(e) = result {
            warn!(file = %path.display(), error = %e, "runtime_snapshot_failed");
        }
    }

    /// Policy plus the most recent alerts and root-cause records
    pub fn write_state(&self, policy: &Policy, alerts: &[AlertLogEntry], rci: &[RciRecord]) {
        let snapshot = StateSnapshot {
            policy,
            last_alerts: tail(alerts, STATE_ALERTS),
            last_rci: tail(rci, STATE_RCI),
            ts: epoch_secs(),
            updated_at: Utc::now().to_rfc3339(),
        };
        self.write_json(&self.state_path(), &snapshot);
    }

    pub fn write_metrics(&self, metrics: &EvalSnapshot) {
        self.write_json(&self.metrics_path(), metrics);
    }
}
