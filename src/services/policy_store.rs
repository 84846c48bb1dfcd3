//! Persisted policy snapshot with an append-only change log
//!
//! `policy.json` always holds the latest saved policy; every save also
//! appends `{ts, reason, policy}` to `policy_changes.jsonl`.

use crate::domain::policy::Policy;
use crate::domain::types::epoch_secs;
use crate::io::egress::append_jsonl;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const POLICY_FILE: &str = "policy.json";
pub const POLICY_CHANGES_FILE: &str = "policy_changes.jsonl";

/// One audit log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyChange {
    pub ts: f64,
    pub reason: String,
    pub policy: Policy,
}

pub struct PolicyStore {
    policy_path: PathBuf,
    changes_path: PathBuf,
}

impl PolicyStore {
    /// Open the store, seeding the default policy if none was saved yet
    pub fn open(policy_path: impl Into<PathBuf>, changes_path: impl Into<PathBuf>) -> Self {
        let store = Self { policy_path: policy_path.into(), changes_path: changes_path.into() };
        if !store.policy_path.exists() {
            if let Err(e) = store.save(&Policy::default(), "init") {
                error!(path = %store.policy_path.display(), error = %e, "policy_seed_failed");
            }
        }
        store
    }

    /// Open `policy.json` and `policy_changes.jsonl` inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self::open(dir.join(POLICY_FILE), dir.join(POLICY_CHANGES_FILE))
    }

    /// Current policy; missing, corrupt or out-of-range state yields the default
    pub fn load(&self) -> Policy {
        let raw = match std::fs::read_to_string(&self.policy_path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.policy_path.display(), error = %e, "policy_load_failed_using_default");
                return Policy::default();
            }
        };
        match serde_json::from_str::<Policy>(&raw) {
            Ok(policy) if policy.is_valid() => policy,
            Ok(policy) => {
                warn!(
                    path = %self.policy_path.display(),
                    alert_conf_threshold = %policy.alert_conf_threshold,
                    dwell_threshold_sec = %policy.dwell_threshold_sec,
                    "policy_out_of_range_using_default"
                );
                Policy::default()
            }
            Err(e) => {
                warn!(path = %self.policy_path.display(), error = %e, "policy_parse_failed_using_default");
                Policy::default()
            }
        }
    }

    /// Write the snapshot synchronously, then append the audit line
    pub fn save(&self, policy: &Policy, reason: &str) -> std::io::Result<()> {
        if let Some(parent) = self.policy_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(policy)?;
        std::fs::write(&self.policy_path, json)?;

        let change = PolicyChange { ts: epoch_secs(), reason: reason.to_string(), policy: policy.clone() };
        append_jsonl(&self.changes_path, &change)?;

        info!(
            version = %policy.policy_version,
            alert_conf_threshold = %policy.alert_conf_threshold,
            dwell_threshold_sec = %policy.dwell_threshold_sec,
            motion_threshold = %policy.motion_threshold,
            rci_min_alerts = %policy.rci_min_alerts,
            reason = %reason,
            "policy_saved"
        );
        Ok(())
    }

    pub fn policy_path(&self) -> &Path {
        &self.policy_path
    }

    pub fn changes_path(&self) -> &Path {
        &self.changes_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::egress::read_jsonl_tail;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_open_seeds_default_with_init() {
        let dir = tempdir().unwrap();
        let store = PolicyStore::in_dir(dir.path());

        assert!(store.policy_path().exists());
        assert_eq!(store.load(), Policy::default());

        let changes: Vec<PolicyChange> = read_jsonl_tail(store.changes_path(), 10);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].reason, "init");
    }

    #[test]
    fn test_open_existing_does_not_reseed() {
        let dir = tempdir().unwrap();
        let store = PolicyStore::in_dir(dir.path());
        let custom = Policy { dwell_threshold_sec: 12.0, policy_version: 4, ..Policy::default() };
        store.save(&custom, "manual").unwrap();

        let reopened = PolicyStore::in_dir(dir.path());
        assert_eq!(reopened.load(), custom);
        let changes: Vec<PolicyChange> = read_jsonl_tail(reopened.changes_path(), 10);
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = PolicyStore::in_dir(dir.path());
        let policy = Policy {
            alert_conf_threshold: 0.812,
            dwell_threshold_sec: 23.5,
            motion_threshold: 0.3,
            rci_min_alerts: 5,
            policy_version: 9,
        };
        store.save(&policy, "spam_high,overall_low").unwrap();
        assert_eq!(store.load(), policy);

        let changes: Vec<PolicyChange> = read_jsonl_tail(store.changes_path(), 10);
        let last = changes.last().unwrap();
        assert_eq!(last.reason, "spam_high,overall_low");
        assert_eq!(last.policy, policy);
    }

    #[test]
    fn test_corrupt_file_yields_default() {
        let dir = tempdir().unwrap();
        let store = PolicyStore::in_dir(dir.path());
        fs::write(store.policy_path(), "{not json").unwrap();
        assert_eq!(store.load(), Policy::default());
    }

    #[test]
    fn test_out_of_range_yields_default() {
        let dir = tempdir().unwrap();
        let store = PolicyStore::in_dir(dir.path());
        fs::write(store.policy_path(), r#"{"alert_conf_threshold": 3.0}"#).unwrap();
        assert_eq!(store.load(), Policy::default());
    }

    #[test]
    fn test_missing_file_yields_default() {
        let dir = tempdir().unwrap();
        let store = PolicyStore::in_dir(dir.path());
        fs::remove_file(store.policy_path()).unwrap();
        assert_eq!(store.load(), Policy::default());
    }
}
