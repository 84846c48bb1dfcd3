//! Policy adaptation from scored outcome records
//!
//! Rules are applied in a fixed order and compose; the version moves by
//! exactly one whenever at least one rule fired.

use crate::domain::eval::{EvalRecord, RecordType};
use crate::domain::policy::Policy;
use crate::domain::types::round_to;
use crate::services::policy_store::PolicyStore;
use std::sync::Arc;
use tracing::{error, info};

const CONF_CAP: f64 = 0.95;
const CONF_FLOOR: f64 = 0.55;
const DWELL_CAP: f64 = 60.0;
const DWELL_FLOOR: f64 = 8.0;

const SPAM_RATE_HIGH: f64 = 0.2;
const ABANDON_RATE_HIGH: f64 = 0.25;
const ALERT_RATE_LOW: f64 = 0.4;
const OVERALL_LOW: f64 = 0.45;
const OVERALL_HIGH: f64 = 0.72;

/// Batch statistics the rules read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchStats {
    pub avg_overall: f64,
    pub spam_rate: f64,
    pub abandoned_rate: f64,
    pub alert_rate: f64,
}

impl BatchStats {
    /// Stats over decision records, or the whole batch when there are none
    pub fn from_records(records: &[EvalRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let decisions: Vec<&EvalRecord> =
            records.iter().filter(|r| r.record_type == RecordType::Decision).collect();
        let basis: Vec<&EvalRecord> =
            if decisions.is_empty() { records.iter().collect() } else { decisions };

        Some(Self {
            avg_overall: mean(&basis, |r| r.scores.overall),
            spam_rate: mean(&basis, |r| r.outcome_signals.spam_proxy),
            abandoned_rate: mean(&basis, |r| r.outcome_signals.abandoned_proxy),
            alert_rate: mean(&basis, |r| if r.alerted() { 1.0 } else { 0.0 }),
        })
    }
}

fn mean(records: &[&EvalRecord], f: impl Fn(&EvalRecord) -> f64) -> f64 {
    records.iter().map(|r| f(r)).sum::<f64>() / records.len() as f64
}

/// Apply the adjustment rules to `policy`, returning the reason tags that fired
pub fn apply_rules(policy: &mut Policy, stats: &BatchStats) -> Vec<&'static str> {
    let mut reasons = Vec::new();

    if stats.spam_rate > SPAM_RATE_HIGH {
        policy.alert_conf_threshold = round_to(policy.alert_conf_threshold + 0.03, 3).min(CONF_CAP);
        policy.dwell_threshold_sec = round_to(policy.dwell_threshold_sec + 1.0, 2).min(DWELL_CAP);
        reasons.push("spam_high");
    }

    if stats.abandoned_rate > ABANDON_RATE_HIGH && stats.alert_rate < ALERT_RATE_LOW {
        policy.dwell_threshold_sec = round_to(policy.dwell_threshold_sec - 1.0, 2).max(DWELL_FLOOR);
        reasons.push("abandon_high_alert_low");
    }

    if stats.avg_overall < OVERALL_LOW {
        policy.alert_conf_threshold = round_to(policy.alert_conf_threshold + 0.02, 3).min(CONF_CAP);
        policy.dwell_threshold_sec = round_to(policy.dwell_threshold_sec + 1.0, 2).min(DWELL_CAP);
        reasons.push("overall_low");
    } else if stats.avg_overall > OVERALL_HIGH {
        policy.alert_conf_threshold = round_to(policy.alert_conf_threshold - 0.01, 3).max(CONF_FLOOR);
        reasons.push("overall_high");
    }

    if !reasons.is_empty() {
        policy.policy_version += 1;
    }
    reasons
}

pub struct OptimizationAgent {
    store: Arc<PolicyStore>,
}

impl OptimizationAgent {
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self { store }
    }

    /// Adjust and persist the live policy from a batch of scored records
    ///
    /// An empty batch returns the stored policy untouched and writes nothing.
    pub fn optimize(&self, records: &[EvalRecord]) -> Policy {
        let mut policy = self.store.load();
        let Some(stats) = BatchStats::from_records(records) else {
            return policy;
        };

        let reasons = apply_rules(&mut policy, &stats);
        let reason = if reasons.is_empty() { "no_change".to_string() } else { reasons.join(",") };

        info!(
            records = %records.len(),
            avg_overall = %round_to(stats.avg_overall, 4),
            spam_rate = %round_to(stats.spam_rate, 4),
            abandoned_rate = %round_to(stats.abandoned_rate, 4),
            alert_rate = %round_to(stats.alert_rate, 4),
            version = %policy.policy_version,
            reason = %reason,
            "policy_optimized"
        );

        if let Err(e) = self.store.save(&policy, &reason) {
            error!(error = %e, reason = %reason, "policy_save_failed");
        }
        policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::egress::read_jsonl_tail;
    use crate::services::policy_store::PolicyChange;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(overall: f64, spam: f64, abandoned: f64, alert: bool) -> EvalRecord {
        let mut r = EvalRecord::new(RecordType::Decision, 1, 0.0);
        r.scores.overall = overall;
        r.outcome_signals.spam_proxy = spam;
        r.outcome_signals.abandoned_proxy = abandoned;
        r.agent_output = json!({ "alert": alert });
        r
    }

    fn stats(avg_overall: f64, spam_rate: f64, abandoned_rate: f64, alert_rate: f64) -> BatchStats {
        BatchStats { avg_overall, spam_rate, abandoned_rate, alert_rate }
    }

    #[test]
    fn test_spam_rule_raises_thresholds() {
        let mut p = Policy::default();
        let reasons = apply_rules(&mut p, &stats(0.6, 1.0, 0.0, 1.0));
        assert_eq!(reasons, vec!["spam_high"]);
        assert_eq!(p.alert_conf_threshold, 0.78);
        assert_eq!(p.dwell_threshold_sec, 21.0);
        assert_eq!(p.policy_version, 2);
    }

    #[test]
    fn test_rules_compose_with_single_version_bump() {
        let mut p = Policy::default();
        let reasons = apply_rules(&mut p, &stats(0.1, 0.5, 0.5, 0.0));
        assert_eq!(reasons, vec!["spam_high", "abandon_high_alert_low", "overall_low"]);
        assert_eq!(p.alert_conf_threshold, 0.8);
        // +1 -1 +1
        assert_eq!(p.dwell_threshold_sec, 21.0);
        assert_eq!(p.policy_version, 2);
    }

    #[test]
    fn test_overall_high_lowers_confidence_with_floor() {
        let mut p = Policy { alert_conf_threshold: 0.555, ..Policy::default() };
        let reasons = apply_rules(&mut p, &stats(0.9, 0.0, 0.0, 1.0));
        assert_eq!(reasons, vec!["overall_high"]);
        assert_eq!(p.alert_conf_threshold, 0.55);
        assert_eq!(p.dwell_threshold_sec, 20.0);
    }

    #[test]
    fn test_caps_and_floors() {
        let mut p = Policy { alert_conf_threshold: 0.94, dwell_threshold_sec: 60.0, ..Policy::default() };
        apply_rules(&mut p, &stats(0.6, 1.0, 0.0, 1.0));
        assert_eq!(p.alert_conf_threshold, 0.95);
        assert_eq!(p.dwell_threshold_sec, 60.0);

        let mut p = Policy { dwell_threshold_sec: 8.5, ..Policy::default() };
        apply_rules(&mut p, &stats(0.6, 0.0, 1.0, 0.0));
        assert_eq!(p.dwell_threshold_sec, 8.0);
    }

    #[test]
    fn test_middle_band_is_no_change() {
        let mut p = Policy::default();
        let reasons = apply_rules(&mut p, &stats(0.6, 0.2, 0.25, 0.0));
        assert!(reasons.is_empty());
        assert_eq!(p, Policy::default());
    }

    #[test]
    fn test_abandon_rule_needs_low_alert_rate() {
        let mut p = Policy::default();
        let reasons = apply_rules(&mut p, &stats(0.6, 0.0, 0.5, 0.4));
        assert!(reasons.is_empty());
    }

    #[test]
    fn test_stats_prefer_decision_records() {
        let mut rci = record(0.0, 1.0, 1.0, false);
        rci.record_type = RecordType::Rci;
        let batch = vec![record(0.8, 0.0, 0.0, true), rci.clone()];
        let s = BatchStats::from_records(&batch).unwrap();
        assert_eq!(s.spam_rate, 0.0);
        assert_eq!(s.alert_rate, 1.0);
        assert_eq!(s.avg_overall, 0.8);

        let only_rci = vec![rci];
        let s = BatchStats::from_records(&only_rci).unwrap();
        assert_eq!(s.spam_rate, 1.0);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let dir = tempdir().unwrap();
        let store = Arc::new(PolicyStore::in_dir(dir.path()));
        let agent = OptimizationAgent::new(store.clone());

        let policy = agent.optimize(&[]);
        assert_eq!(policy, Policy::default());
        assert_eq!(store.load().policy_version, 1);

        let changes: Vec<PolicyChange> = read_jsonl_tail(store.changes_path(), 10);
        assert_eq!(changes.len(), 1, "only the init line");
    }

    #[test]
    fn test_spam_batch_persists_new_version() {
        let dir = tempdir().unwrap();
        let store = Arc::new(PolicyStore::in_dir(dir.path()));
        let agent = OptimizationAgent::new(store.clone());

        // overall 0.5263 is what a spam-only outcome scores
        let batch: Vec<EvalRecord> = (0..25).map(|_| record(0.5263, 1.0, 0.0, true)).collect();
        let policy = agent.optimize(&batch);

        assert_eq!(policy.alert_conf_threshold, 0.78);
        assert_eq!(policy.dwell_threshold_sec, 21.0);
        assert_eq!(policy.policy_version, 2);
        assert_eq!(store.load(), policy);

        let changes: Vec<PolicyChange> = read_jsonl_tail(store.changes_path(), 10);
        assert!(changes.last().unwrap().reason.contains("spam_high"));
    }

    #[test]
    fn test_no_change_is_still_recorded() {
        let dir = tempdir().unwrap();
        let store = Arc::new(PolicyStore::in_dir(dir.path()));
        let agent = OptimizationAgent::new(store.clone());

        let policy = agent.optimize(&[record(0.6, 0.0, 0.0, true)]);
        assert_eq!(policy.policy_version, 1);

        let changes: Vec<PolicyChange> = read_jsonl_tail(store.changes_path(), 10);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].reason, "no_change");
    }
}
