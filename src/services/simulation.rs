//! Offline replay of recorded observations
//!
//! Runs the decision, scoring and optimization path without a frame source.
//! Outcome signals are synthesized from the observation itself.

use crate::domain::eval::{EvalRecord, RecordMetadata, RecordType};
use crate::domain::events::Observation;
use crate::domain::types::{epoch_secs, round_to};
use crate::io::backend::EvalBackend;
use crate::io::runtime_state::RuntimeState;
use crate::services::control_loop::{evaluate_and_log, optimization_window};
use crate::services::decision_agent::DecisionAgent;
use crate::services::optimizer::OptimizationAgent;
use crate::services::policy_store::PolicyStore;
use crate::services::scoring::compute_metrics;
use anyhow::Context;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Zones need this many observations before they get a synthesized root-cause record
pub const SIM_CLUSTER_MIN: usize = 3;
const RESOLVED_MAX_MOTION: f64 = 0.2;
const ABANDON_DWELL_MARGIN_SEC: f64 = 8.0;
const SPAM_ZONE_ALERT_RATE: f64 = 4.0;

/// Load the observation array; a missing file yields `None`
pub fn load_observations(path: &Path) -> anyhow::Result<Option<Vec<Observation>>> {
    if !path.exists() {
        warn!(path = %path.display(), "simulation_file_missing");
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read simulation file {}", path.display()))?;
    let observations = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse simulation file {}", path.display()))?;
    Ok(Some(observations))
}

pub struct Simulation {
    policy_store: Arc<PolicyStore>,
    decision_agent: DecisionAgent,
    optimizer: OptimizationAgent,
    eval: Arc<dyn EvalBackend>,
    runtime_state: RuntimeState,
    optimize_every_n: usize,
}

#[derive(Debug, Default)]
struct ZoneTally {
    count: usize,
    conf_proxy: f64,
}

impl Simulation {
    pub fn new(
        policy_store: Arc<PolicyStore>,
        decision_agent: DecisionAgent,
        eval: Arc<dyn EvalBackend>,
        runtime_state: RuntimeState,
        optimize_every_n: usize,
    ) -> Self {
        Self {
            optimizer: OptimizationAgent::new(policy_store.clone()),
            policy_store,
            decision_agent,
            eval,
            runtime_state,
            optimize_every_n: optimize_every_n.max(1),
        }
    }

    /// Score every observation, add per-zone root-cause records, then
    /// optimize once and write the metrics snapshot
    pub async fn run(&self, observations: &[Observation]) -> Vec<EvalRecord> {
        let mut records = Vec::with_capacity(observations.len());
        // first-seen zone order
        let mut tallies: Vec<(String, ZoneTally)> = Vec::new();

        for obs in observations {
            let policy = self.policy_store.load();
            let decision = self.decision_agent.decide(obs).await;
            let triggered = decision.alert && decision.confidence >= policy.alert_conf_threshold;

            let mut record = EvalRecord::new(RecordType::Decision, policy.policy_version, epoch_secs());
            record.observation = serde_json::to_value(obs).unwrap_or_default();
            record.agent_output = serde_json::to_value(&decision).unwrap_or_default();
            record.outcome_signals.resolved_proxy =
                if triggered && obs.motion_score < RESOLVED_MAX_MOTION { 1.0 } else { 0.0 };
            record.outcome_signals.abandoned_proxy =
                if !triggered && obs.dwell_time > policy.dwell_threshold_sec + ABANDON_DWELL_MARGIN_SEC {
                    1.0
                } else {
                    0.0
                };
            record.outcome_signals.spam_proxy =
                if obs.zone_alert_rate.unwrap_or(0.0) > SPAM_ZONE_ALERT_RATE { 1.0 } else { 0.0 };
            record.metadata = RecordMetadata {
                event_id: obs.event_id.clone(),
                zone: Some(obs.zone.clone()),
                ..RecordMetadata::default()
            };

            let spam = record.outcome_signals.spam_proxy;
            records.push(evaluate_and_log(self.eval.as_ref(), record, None).await);

            let idx = match tallies.iter().position(|(zone, _)| zone == &obs.zone) {
                Some(idx) => idx,
                None => {
                    tallies.push((obs.zone.clone(), ZoneTally::default()));
                    tallies.len() - 1
                }
            };
            let tally = &mut tallies[idx].1;
            tally.count += 1;
            tally.conf_proxy += (1.0 - spam) * 0.1;
        }

        let policy = self.policy_store.load();
        for (zone, tally) in tallies.iter().filter(|(_, t)| t.count >= SIM_CLUSTER_MIN) {
            let count = tally.count as f64;
            let mut record = EvalRecord::new(RecordType::Rci, policy.policy_version, epoch_secs());
            record.observation = json!({
                "zone": zone,
                "alerts_count": tally.count,
                "avg_confidence": round_to(tally.conf_proxy / count, 3),
                "avg_dwell": 24.0,
                "abandon_rate_proxy": 0.2,
                "queue_stats": round_to(count / 5.0, 2),
            });
            record.agent_output = json!({
                "issue": format!("Clustered assistance demand in {}", zone),
                "confidence": (0.55 + count * 0.03).min(1.0),
                "recommended_action": "Assign staff to zone and restock top confusion SKUs",
                "reason": "Repeated assistance candidates within evaluation window",
            });
            record.metadata.zone = Some(zone.clone());
            records.push(evaluate_and_log(self.eval.as_ref(), record, None).await);
        }

        let n = self.optimize_every_n;
        if records.len() >= n {
            let window = optimization_window(self.eval.as_ref(), &records, n).await;
            self.optimizer.optimize(&window);
        }

        let snapshot = compute_metrics(&records);
        self.runtime_state.write_metrics(&snapshot);
        info!(
            eval_records = %records.len(),
            avg_score_last_50 = %snapshot.avg_score_last_50,
            spam_rate = %snapshot.spam_rate,
            "simulation_complete"
        );
        records
    }
}
