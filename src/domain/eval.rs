//! Unified evaluation record schema
//!
//! Decision and root-cause outcomes share one record shape so that the
//! scorer, the evaluation log and the optimizer all read the same thing.
//! `observation` and `agent_output` stay as raw JSON: records fetched back
//! from the evaluation backend are not guaranteed to be well formed, and
//! the scorer penalizes that instead of rejecting the record.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    #[default]
    Decision,
    Rci,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Decision => "decision",
            RecordType::Rci => "rci",
        }
    }
}

/// Heuristic stand-ins for ground-truth alert usefulness
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeSignals {
    pub resolved_proxy: f64,
    pub abandoned_proxy: f64,
    pub spam_proxy: f64,
    pub audio_feedback_proxy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scores {
    pub overall_raw: f64,
    pub overall: f64,
    pub resolved_proxy: f64,
    pub abandoned_proxy: f64,
    pub spam_proxy: f64,
    pub audio_feedback_proxy: f64,
    pub invalid_json_penalty: f64,
    pub forbidden_content_penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordMetadata {
    pub event_id: Option<String>,
    pub alert_id: Option<String>,
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_feedback_excerpt: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub finalized_at_stream_end: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalRecord {
    pub record_type: RecordType,
    pub policy_version: u64,
    pub ts: f64,
    pub observation: serde_json::Value,
    pub agent_output: serde_json::Value,
    pub outcome_signals: OutcomeSignals,
    pub scores: Scores,
    pub metadata: RecordMetadata,
    /// Set once the remote evaluator has had its attempt at the record, so it is not posted twice
    #[serde(skip)]
    pub remote_logged: bool,
}

impl EvalRecord {
    pub fn new(record_type: RecordType, policy_version: u64, ts: f64) -> Self {
        Self { record_type, policy_version, ts, ..Self::default() }
    }

    /// `agent_output.alert == true`
    pub fn alerted(&self) -> bool {
        self.agent_output.get("alert").and_then(|v| v.as_bool()).unwrap_or(false)
    }
}
