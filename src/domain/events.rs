//! Events, alerts and clusters flowing through the control loop
//!
//! - `AssistanceCandidateEvent` - produced by the event trigger, consumed once by the decision step
//! - `AlertRecord` - an event the decision step accepted
//! - `Cluster` - per-zone aggregate of recent alerts
//! - `DecisionOutput` / `RciOutput` - validated backend results

use crate::domain::types::{round_to, TrackId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Number of trailing zone visits carried on an event
pub const RECENT_ZONE_HISTORY: usize = 4;

/// A proposed alert-worthy observation, not yet confirmed
#[derive(Debug, Clone, PartialEq)]
pub struct AssistanceCandidateEvent {
    pub event_id: String,
    pub ts: f64,
    pub person_id: TrackId,
    pub zone: String,
    pub dwell_time: f64,
    pub motion_score: f64,
    pub recent_zone_history: SmallVec<[String; RECENT_ZONE_HISTORY]>,
    pub queue_len: Option<u32>,
    pub pickup_proxy: Option<bool>,
}

/// Wire projection of an event sent to the decision backend and logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub ts: f64,
    #[serde(default)]
    pub person_id: Option<TrackId>,
    #[serde(default = "default_observation_zone")]
    pub zone: String,
    #[serde(default)]
    pub dwell_time: f64,
    #[serde(default = "default_observation_motion")]
    pub motion_score: f64,
    #[serde(default)]
    pub recent_zone_history: Vec<String>,
    #[serde(default)]
    pub queue_len: Option<u32>,
    #[serde(default)]
    pub pickup_proxy: Option<bool>,
    /// Only present in simulated observations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_alert_rate: Option<f64>,
}

fn default_observation_zone() -> String {
    crate::domain::types::UNKNOWN_ZONE.to_string()
}

fn default_observation_motion() -> f64 {
    1.0
}

impl AssistanceCandidateEvent {
    pub fn to_observation(&self) -> Observation {
        Observation {
            event_id: Some(self.event_id.clone()),
            ts: self.ts,
            person_id: Some(self.person_id),
            zone: self.zone.clone(),
            dwell_time: round_to(self.dwell_time, 2),
            motion_score: round_to(self.motion_score, 3),
            recent_zone_history: self.recent_zone_history.to_vec(),
            queue_len: self.queue_len,
            pickup_proxy: self.pickup_proxy,
            zone_alert_rate: None,
        }
    }
}

/// An event accepted by the decision step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub alert_id: String,
    pub event_id: String,
    pub ts: f64,
    pub zone: String,
    pub confidence: f64,
    pub dwell_time: f64,
    pub person_id: TrackId,
}

/// Alert plus the decision text, as written to `alerts.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertLogEntry {
    #[serde(flatten)]
    pub alert: AlertRecord,
    pub action: String,
    pub reason: String,
    pub tags: Vec<String>,
}

/// Per-zone aggregate of alerts inside the RCI window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub zone: String,
    pub alerts_count: usize,
    pub avg_confidence: f64,
    pub avg_dwell: f64,
    pub abandon_rate_proxy: f64,
    pub queue_stats: f64,
}

/// Root-cause record as written to `rci.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RciRecord {
    pub ts: f64,
    pub zone: String,
    pub issue: String,
    pub confidence: f64,
    pub recommended_action: String,
    pub reason: String,
    pub cluster: Cluster,
}

/// Validated decision backend result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutput {
    #[serde(default)]
    pub alert: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default = "default_decision_action")]
    pub recommended_action: String,
    #[serde(default = "default_decision_reason")]
    pub reason: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_decision_action() -> String {
    "No action".to_string()
}

fn default_decision_reason() -> String {
    "Insufficient confidence".to_string()
}

impl Default for DecisionOutput {
    fn default() -> Self {
        Self {
            alert: false,
            confidence: 0.0,
            recommended_action: default_decision_action(),
            reason: default_decision_reason(),
            tags: Vec::new(),
        }
    }
}

/// Validated root-cause backend result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RciOutput {
    #[serde(default = "default_rci_issue")]
    pub issue: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default = "default_rci_action")]
    pub recommended_action: String,
    #[serde(default = "default_rci_reason")]
    pub reason: String,
}

fn default_rci_issue() -> String {
    "No issue".to_string()
}

fn default_rci_action() -> String {
    "Monitor".to_string()
}

fn default_rci_reason() -> String {
    "No cluster signal".to_string()
}

impl Default for RciOutput {
    fn default() -> Self {
        Self {
            issue: default_rci_issue(),
            confidence: 0.0,
            recommended_action: default_rci_action(),
            reason: default_rci_reason(),
        }
    }
}

/// Confidence must lie in [0, 1]; anything else is an invalid payload
#[inline]
pub fn confidence_in_range(confidence: f64) -> bool {
    (0.0..=1.0).contains(&confidence)
}
