//! Delayed outcome scoring for accepted alerts
//!
//! Every alert is revisited once `outcome_eval_delay_sec` of stream time has
//! passed. The signals are proxies read from tracking state; nobody labels
//! the alert by hand.

use crate::domain::eval::{EvalRecord, OutcomeSignals, RecordMetadata, RecordType};
use crate::domain::events::{AlertLogEntry, DecisionOutput, Observation};
use crate::domain::policy::Policy;
use crate::services::person_state::PersonState;
use crate::services::scoring::TRANSCRIPT_EXCERPT_CHARS;
use std::collections::VecDeque;

/// Alerts in one zone within this many seconds count towards spam
pub const SPAM_WINDOW_SEC: f64 = 60.0;
pub const SPAM_ALERT_COUNT: usize = 5;
/// Extra dwell beyond the threshold before a vanished customer counts as abandoned
pub const ABANDON_DWELL_MARGIN_SEC: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct PendingOutcome {
    pub due_ts: f64,
    pub alert: AlertLogEntry,
    pub decision: DecisionOutput,
    pub observation: Observation,
}

/// Alerts waiting for their outcome, in acceptance order
#[derive(Debug, Default)]
pub struct OutcomeQueue {
    items: VecDeque<PendingOutcome>,
}

impl OutcomeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: PendingOutcome) {
        self.items.push_back(item);
    }

    /// Remove and return every item with `now >= due_ts`, keeping order
    pub fn take_due(&mut self, now: f64) -> Vec<PendingOutcome> {
        let (due, waiting): (Vec<_>, Vec<_>) = self.items.drain(..).partition(|item| now >= item.due_ts);
        self.items = waiting.into();
        due
    }

    pub fn drain_all(&mut self) -> Vec<PendingOutcome> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Proxy signals for one alert
///
/// `person` is the current state of the alerted identity, `None` once it has
/// been pruned. `recent_alerts` is the in-memory alert history, which still
/// contains the alert being scored.
pub fn outcome_signals(
    item: &PendingOutcome,
    person: Option<&PersonState>,
    recent_alerts: &[AlertLogEntry],
    policy: &Policy,
    now: f64,
    audio_feedback: f64,
) -> OutcomeSignals {
    let zone = &item.alert.alert.zone;
    let resolved = person.map_or(true, |p| &p.current_zone != zone);
    let abandoned = person.is_none()
        && item.observation.dwell_time >= policy.dwell_threshold_sec + ABANDON_DWELL_MARGIN_SEC;
    let zone_recent = recent_alerts
        .iter()
        .filter(|a| &a.alert.zone == zone && now - a.alert.ts <= SPAM_WINDOW_SEC)
        .count();

    OutcomeSignals {
        resolved_proxy: if resolved { 1.0 } else { 0.0 },
        abandoned_proxy: if abandoned { 1.0 } else { 0.0 },
        spam_proxy: if zone_recent >= SPAM_ALERT_COUNT { 1.0 } else { 0.0 },
        audio_feedback_proxy: audio_feedback,
    }
}

pub fn transcript_excerpt(transcript: &str) -> String {
    transcript.chars().take(TRANSCRIPT_EXCERPT_CHARS).collect()
}

/// Unscored decision record for one alert outcome
pub fn outcome_record(
    item: &PendingOutcome,
    signals: OutcomeSignals,
    policy_version: u64,
    now: f64,
    transcript: &str,
    finalized_at_stream_end: bool,
) -> EvalRecord {
    let mut record = EvalRecord::new(RecordType::Decision, policy_version, now);
    record.observation = serde_json::to_value(&item.observation).unwrap_or_default();
    record.agent_output = serde_json::to_value(&item.decision).unwrap_or_default();
    record.outcome_signals = signals;
    record.metadata = RecordMetadata {
        event_id: Some(item.alert.alert.event_id.clone()),
        alert_id: Some(item.alert.alert.alert_id.clone()),
        zone: Some(item.alert.alert.zone.clone()),
        audio_feedback_excerpt: Some(transcript_excerpt(transcript)),
        finalized_at_stream_end,
    };
    record
}
