//! Local scoring of evaluation records
//!
//! `overall_raw = resolved - abandoned - 0.8*spam + 0.3*audio - invalid - forbidden`
//! spans roughly [-2.8, 1.0] and is normalized into [0, 1].

use crate::domain::eval::{EvalRecord, RecordType, Scores};
use crate::domain::types::round_to;
use serde::Serialize;
use serde_json::Value;

/// Terms an agent output must never contain
pub const FORBIDDEN_KEYWORDS: [&str; 8] =
    ["face", "identity", "emotion", "male", "female", "race", "ethnicity", "age"];

const FALSE_ALERT_MARKERS: [&str; 5] =
    ["false alert", "wrong alert", "not needed", "no help needed", "unnecessary alert"];
const APPRECIATION_MARKERS: [&str; 5] =
    ["appreciate it", "thank you", "thanks", "helpful alert", "good catch"];
const FRICTION_MARKERS: [&str; 8] = [
    "need help",
    "can't find",
    "cannot find",
    "looking for",
    "where is",
    "long line",
    "queue",
    "waiting",
];

/// Characters of the transcript kept on a record's metadata
pub const TRANSCRIPT_EXCERPT_CHARS: usize = 120;

fn str_or_missing(output: &Value, key: &str) -> bool {
    output.get(key).map_or(true, Value::is_string)
}

fn confidence_ok(output: &Value) -> bool {
    output
        .get("confidence")
        .and_then(Value::as_f64)
        .is_some_and(|c| (0.0..=1.0).contains(&c))
}

pub fn decision_output_is_valid(output: &Value) -> bool {
    output.get("alert").is_some_and(Value::is_boolean)
        && confidence_ok(output)
        && str_or_missing(output, "recommended_action")
        && str_or_missing(output, "reason")
        && match output.get("tags") {
            None => true,
            Some(Value::Array(tags)) => tags.iter().all(Value::is_string),
            Some(_) => false,
        }
}

pub fn rci_output_is_valid(output: &Value) -> bool {
    str_or_missing(output, "issue")
        && confidence_ok(output)
        && str_or_missing(output, "recommended_action")
        && str_or_missing(output, "reason")
}

pub fn output_is_valid(record_type: RecordType, output: &Value) -> bool {
    match record_type {
        RecordType::Decision => decision_output_is_valid(output),
        RecordType::Rci => rci_output_is_valid(output),
    }
}

fn text_field(output: &Value, key: &str) -> String {
    match output.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// 1.0 when issue, reason or action mention a forbidden keyword
pub fn forbidden_penalty(output: &Value) -> f64 {
    let text = [text_field(output, "issue"), text_field(output, "reason"), text_field(output, "recommended_action")]
        .join(" ")
        .to_lowercase();
    if FORBIDDEN_KEYWORDS.iter().any(|k| text.contains(k)) {
        1.0
    } else {
        0.0
    }
}

pub fn overall_raw(
    resolved: f64,
    abandoned: f64,
    spam: f64,
    audio_feedback: f64,
    invalid_json: f64,
    forbidden_content: f64,
) -> f64 {
    round_to(resolved - abandoned - 0.8 * spam + 0.3 * audio_feedback - invalid_json - forbidden_content, 4)
}

pub fn normalize_overall(raw: f64) -> f64 {
    round_to(((raw + 2.8) / 3.8).clamp(0.0, 1.0), 4)
}

/// Fill `record.scores` from its outcome signals and agent output
pub fn fallback_score_record(mut record: EvalRecord) -> EvalRecord {
    let sig = record.outcome_signals;
    let invalid = if output_is_valid(record.record_type, &record.agent_output) { 0.0 } else { 1.0 };
    let forbidden = forbidden_penalty(&record.agent_output);
    let raw = overall_raw(
        sig.resolved_proxy,
        sig.abandoned_proxy,
        sig.spam_proxy,
        sig.audio_feedback_proxy,
        invalid,
        forbidden,
    );
    record.scores = Scores {
        overall_raw: raw,
        overall: normalize_overall(raw),
        resolved_proxy: sig.resolved_proxy,
        abandoned_proxy: sig.abandoned_proxy,
        spam_proxy: sig.spam_proxy,
        audio_feedback_proxy: sig.audio_feedback_proxy,
        invalid_json_penalty: invalid,
        forbidden_content_penalty: forbidden,
    };
    record
}

/// Staff feedback signal from a transcript
pub fn audio_feedback_proxy(transcript: &str) -> f64 {
    let t = transcript.to_lowercase();
    if FALSE_ALERT_MARKERS.iter().any(|k| t.contains(k)) {
        return 0.0;
    }
    if APPRECIATION_MARKERS.iter().any(|k| t.contains(k)) {
        return 1.0;
    }
    let hits = FRICTION_MARKERS.iter().filter(|k| t.contains(*k)).count();
    round_to((0.25 + 0.15 * hits as f64).clamp(0.0, 1.0), 3)
}

/// Rolling numbers shown on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EvalSnapshot {
    pub total: usize,
    pub avg_score_last_50: f64,
    pub spam_rate: f64,
    pub resolved_rate: f64,
}

pub fn compute_metrics(records: &[EvalRecord]) -> EvalSnapshot {
    if records.is_empty() {
        return EvalSnapshot::default();
    }
    let last = &records[records.len().saturating_sub(50)..];
    let n = last.len() as f64;
    let avg = |f: fn(&EvalRecord) -> f64| round_to(last.iter().map(f).sum::<f64>() / n, 4);
    EvalSnapshot {
        total: records.len(),
        avg_score_last_50: avg(|r| r.scores.overall),
        spam_rate: avg(|r| r.outcome_signals.spam_proxy),
        resolved_rate: avg(|r| r.outcome_signals.resolved_proxy),
    }
}
