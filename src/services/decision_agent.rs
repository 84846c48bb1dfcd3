//! Alert decision with a deterministic fallback
//!
//! The backend result is validated into `DecisionOutput`. Backend errors and
//! invalid payloads fall back to the dwell/motion heuristic, and a heuristic
//! alert overrides a backend that declines or is unsure.

use crate::domain::events::{DecisionOutput, Observation};
use crate::domain::types::round_to;
use crate::io::backend::{BackendError, JsonGenerator};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DECISION_SYSTEM_PROMPT: &str = "\
You are ShelfSense AI Decision Agent for autonomous retail support.
Use only provided observation fields: zone, dwell_time, motion_score, recent_zone_history, queue_len, pickup_proxy.
Safety policy:
- No identity inference.
- No face recognition.
- No emotion detection.
- No demographic inference.
- Do not mention personal traits.
Return JSON only matching schema:
{\"alert\": bool, \"confidence\": 0..1, \"recommended_action\": string, \"reason\": string, \"tags\": [string]}
Be conservative when uncertain. If uncertain, set alert=false and low confidence.";

const HEURISTIC_MIN_DWELL: f64 = 6.0;
const HEURISTIC_MAX_MOTION: f64 = 0.25;
/// Backend confidence below this loses to a heuristic alert
const GUARDRAIL_CONFIDENCE: f64 = 0.75;

/// Local rule: sustained dwell with little motion suggests a customer needs help
pub fn heuristic_decision(obs: &Observation) -> DecisionOutput {
    let dwell = obs.dwell_time;
    let motion = obs.motion_score;
    if dwell >= HEURISTIC_MIN_DWELL && motion <= HEURISTIC_MAX_MOTION {
        let confidence = (0.72 + dwell / 90.0 + (0.2 - motion.min(0.2))).clamp(0.78, 0.95);
        return DecisionOutput {
            alert: true,
            confidence: round_to(confidence, 3),
            recommended_action: format!("Dispatch associate to assist in {}", obs.zone),
            reason: "Heuristic fallback: prolonged dwell with low motion indicates assistance need".to_string(),
            tags: vec!["heuristic_fallback".to_string(), "assistance_candidate".to_string()],
        };
    }
    DecisionOutput::default()
}

/// Parse and range-check a backend payload
pub fn validate_decision(value: serde_json::Value) -> Result<DecisionOutput, BackendError> {
    let out: DecisionOutput = serde_json::from_value(value)?;
    if !(0.0..=1.0).contains(&out.confidence) {
        return Err(BackendError::InvalidPayload(format!("confidence {} out of range", out.confidence)));
    }
    Ok(out)
}

/// How a decision was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Backend,
    Heuristic,
    Guardrail,
}

pub struct DecisionAgent {
    backend: Arc<dyn JsonGenerator>,
}

impl DecisionAgent {
    pub fn new(backend: Arc<dyn JsonGenerator>) -> Self {
        Self { backend }
    }

    pub async fn decide(&self, obs: &Observation) -> DecisionOutput {
        self.decide_with_source(obs).await.0
    }

    pub async fn decide_with_source(&self, obs: &Observation) -> (DecisionOutput, DecisionSource) {
        let heuristic = heuristic_decision(obs);
        let payload = match serde_json::to_value(obs) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "decision_payload_failed");
                return (heuristic, DecisionSource::Heuristic);
            }
        };

        let result = self
            .backend
            .generate_json(DECISION_SYSTEM_PROMPT, &payload)
            .await
            .and_then(validate_decision);

        match result {
            Ok(out) => {
                if heuristic.alert && (!out.alert || out.confidence < GUARDRAIL_CONFIDENCE) {
                    debug!(
                        zone = %obs.zone,
                        backend_alert = %out.alert,
                        backend_confidence = %out.confidence,
                        "decision_guardrail_override"
                    );
                    return (heuristic, DecisionSource::Guardrail);
                }
                (out, DecisionSource::Backend)
            }
            Err(BackendError::Disabled) => (heuristic, DecisionSource::Heuristic),
            Err(e) => {
                warn!(zone = %obs.zone, kind = %e.kind(), error = %e, "decision_backend_failed_using_heuristic");
                (heuristic, DecisionSource::Heuristic)
            }
        }
    }
}
