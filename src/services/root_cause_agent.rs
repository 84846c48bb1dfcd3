//! Root-cause summary for a cluster of alerts in one zone

use crate::domain::events::{confidence_in_range, Cluster, RciOutput};
use crate::io::backend::{BackendError, JsonGenerator};
use std::sync::Arc;
use tracing::warn;

pub const RCI_SYSTEM_PROMPT: &str = "\
You are ShelfSense Root Cause Agent.
Input is clustered alert data per zone over a recent window.
Return JSON only with schema:
{\"issue\": string, \"confidence\": 0..1, \"recommended_action\": string, \"reason\": string}
Do not include identity, face, emotion, or demographic assumptions.";

pub fn validate_rci(value: serde_json::Value) -> Result<RciOutput, BackendError> {
    let out: RciOutput = serde_json::from_value(value)?;
    if !confidence_in_range(out.confidence) {
        return Err(BackendError::InvalidPayload(format!("confidence {} out of range", out.confidence)));
    }
    Ok(out)
}

pub struct RootCauseAgent {
    backend: Arc<dyn JsonGenerator>,
}

impl RootCauseAgent {
    pub fn new(backend: Arc<dyn JsonGenerator>) -> Self {
        Self { backend }
    }

    /// Any backend failure yields the neutral "No issue" output
    pub async fn analyze(&self, cluster: &Cluster) -> RciOutput {
        let payload = match serde_json::to_value(cluster) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "rci_payload_failed");
                return RciOutput::default();
            }
        };

        match self.backend.generate_json(RCI_SYSTEM_PROMPT, &payload).await.and_then(validate_rci) {
            Ok(out) => out,
            Err(BackendError::Disabled) => RciOutput::default(),
            Err(e) => {
                warn!(zone = %cluster.zone, kind = %e.kind(), error = %e, "rci_backend_failed");
                RciOutput::default()
            }
        }
    }
}
