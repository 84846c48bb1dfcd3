//! Boundary contracts for remote collaborators
//!
//! Every remote call returns `Result<_, BackendError>`; callers match on the
//! error and pick their local fallback. Nothing here is fatal.

use crate::domain::eval::EvalRecord;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No credentials configured
    #[error("backend disabled")]
    Disabled,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport: {0}")]
    Transport(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::InvalidPayload(e.to_string())
    }
}

impl BackendError {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Disabled => "disabled",
            BackendError::Http { .. } => "http",
            BackendError::Transport(_) => "transport",
            BackendError::InvalidPayload(_) => "invalid_payload",
        }
    }
}

/// Produces a JSON object for a system prompt and a JSON payload
#[async_trait]
pub trait JsonGenerator: Send + Sync {
    async fn generate_json(&self, system_prompt: &str, payload: &Value) -> Result<Value, BackendError>;
}

/// Scores, stores and serves unified evaluation records
#[async_trait]
pub trait EvalBackend: Send + Sync {
    /// Remote scoring; on `Err` the caller scores locally
    async fn evaluate_record(&self, record: &EvalRecord) -> Result<EvalRecord, BackendError>;

    /// Persist a scored record locally and, when enabled, remotely
    async fn log_record(&self, record: &EvalRecord);

    /// Most recent records, oldest first
    async fn fetch_recent(&self, limit: usize) -> Vec<EvalRecord>;
}

/// Fire-and-forget notification channel
pub trait Notifier: Send + Sync {
    fn speak(&self, text: &str);
}

/// Notifier that only logs
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn speak(&self, text: &str) {
        tracing::info!(text = %text, "voice_text");
    }
}
