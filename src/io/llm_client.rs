//! Generative-language REST client returning parsed JSON
//!
//! Retries a fixed number of times with a linear backoff. A 404 naming the
//! model switches to the next fallback model for the rest of the run.

use crate::infra::config::LlmConfig;
use crate::io::backend::{BackendError, JsonGenerator};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const FALLBACK_MODELS: [&str; 4] =
    ["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-2.0-flash-lite", "gemini-flash-latest"];
const MAX_ATTEMPTS: u32 = 4;
const BACKOFF_STEP_MS: u64 = 700;
const ERROR_BODY_LIMIT: usize = 300;

pub struct LlmClient {
    api_key: Option<String>,
    base_url: String,
    /// Configured model first, then the fallbacks not equal to it
    models: Vec<String>,
    model_index: AtomicUsize,
    http_client: Option<reqwest::Client>,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Self {
        let mut models = vec![config.model.clone()];
        models.extend(FALLBACK_MODELS.iter().filter(|m| **m != config.model).map(|m| m.to_string()));

        let api_key = config.api_key.clone().filter(|k| !k.is_empty());
        let http_client = if api_key.is_some() {
            reqwest::Client::builder().timeout(Duration::from_millis(config.timeout_ms)).build().ok()
        } else {
            None
        };

        Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            models,
            model_index: AtomicUsize::new(0),
            http_client,
        }
    }

    pub fn enabled(&self) -> bool {
        self.api_key.is_some() && self.http_client.is_some()
    }

    pub fn current_model(&self) -> &str {
        let idx = self.model_index.load(Ordering::Relaxed).min(self.models.len() - 1);
        &self.models[idx]
    }

    fn build_prompt(system_prompt: &str, payload: &Value) -> String {
        format!(
            "System: {}\nReturn JSON only with no markdown fence.\nObservation: {}",
            system_prompt, payload
        )
    }

    async fn attempt(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        body: &Value,
    ) -> Result<Value, BackendError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.current_model());
        let response = client.post(&url).query(&[("key", api_key)]).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(BackendError::Http { status: status.as_u16(), body });
        }

        let payload: Value = response.json().await?;
        extract_json(&payload)
    }

    /// Advance to the next fallback model, if any remain
    fn switch_model(&self) -> bool {
        let idx = self.model_index.load(Ordering::Relaxed);
        if idx + 1 < self.models.len() {
            self.model_index.store(idx + 1, Ordering::Relaxed);
            warn!(model = %self.models[idx + 1], "llm_model_fallback");
            true
        } else {
            false
        }
    }
}

/// Parse the JSON text carried in the first candidate part
pub fn extract_json(payload: &Value) -> Result<Value, BackendError> {
    let text = payload
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::InvalidPayload("missing candidate text".to_string()))?;
    Ok(serde_json::from_str(text)?)
}

#[async_trait]
impl JsonGenerator for LlmClient {
    async fn generate_json(&self, system_prompt: &str, payload: &Value) -> Result<Value, BackendError> {
        let (Some(api_key), Some(client)) = (self.api_key.as_deref(), self.http_client.as_ref()) else {
            return Err(BackendError::Disabled);
        };

        let body = json!({
            "contents": [{"parts": [{"text": Self::build_prompt(system_prompt, payload)}]}],
            "generationConfig": {"temperature": 0.1, "response_mime_type": "application/json"},
        });

        let mut last_err = BackendError::Disabled;
        for attempt in 0..MAX_ATTEMPTS {
            match self.attempt(client, api_key, &body).await {
                Ok(value) => {
                    debug!(model = %self.current_model(), attempt = %(attempt + 1), "llm_call_ok");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(attempt = %(attempt + 1), kind = %e.kind(), error = %e, "llm_call_failed");
                    if let BackendError::Http { status: 404, ref body } = e {
                        if body.contains("models/") {
                            self.switch_model();
                        }
                    }
                    last_err = e;
                }
            }
            tokio::time::sleep(Duration::from_millis(BACKOFF_STEP_MS * u64::from(attempt + 1))).await;
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_order_dedups_configured() {
        let config = LlmConfig { model: "gemini-2.5-flash-lite".to_string(), ..LlmConfig::default() };
        let client = LlmClient::new(&config);
        assert_eq!(
            client.models,
            vec!["gemini-2.5-flash-lite", "gemini-2.5-flash", "gemini-2.0-flash-lite", "gemini-flash-latest"]
        );
        assert_eq!(client.current_model(), "gemini-2.5-flash-lite");
    }

    #[test]
    fn test_switch_model_stops_at_last() {
        let client = LlmClient::new(&LlmConfig::default());
        assert!(client.switch_model());
        assert!(client.switch_model());
        assert!(client.switch_model());
        assert!(!client.switch_model());
        assert_eq!(client.current_model(), "gemini-flash-latest");
    }

    #[test]
    fn test_extract_json() {
        let payload = json!({
            "candidates": [{"content": {"parts": [{"text": "{\"alert\": true, \"confidence\": 0.9}"}]}}]
        });
        let value = extract_json(&payload).unwrap();
        assert_eq!(value["alert"], true);

        assert!(matches!(extract_json(&json!({})), Err(BackendError::InvalidPayload(_))));

        let bad = json!({"candidates": [{"content": {"parts": [{"text": "not json"}]}}]});
        assert!(matches!(extract_json(&bad), Err(BackendError::InvalidPayload(_))));
    }

    #[tokio::test]
    async fn test_disabled_without_key() {
        let client = LlmClient::new(&LlmConfig { api_key: None, ..LlmConfig::default() });
        assert!(!client.enabled());
        let result = client.generate_json("prompt", &json!({})).await;
        assert!(matches!(result, Err(BackendError::Disabled)));
    }
}
