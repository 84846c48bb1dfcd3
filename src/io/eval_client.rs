//! Evaluation backend client
//!
//! The local JSONL log is always written and is the fallback source for
//! `fetch_recent`. The remote project receives log rows when credentials are
//! configured.

use crate::domain::eval::{EvalRecord, OutcomeSignals, RecordMetadata, RecordType, Scores};
use crate::domain::types::epoch_secs;
use crate::infra::config::EvalConfig;
use crate::io::backend::{BackendError, EvalBackend};
use crate::io::egress::Egress;
use crate::services::scoring::fallback_score_record;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Local eval log inside the runtime directory
pub const EVAL_LOG_FILE: &str = "eval_log.jsonl";
const LOG_ATTEMPTS: u32 = 2;
const LOG_BACKOFF_STEP_MS: u64 = 500;
const QUERY_PATHS: [&str; 2] = ["/v1/logs/query", "/v1/logs/search"];

#[derive(Debug, Serialize)]
struct LogRow<'a> {
    id: String,
    input: &'a Value,
    output: &'a Value,
    scores: Value,
    metadata: Value,
    tags: [&'a str; 3],
}

pub struct EvalClient {
    api_key: Option<String>,
    project: String,
    base_url: String,
    local: Egress,
    http_client: Option<reqwest::Client>,
}

impl EvalClient {
    pub fn new(config: &EvalConfig, local_path: impl Into<PathBuf>) -> Self {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty());
        let http_client = if api_key.is_some() && !config.project.is_empty() {
            reqwest::Client::builder().timeout(Duration::from_millis(config.timeout_ms)).build().ok()
        } else {
            None
        };
        Self {
            api_key,
            project: config.project.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            local: Egress::new(local_path),
            http_client,
        }
    }

    pub fn enabled(&self) -> bool {
        self.http_client.is_some()
    }

    fn remote(&self) -> Result<(&reqwest::Client, &str), BackendError> {
        match (self.http_client.as_ref(), self.api_key.as_deref()) {
            (Some(client), Some(key)) => Ok((client, key)),
            _ => Err(BackendError::Disabled),
        }
    }

    fn log_payload(&self, record: &EvalRecord) -> Value {
        let id = record
            .metadata
            .alert_id
            .clone()
            .or_else(|| record.metadata.event_id.clone())
            .unwrap_or_else(crate::domain::events::new_uuid_v7);

        let s = &record.scores;
        let mut metadata = json!({
            "ts": record.ts,
            "record_type": record.record_type.as_str(),
            "policy_version": record.policy_version,
            "overall_raw": s.overall_raw,
        });
        if let (Some(md), Ok(Value::Object(extra))) =
            (metadata.as_object_mut(), serde_json::to_value(&record.metadata))
        {
            md.extend(extra);
        }

        let row = LogRow {
            id,
            input: &record.observation,
            output: &record.agent_output,
            scores: json!({
                "overall": s.overall,
                "resolved_proxy": s.resolved_proxy,
                "abandoned_proxy": s.abandoned_proxy,
                "spam_proxy": s.spam_proxy,
                "audio_feedback_proxy": s.audio_feedback_proxy,
                "invalid_json_penalty": s.invalid_json_penalty,
                "forbidden_content_penalty": s.forbidden_content_penalty,
            }),
            metadata,
            tags: ["shelfsense", "autonomous-eval", record.record_type.as_str()],
        };
        json!({ "project": self.project, "rows": [row] })
    }

    async fn post_log(&self, record: &EvalRecord) -> Result<(), BackendError> {
        let (client, key) = self.remote()?;
        let payload = self.log_payload(record);
        let url = format!("{}/v1/logs", self.base_url);

        let mut last_err = BackendError::Disabled;
        for attempt in 0..LOG_ATTEMPTS {
            match client.post(&url).bearer_auth(key).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    last_err = BackendError::Http { status, body: body.chars().take(200).collect() };
                }
                Err(e) => last_err = e.into(),
            }
            warn!(attempt = %(attempt + 1), error = %last_err, "eval_log_request_failed");
            tokio::time::sleep(Duration::from_millis(LOG_BACKOFF_STEP_MS * u64::from(attempt + 1))).await;
        }
        Err(last_err)
    }

    async fn query_remote(&self, limit: usize) -> Result<Vec<EvalRecord>, BackendError> {
        let (client, key) = self.remote()?;
        let payloads = [
            json!({"project": self.project, "limit": limit, "order": "desc"}),
            json!({"project_name": self.project, "limit": limit, "order": "desc"}),
        ];

        for path in QUERY_PATHS {
            let url = format!("{}{}", self.base_url, path);
            for payload in &payloads {
                let resp = match client.post(&url).bearer_auth(key).json(payload).send().await {
                    Ok(resp) if resp.status().is_success() => resp,
                    Ok(resp) => {
                        debug!(url = %url, status = %resp.status().as_u16(), "eval_query_rejected");
                        continue;
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "eval_query_request_failed");
                        continue;
                    }
                };
                let Ok(data) = resp.json::<Value>().await else {
                    continue;
                };
                let mut records = rows_to_records(&data);
                if !records.is_empty() {
                    let start = records.len().saturating_sub(limit);
                    return Ok(records.split_off(start));
                }
            }
        }
        Err(BackendError::InvalidPayload("no rows returned".to_string()))
    }
}

fn num(v: &Value, key: &str) -> f64 {
    v.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Convert remote log rows back into unified records
pub fn rows_to_records(data: &Value) -> Vec<EvalRecord> {
    let rows = ["rows", "data", "results"]
        .iter()
        .filter_map(|k| data.get(*k).and_then(Value::as_array))
        .find(|rows| !rows.is_empty());
    let Some(rows) = rows else {
        return Vec::new();
    };

    rows.iter()
        .filter(|row| row.is_object())
        .map(|row| {
            let md = row.get("metadata").cloned().unwrap_or(Value::Null);
            let sc = row.get("scores").cloned().unwrap_or(Value::Null);
            let record_type = match md.get("record_type").and_then(Value::as_str) {
                Some("rci") => RecordType::Rci,
                _ => RecordType::Decision,
            };
            let text = |k: &str| md.get(k).and_then(Value::as_str).map(str::to_string);

            EvalRecord {
                record_type,
                policy_version: md.get("policy_version").and_then(Value::as_u64).unwrap_or(1),
                ts: md.get("ts").and_then(Value::as_f64).unwrap_or_else(epoch_secs),
                observation: row.get("input").cloned().unwrap_or_else(|| json!({})),
                agent_output: row.get("output").cloned().unwrap_or_else(|| json!({})),
                outcome_signals: OutcomeSignals {
                    resolved_proxy: num(&sc, "resolved_proxy"),
                    abandoned_proxy: num(&sc, "abandoned_proxy"),
                    spam_proxy: num(&sc, "spam_proxy"),
                    audio_feedback_proxy: num(&sc, "audio_feedback_proxy"),
                },
                scores: Scores {
                    overall_raw: num(&sc, "overall_raw"),
                    overall: num(&sc, "overall"),
                    resolved_proxy: num(&sc, "resolved_proxy"),
                    abandoned_proxy: num(&sc, "abandoned_proxy"),
                    spam_proxy: num(&sc, "spam_proxy"),
                    audio_feedback_proxy: num(&sc, "audio_feedback_proxy"),
                    invalid_json_penalty: num(&sc, "invalid_json_penalty"),
                    forbidden_content_penalty: num(&sc, "forbidden_content_penalty"),
                },
                metadata: RecordMetadata {
                    event_id: text("event_id"),
                    alert_id: text("alert_id"),
                    zone: text("zone"),
                    ..RecordMetadata::default()
                },
                remote_logged: true,
            }
        })
        .collect()
}

#[async_trait]
impl EvalBackend for EvalClient {
    async fn evaluate_record(&self, record: &EvalRecord) -> Result<EvalRecord, BackendError> {
        self.remote()?;
        let mut scored = fallback_score_record(record.clone());
        self.post_log(&scored).await?;
        scored.remote_logged = true;
        Ok(scored)
    }

    async fn log_record(&self, record: &EvalRecord) {
        self.local.write(record);
        if !self.enabled() || record.remote_logged {
            return;
        }
        if let Err(e) = self.post_log(record).await {
            warn!(kind = %e.kind(), error = %e, "eval_log_failed");
        }
    }

    async fn fetch_recent(&self, limit: usize) -> Vec<EvalRecord> {
        if self.enabled() {
            match self.query_remote(limit).await {
                Ok(records) => return records,
                Err(e) => debug!(error = %e, "eval_fetch_using_local"),
            }
        }
        self.local.read_tail(limit)
    }
}
