//! Spoken staff notifications
//!
//! Synthesis and playback run on a detached task; failures only log.

use crate::domain::events::new_uuid_v7;
use crate::infra::config::VoiceConfig;
use crate::io::backend::{BackendError, Notifier};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

const TTS_TIMEOUT: Duration = Duration::from_secs(8);

/// Text-to-speech REST client
#[derive(Clone)]
pub struct TtsClient {
    api_key: String,
    endpoint: String,
    http_client: reqwest::Client,
}

impl TtsClient {
    pub fn new(api_key: &str, endpoint: &str) -> Option<Self> {
        if api_key.is_empty() {
            return None;
        }
        let http_client = reqwest::Client::builder().timeout(TTS_TIMEOUT).build().ok()?;
        Some(Self { api_key: api_key.to_string(), endpoint: endpoint.to_string(), http_client })
    }

    /// Synthesize `text` into a temporary audio file
    pub async fn synthesize(&self, text: &str) -> Result<PathBuf, BackendError> {
        let resp = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Http { status: status.as_u16(), body: body.chars().take(200).collect() });
        }

        let audio = resp.bytes().await?;
        let path = std::env::temp_dir().join(format!("shelfsense-{}.mp3", new_uuid_v7()));
        tokio::fs::write(&path, &audio)
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(path)
    }
}

/// Hand the file to the first local player that starts and wait for it to exit
async fn play(path: &Path) {
    let candidates: [(&str, &[&str]); 2] = [("afplay", &[]), ("ffplay", &["-nodisp", "-autoexit"])];
    for (program, args) in candidates {
        let Ok(mut child) = Command::new(program)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        else {
            continue;
        };
        debug!(player = %program, file = %path.display(), "voice_playing");
        if let Err(e) = child.wait().await {
            warn!(player = %program, error = %e, "voice_player_failed");
        }
        return;
    }
    info!(file = %path.display(), "voice_saved");
}

pub struct VoiceNotifier {
    enabled: bool,
    client: Option<TtsClient>,
}

impl VoiceNotifier {
    pub fn new(config: &VoiceConfig) -> Self {
        let client = config.api_key.as_deref().and_then(|key| TtsClient::new(key, &config.tts_url));
        Self { enabled: config.enabled, client }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl Notifier for VoiceNotifier {
    fn speak(&self, text: &str) {
        if !self.enabled {
            return;
        }
        let Some(client) = self.client.clone() else {
            info!(text = %text, "voice_fallback_text");
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            info!(text = %text, "voice_fallback_text");
            return;
        };

        let text = text.to_string();
        handle.spawn(async move {
            match client.synthesize(&text).await {
                Ok(path) => play(&path).await,
                Err(e) => {
                    warn!(kind = %e.kind(), error = %e, "voice_synthesis_failed");
                    info!(text = %text, "voice_fallback_text");
                }
            }
        });
    }
}
