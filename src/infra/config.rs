//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! API keys missing from the file are read from `LLM_API_KEY`,
//! `EVAL_API_KEY` and `TTS_API_KEY`.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// JSONL file with one frame of detections per line
    #[serde(default = "default_source_path")]
    pub path: String,
    /// Native frame rate of the source
    #[serde(default = "default_source_fps")]
    pub fps: f64,
    /// Target processing rate; frames are decimated to approach it
    #[serde(default = "default_run_fps")]
    pub run_fps: u32,
}

fn default_source_path() -> String {
    "demo/frames.jsonl".to_string()
}

fn default_source_fps() -> f64 {
    30.0
}

fn default_run_fps() -> u32 {
    10
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { path: default_source_path(), fps: default_source_fps(), run_fps: default_run_fps() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Centroid association radius in pixels
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,
    #[serde(default = "default_track_lost_timeout")]
    pub track_lost_timeout_sec: f64,
    /// Trust identities supplied by the source (external tracker)
    #[serde(default)]
    pub external_tracker: bool,
}

fn default_distance_threshold() -> f64 {
    90.0
}

fn default_track_lost_timeout() -> f64 {
    1.0
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_distance_threshold(),
            track_lost_timeout_sec: default_track_lost_timeout(),
            external_tracker: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_check_interval")]
    pub check_interval_sec: f64,
}

fn default_event_check_interval() -> f64 {
    1.0
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { check_interval_sec: default_event_check_interval() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RciConfig {
    #[serde(default = "default_rci_window")]
    pub window_sec: f64,
    #[serde(default = "default_rci_cooldown")]
    pub cooldown_sec: f64,
    #[serde(default = "default_rci_check_interval")]
    pub check_interval_sec: f64,
}

fn default_rci_window() -> f64 {
    300.0
}

fn default_rci_cooldown() -> f64 {
    300.0
}

fn default_rci_check_interval() -> f64 {
    30.0
}

impl Default for RciConfig {
    fn default() -> Self {
        Self {
            window_sec: default_rci_window(),
            cooldown_sec: default_rci_cooldown(),
            check_interval_sec: default_rci_check_interval(),
        }
    }
}

/// Thresholds applied on top of the stored policy when `override` is set
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyOverrideConfig {
    #[serde(default, rename = "override")]
    pub enabled: bool,
    #[serde(default = "default_alert_conf_threshold")]
    pub alert_conf_threshold: f64,
    #[serde(default = "default_dwell_threshold")]
    pub dwell_threshold_sec: f64,
    #[serde(default = "default_motion_threshold")]
    pub motion_threshold: f64,
    #[serde(default = "default_rci_min_alerts")]
    pub rci_min_alerts: usize,
}

fn default_alert_conf_threshold() -> f64 {
    0.75
}

fn default_dwell_threshold() -> f64 {
    20.0
}

fn default_motion_threshold() -> f64 {
    0.25
}

fn default_rci_min_alerts() -> usize {
    3
}

impl Default for PolicyOverrideConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            alert_conf_threshold: default_alert_conf_threshold(),
            dwell_threshold_sec: default_dwell_threshold(),
            motion_threshold: default_motion_threshold(),
            rci_min_alerts: default_rci_min_alerts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutcomesConfig {
    #[serde(default = "default_outcome_delay")]
    pub eval_delay_sec: f64,
    #[serde(default = "default_optimize_every")]
    pub optimize_every_n_events: usize,
}

fn default_outcome_delay() -> f64 {
    45.0
}

fn default_optimize_every() -> usize {
    20
}

impl Default for OutcomesConfig {
    fn default() -> Self {
        Self {
            eval_delay_sec: default_outcome_delay(),
            optimize_every_n_events: default_optimize_every(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Directory for policy, audit log, JSONL side effects and snapshots
    #[serde(default = "default_runtime_dir")]
    pub dir: String,
}

fn default_runtime_dir() -> String {
    "runtime".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { dir: default_runtime_dir() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_llm_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_llm_timeout_ms() -> u64 {
    12_000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            timeout_ms: default_llm_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvalConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub project: String,
    #[serde(default = "default_eval_base_url")]
    pub base_url: String,
    #[serde(default = "default_eval_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_eval_base_url() -> String {
    "https://api.braintrust.dev".to_string()
}

fn default_eval_timeout_ms() -> u64 {
    10_000
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            project: String::new(),
            base_url: default_eval_base_url(),
            timeout_ms: default_eval_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_tts_url")]
    pub tts_url: String,
}

fn default_tts_url() -> String {
    "https://api.modulate.ai/v1/tts".to_string()
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self { enabled: false, api_key: None, tts_url: default_tts_url() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FeedbackConfig {
    /// Staff transcript used for the audio feedback proxy
    #[serde(default)]
    pub transcript_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_simulation_events_path")]
    pub events_path: String,
}

fn default_simulation_events_path() -> String {
    "demo/sim_events.json".to_string()
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { enabled: false, events_path: default_simulation_events_path() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Stream seconds between metrics log lines
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: f64,
}

fn default_metrics_interval() -> f64 {
    10.0
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

/// Axis-aligned zone rectangle in normalized `[x1, y1, x2, y2]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    pub rect: [f64; 4],
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub rci: RciConfig,
    #[serde(default)]
    pub policy: PolicyOverrideConfig,
    #[serde(default)]
    pub outcomes: OutcomesConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub eval: EvalConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Order matters: the first matching zone wins
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    config_file: String,
    source_path: String,
    source_fps: f64,
    run_fps: u32,
    distance_threshold: f64,
    track_lost_timeout_sec: f64,
    external_tracker: bool,
    event_check_interval_sec: f64,
    rci_window_sec: f64,
    rci_cooldown_sec: f64,
    rci_check_interval_sec: f64,
    policy_override: PolicyOverrideConfig,
    outcome_eval_delay_sec: f64,
    optimize_every_n_events: usize,
    runtime_dir: PathBuf,
    llm: LlmConfig,
    eval: EvalConfig,
    voice: VoiceConfig,
    transcript_path: Option<String>,
    simulation_enabled: bool,
    simulation_events_path: String,
    metrics_interval_secs: f64,
    zones: Vec<ZoneConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn default_zones() -> Vec<ZoneConfig> {
        vec![
            ZoneConfig { name: "Aisle_1".to_string(), rect: [0.05, 0.12, 0.45, 0.85] },
            ZoneConfig { name: "Aisle_2".to_string(), rect: [0.46, 0.12, 0.82, 0.85] },
            ZoneConfig { name: "Checkout".to_string(), rect: [0.83, 0.12, 0.98, 0.85] },
        ]
    }

    /// Config file path: explicit CLI value, then `CONFIG_FILE`, then the dev default
    pub fn resolve_config_path(cli: Option<&str>) -> String {
        if let Some(path) = cli {
            return path.to_string();
        }
        env::var("CONFIG_FILE").unwrap_or_else(|_| "config/dev.toml".to_string())
    }

    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        let zones = if toml_config.zones.is_empty() {
            Self::default_zones()
        } else {
            toml_config.zones
        };

        let mut llm = toml_config.llm;
        llm.api_key = llm.api_key.filter(|k| !k.is_empty()).or_else(|| env_key("LLM_API_KEY"));
        let mut eval = toml_config.eval;
        eval.api_key = eval.api_key.filter(|k| !k.is_empty()).or_else(|| env_key("EVAL_API_KEY"));
        let mut voice = toml_config.voice;
        voice.api_key = voice.api_key.filter(|k| !k.is_empty()).or_else(|| env_key("TTS_API_KEY"));

        Self {
            config_file: config_file.to_string(),
            source_path: toml_config.source.path,
            source_fps: toml_config.source.fps,
            run_fps: toml_config.source.run_fps,
            distance_threshold: toml_config.tracking.distance_threshold,
            track_lost_timeout_sec: toml_config.tracking.track_lost_timeout_sec,
            external_tracker: toml_config.tracking.external_tracker,
            event_check_interval_sec: toml_config.events.check_interval_sec,
            rci_window_sec: toml_config.rci.window_sec,
            rci_cooldown_sec: toml_config.rci.cooldown_sec,
            rci_check_interval_sec: toml_config.rci.check_interval_sec,
            policy_override: toml_config.policy,
            outcome_eval_delay_sec: toml_config.outcomes.eval_delay_sec,
            optimize_every_n_events: toml_config.outcomes.optimize_every_n_events.max(1),
            runtime_dir: PathBuf::from(toml_config.runtime.dir),
            llm,
            eval,
            voice,
            transcript_path: toml_config.feedback.transcript_path,
            simulation_enabled: toml_config.simulation.enabled,
            simulation_events_path: toml_config.simulation.events_path,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            zones,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Frames to skip between processed frames so the loop runs near `run_fps`
    pub fn frame_step(&self) -> u64 {
        let src_fps = if self.source_fps > 0.0 { self.source_fps } else { 30.0 };
        ((src_fps / self.run_fps.max(1) as f64) as u64).max(1)
    }

    // Getters for all config fields
    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn source_fps(&self) -> f64 {
        self.source_fps
    }

    pub fn run_fps(&self) -> u32 {
        self.run_fps
    }

    pub fn distance_threshold(&self) -> f64 {
        self.distance_threshold
    }

    pub fn track_lost_timeout_sec(&self) -> f64 {
        self.track_lost_timeout_sec
    }

    pub fn external_tracker(&self) -> bool {
        self.external_tracker
    }

    pub fn event_check_interval_sec(&self) -> f64 {
        self.event_check_interval_sec
    }

    pub fn rci_window_sec(&self) -> f64 {
        self.rci_window_sec
    }

    pub fn rci_cooldown_sec(&self) -> f64 {
        self.rci_cooldown_sec
    }

    pub fn rci_check_interval_sec(&self) -> f64 {
        self.rci_check_interval_sec
    }

    pub fn policy_override(&self) -> Option<&PolicyOverrideConfig> {
        self.policy_override.enabled.then_some(&self.policy_override)
    }

    pub fn outcome_eval_delay_sec(&self) -> f64 {
        self.outcome_eval_delay_sec
    }

    pub fn optimize_every_n_events(&self) -> usize {
        self.optimize_every_n_events
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    pub fn llm(&self) -> &LlmConfig {
        &self.llm
    }

    pub fn eval(&self) -> &EvalConfig {
        &self.eval
    }

    pub fn voice(&self) -> &VoiceConfig {
        &self.voice
    }

    pub fn transcript_path(&self) -> Option<&str> {
        self.transcript_path.as_deref()
    }

    pub fn simulation_enabled(&self) -> bool {
        self.simulation_enabled
    }

    pub fn simulation_events_path(&self) -> &str {
        &self.simulation_events_path
    }

    pub fn metrics_interval_secs(&self) -> f64 {
        self.metrics_interval_secs
    }

    pub fn zones(&self) -> &[ZoneConfig] {
        &self.zones
    }

    /// Builder method for tests to point the runtime directory somewhere disposable
    #[cfg(test)]
    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = dir.into();
        self
    }

    /// Builder method for tests to shorten the outcome delay
    #[cfg(test)]
    pub fn with_outcome_eval_delay_sec(mut self, secs: f64) -> Self {
        self.outcome_eval_delay_sec = secs;
        self
    }

    /// Builder method for tests to change the optimization cadence
    #[cfg(test)]
    pub fn with_optimize_every_n_events(mut self, n: usize) -> Self {
        self.optimize_every_n_events = n.max(1);
        self
    }
}

fn env_key(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}
