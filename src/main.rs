//! ShelfSense - in-store assistance loop
//!
//! Replays detection frames through tracking, zone dwell, alert decisions,
//! root-cause clustering and self-tuning of the alert policy.
//!
//! Module structure:
//! - `domain/` - Core types (frames, events, policy, eval records)
//! - `io/` - External interfaces (model backend, eval log, voice, frame replay)
//! - `services/` - Business logic (ControlLoop, tracker, agents, optimizer)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use shelfsense::infra::{Config, Metrics};
use shelfsense::io::eval_client::EVAL_LOG_FILE;
use shelfsense::io::runtime_state::RuntimeState;
use shelfsense::io::{
    EvalBackend, EvalClient, JsonlFrameSource, LlmClient, LogNotifier, Notifier, VoiceNotifier,
};
use shelfsense::services::identity_tracker::{FrameDetector, FrameTracker};
use shelfsense::services::simulation::load_observations;
use shelfsense::services::{
    ControlLoop, DecisionAgent, IdentityTracker, LoopComponents, PersonStateStore, PolicyStore, Simulation,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// ShelfSense - autonomous retail assistance
#[derive(Parser, Debug)]
#[command(name = "shelfsense", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Run the offline simulation regardless of the config
    #[arg(long)]
    simulate: bool,
}

/// Staff transcript for the audio feedback proxy; empty when unset or unreadable
fn load_transcript(path: Option<&str>) -> String {
    let Some(path) = path else {
        return String::new();
    };
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path, error = %e, "transcript_unreadable");
            String::new()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-decision visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "shelfsense starting");

    let args = Args::parse();
    let config = Config::load_from_path(&Config::resolve_config_path(args.config.as_deref()));

    let llm = Arc::new(LlmClient::new(config.llm()));
    let eval_client = EvalClient::new(config.eval(), config.runtime_dir().join(EVAL_LOG_FILE));
    info!(
        config_file = %config.config_file(),
        source = %config.source_path(),
        run_fps = %config.run_fps(),
        runtime_dir = %config.runtime_dir().display(),
        zones = %config.zones().len(),
        policy_override = %config.policy_override().is_some(),
        llm_enabled = %llm.enabled(),
        llm_model = %llm.current_model(),
        eval_remote = %eval_client.enabled(),
        voice_enabled = %config.voice().enabled,
        "config_loaded"
    );

    std::fs::create_dir_all(config.runtime_dir())
        .with_context(|| format!("Failed to create runtime dir {}", config.runtime_dir().display()))?;
    let policy_store = Arc::new(PolicyStore::in_dir(config.runtime_dir()));
    let eval: Arc<dyn EvalBackend> = Arc::new(eval_client);

    if args.simulate || config.simulation_enabled() {
        info!(path = %config.simulation_events_path(), "simulation_mode");
        let Some(observations) = load_observations(Path::new(config.simulation_events_path()))? else {
            return Ok(());
        };
        let simulation = Simulation::new(
            policy_store,
            DecisionAgent::new(llm),
            eval,
            RuntimeState::new(config.runtime_dir()),
            config.optimize_every_n_events(),
        );
        simulation.run(&observations).await;
        return Ok(());
    }

    let metrics = Arc::new(Metrics::new());
    let tracker = if config.external_tracker() {
        IdentityTracker::with_external(Box::new(FrameDetector), Box::new(FrameTracker), config.distance_threshold())
    } else {
        IdentityTracker::centroid(Box::new(FrameDetector), config.distance_threshold())
    }
    .with_metrics(metrics.clone());

    let notifier: Arc<dyn Notifier> = if config.voice().enabled {
        Arc::new(VoiceNotifier::new(config.voice()))
    } else {
        Arc::new(LogNotifier)
    };
    let transcript = load_transcript(config.transcript_path());

    // Unopenable source is fatal
    let mut source = JsonlFrameSource::open(config.source_path())?;

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let components = LoopComponents {
        tracker,
        people: Arc::new(PersonStateStore::new()),
        policy_store,
        generator: llm,
        eval,
        notifier,
    };
    let mut control = ControlLoop::new(config, metrics, components, transcript);
    control.run(&mut source, shutdown_rx).await;

    info!(skipped_lines = %source.skipped(), "shelfsense shutdown complete");
    Ok(())
}
