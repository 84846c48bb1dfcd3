//! Integration tests for configuration loading

use shelfsense::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[source]
path = "recordings/store.jsonl"
fps = 25.0
run_fps = 5

[tracking]
distance_threshold = 120.0
track_lost_timeout_sec = 2.5
external_tracker = true

[events]
check_interval_sec = 0.5

[rci]
window_sec = 120.0
check_interval_sec = 15.0

[outcomes]
eval_delay_sec = 30.0
optimize_every_n_events = 10

[runtime]
dir = "/tmp/shelfsense-runtime"

[llm]
api_key = "llm-key"
model = "gemini-2.0-flash"

[simulation]
enabled = true
events_path = "fixtures/events.json"

[metrics]
interval_secs = 15.0

[[zones]]
name = "Produce"
rect = [0.0, 0.0, 0.5, 1.0]

[[zones]]
name = "Bakery"
rect = [0.5, 0.0, 1.0, 1.0]
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.source_path(), "recordings/store.jsonl");
    assert_eq!(config.frame_step(), 5);
    assert_eq!(config.distance_threshold(), 120.0);
    assert_eq!(config.track_lost_timeout_sec(), 2.5);
    assert!(config.external_tracker());
    assert_eq!(config.event_check_interval_sec(), 0.5);
    assert_eq!(config.rci_window_sec(), 120.0);
    assert_eq!(config.rci_cooldown_sec(), 300.0);
    assert_eq!(config.rci_check_interval_sec(), 15.0);
    assert_eq!(config.outcome_eval_delay_sec(), 30.0);
    assert_eq!(config.optimize_every_n_events(), 10);
    assert_eq!(config.runtime_dir().to_str(), Some("/tmp/shelfsense-runtime"));
    assert_eq!(config.llm().api_key.as_deref(), Some("llm-key"));
    assert_eq!(config.llm().model, "gemini-2.0-flash");
    assert!(config.simulation_enabled());
    assert_eq!(config.simulation_events_path(), "fixtures/events.json");
    assert_eq!(config.metrics_interval_secs(), 15.0);

    let zones: Vec<&str> = config.zones().iter().map(|z| z.name.as_str()).collect();
    assert_eq!(zones, vec!["Produce", "Bakery"]);
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.source_path(), "demo/frames.jsonl");
    assert_eq!(config.run_fps(), 10);
    assert_eq!(config.rci_check_interval_sec(), 30.0);
    assert_eq!(config.zones().len(), 3);
    assert!(config.policy_override().is_none());
}

#[test]
fn test_zero_cadence_is_clamped() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[outcomes]\noptimize_every_n_events = 0\n").unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.optimize_every_n_events(), 1);
}
