//! Frame-driven control loop
//!
//! The ControlLoop owns every per-stream structure and drives, per processed frame:
//! - Identity tracking and zone/person state updates
//! - Time-gated assistance checks (decision, alert, voice)
//! - Time-gated root-cause clustering
//! - Delayed outcome scoring and the optimization cadence
//! - Dashboard snapshots
//!
//! All timing uses stream time, so replays are deterministic.

mod handlers;

use crate::domain::eval::EvalRecord;
use crate::domain::events::{AlertLogEntry, RciRecord};
use crate::domain::policy::Policy;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::backend::{BackendError, EvalBackend, JsonGenerator, Notifier};
use crate::io::egress::Egress;
use crate::io::frame_source::FrameSource;
use crate::io::runtime_state::RuntimeState;
use crate::services::decision_agent::DecisionAgent;
use crate::services::identity_tracker::IdentityTracker;
use crate::services::optimizer::OptimizationAgent;
use crate::services::outcomes::OutcomeQueue;
use crate::services::person_state::PersonStateStore;
use crate::services::policy_store::PolicyStore;
use crate::services::rci_aggregator::RciAggregator;
use crate::services::root_cause_agent::RootCauseAgent;
use crate::services::scoring::{audio_feedback_proxy, compute_metrics, fallback_score_record};
use crate::services::zone_mapper::ZoneMapper;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// In-memory alert history used for spam detection and the dashboard
pub const ALERT_HISTORY: usize = 500;
pub const RCI_HISTORY: usize = 200;
/// Floor on the number of records fetched before optimizing
pub const OPTIMIZE_FETCH_MIN: usize = 50;

pub const EVENTS_FILE: &str = "events.jsonl";
pub const ALERTS_FILE: &str = "alerts.jsonl";
pub const RCI_FILE: &str = "rci.jsonl";
pub const OUTCOMES_FILE: &str = "outcomes.jsonl";

/// Shared stores and boundary clients, built once in `main`
pub struct LoopComponents {
    pub tracker: IdentityTracker,
    pub people: Arc<PersonStateStore>,
    pub policy_store: Arc<PolicyStore>,
    pub generator: Arc<dyn JsonGenerator>,
    pub eval: Arc<dyn EvalBackend>,
    pub notifier: Arc<dyn Notifier>,
}

/// Append-only JSONL side effects in the runtime directory
pub(crate) struct Sinks {
    pub(crate) events: Egress,
    pub(crate) alerts: Egress,
    pub(crate) rci: Egress,
    pub(crate) outcomes: Egress,
}

pub struct ControlLoop {
    pub(crate) config: Config,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) tracker: IdentityTracker,
    pub(crate) zones: ZoneMapper,
    pub(crate) people: Arc<PersonStateStore>,
    pub(crate) aggregator: RciAggregator,
    pub(crate) policy_store: Arc<PolicyStore>,
    pub(crate) optimizer: OptimizationAgent,
    pub(crate) decision_agent: DecisionAgent,
    pub(crate) rci_agent: RootCauseAgent,
    pub(crate) eval: Arc<dyn EvalBackend>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) sinks: Sinks,
    pub(crate) runtime_state: RuntimeState,
    /// Staff transcript and the feedback proxy derived from it
    pub(crate) transcript: String,
    pub(crate) audio_proxy: f64,
    pub(crate) alerts: VecDeque<AlertLogEntry>,
    pub(crate) rci_records: VecDeque<RciRecord>,
    pub(crate) eval_records: Vec<EvalRecord>,
    pub(crate) outcomes: OutcomeQueue,
    pub(crate) frame_index: u64,
    /// Stream time of the last processed frame
    pub(crate) now: f64,
    pub(crate) last_event_check: f64,
    pub(crate) last_rci_check: f64,
    pub(crate) last_metrics_report: f64,
}

impl ControlLoop {
    pub fn new(config: Config, metrics: Arc<Metrics>, components: LoopComponents, transcript: String) -> Self {
        let dir = config.runtime_dir().to_path_buf();
        let transcript = transcript.trim().to_string();
        let audio_proxy = if transcript.is_empty() { 0.0 } else { audio_feedback_proxy(&transcript) };
        let initial_policy = components.policy_store.load();

        Self {
            zones: ZoneMapper::new(config.zones()),
            aggregator: RciAggregator::new(
                config.rci_window_sec(),
                initial_policy.rci_min_alerts,
                config.rci_cooldown_sec(),
            ),
            optimizer: OptimizationAgent::new(components.policy_store.clone()),
            decision_agent: DecisionAgent::new(components.generator.clone()),
            rci_agent: RootCauseAgent::new(components.generator),
            sinks: Sinks {
                events: Egress::new(dir.join(EVENTS_FILE)),
                alerts: Egress::new(dir.join(ALERTS_FILE)),
                rci: Egress::new(dir.join(RCI_FILE)),
                outcomes: Egress::new(dir.join(OUTCOMES_FILE)),
            },
            runtime_state: RuntimeState::new(dir),
            tracker: components.tracker,
            people: components.people,
            policy_store: components.policy_store,
            eval: components.eval,
            notifier: components.notifier,
            transcript,
            audio_proxy,
            alerts: VecDeque::with_capacity(ALERT_HISTORY),
            rci_records: VecDeque::with_capacity(RCI_HISTORY),
            eval_records: Vec::new(),
            outcomes: OutcomeQueue::new(),
            frame_index: 0,
            now: 0.0,
            last_event_check: 0.0,
            last_rci_check: 0.0,
            last_metrics_report: 0.0,
            config,
            metrics,
        }
    }

    /// Consume frames until the source ends or shutdown is signalled,
    /// then finalize every pending outcome
    pub async fn run(&mut self, source: &mut dyn FrameSource, shutdown: watch::Receiver<bool>) {
        let step = self.config.frame_step();
        info!(
            frame_step = %step,
            runtime_dir = %self.config.runtime_dir().display(),
            external_tracker = %self.tracker.external_enabled(),
            "control_loop_started"
        );

        loop {
            if *shutdown.borrow() {
                info!(frame_index = %self.frame_index, "control_loop_shutdown_requested");
                break;
            }
            let Some(frame) = source.next_frame() else {
                info!(frame_index = %self.frame_index, "stream_ended");
                break;
            };

            self.frame_index += 1;
            let now = self.stream_time(frame.ts);
            if self.frame_index % step != 0 {
                continue;
            }

            self.process_frame(&frame, now).await;
            tokio::task::yield_now().await;
        }

        self.finish().await;
    }

    /// Frame timestamp, else position derived from the frame index
    pub(crate) fn stream_time(&self, ts: Option<f64>) -> f64 {
        ts.unwrap_or_else(|| {
            let fps = if self.config.source_fps() > 0.0 { self.config.source_fps() } else { 30.0 };
            self.frame_index as f64 / fps
        })
    }

    /// Stored policy with configured thresholds applied on top
    pub fn effective_policy(&self) -> Policy {
        let mut policy = self.policy_store.load();
        if let Some(ov) = self.config.policy_override() {
            policy.alert_conf_threshold = ov.alert_conf_threshold;
            policy.dwell_threshold_sec = ov.dwell_threshold_sec;
            policy.motion_threshold = ov.motion_threshold;
            policy.rci_min_alerts = ov.rci_min_alerts;
        }
        policy
    }

    pub fn eval_records(&self) -> &[EvalRecord] {
        &self.eval_records
    }

    pub fn alerts(&self) -> impl Iterator<Item = &AlertLogEntry> {
        self.alerts.iter()
    }

    pub fn rci_records(&self) -> impl Iterator<Item = &RciRecord> {
        self.rci_records.iter()
    }

    pub fn pending_outcomes(&self) -> usize {
        self.outcomes.len()
    }

    pub(crate) fn write_snapshots(&mut self, policy: &Policy) {
        self.runtime_state.write_metrics(&compute_metrics(&self.eval_records));
        self.runtime_state.write_state(policy, self.alerts.make_contiguous(), self.rci_records.make_contiguous());
    }

    pub(crate) fn report_metrics(&mut self, now: f64) {
        self.last_metrics_report = now;
        self.metrics.report(self.people.len(), self.outcomes.len()).log();
    }
}

pub(crate) fn push_capped<T>(items: &mut VecDeque<T>, item: T, cap: usize) {
    if items.len() >= cap {
        items.pop_front();
    }
    items.push_back(item);
}

/// Score through the backend, falling back to local scoring, then log
///
/// `sink` receives the scored record before the eval log does.
pub async fn evaluate_and_log(eval: &dyn EvalBackend, record: EvalRecord, sink: Option<&Egress>) -> EvalRecord {
    let scored = match eval.evaluate_record(&record).await {
        Ok(scored) => scored,
        Err(BackendError::Disabled) => fallback_score_record(record),
        Err(e) => {
            warn!(kind = %e.kind(), error = %e, "eval_remote_failed_using_local");
            // the failed evaluation already spent the remote log attempts
            let mut local = fallback_score_record(record);
            local.remote_logged = true;
            local
        }
    };
    if let Some(sink) = sink {
        sink.write(&scored);
    }
    eval.log_record(&scored).await;
    scored
}

/// Records to optimize on: the backend's recent records when it returns at
/// least `n`, else the last `n` local records
pub async fn optimization_window(eval: &dyn EvalBackend, local: &[EvalRecord], n: usize) -> Vec<EvalRecord> {
    let fetched = eval.fetch_recent(n.max(OPTIMIZE_FETCH_MIN)).await;
    if fetched.len() >= n {
        return fetched;
    }
    local[local.len().saturating_sub(n)..].to_vec()
}
