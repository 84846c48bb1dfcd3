//! Per-frame stages of the ControlLoop
//!
//! Each stage reads the policy resolved for the current frame so a policy
//! change lands on the next processed frame, never mid-frame.

use super::{evaluate_and_log, optimization_window, push_capped, ControlLoop, ALERT_HISTORY, RCI_HISTORY};
use crate::domain::eval::{EvalRecord, RecordMetadata, RecordType};
use crate::domain::events::{
    new_uuid_v7, AlertLogEntry, AlertRecord, AssistanceCandidateEvent, DecisionOutput, Observation, RciRecord,
};
use crate::domain::policy::Policy;
use crate::domain::types::Frame;
use crate::services::decision_agent::DecisionSource;
use crate::services::event_trigger::EventTrigger;
use crate::services::outcomes::{outcome_record, outcome_signals, transcript_excerpt, PendingOutcome};
use tracing::{debug, info};

impl ControlLoop {
    /// Run every stage for one decimated frame at stream time `now`
    pub(crate) async fn process_frame(&mut self, frame: &Frame, now: f64) {
        self.now = now;
        let policy = self.effective_policy();
        let trigger = EventTrigger::from_policy(&policy);

        let tracks = self.tracker.update(frame);
        for track in &tracks {
            let zone = self.zones.bbox_to_zone(&track.bbox, frame.width, frame.height);
            let center = track.bbox.normalized_center(frame.width, frame.height);
            self.people.update_person(track.identity, zone, center, now);
        }
        self.metrics.record_frame(tracks.len());

        let pruned = self.people.prune_stale(self.config.track_lost_timeout_sec(), now);
        self.metrics.record_pruned(pruned.len());

        if now - self.last_event_check >= self.config.event_check_interval_sec() {
            self.last_event_check = now;
            self.check_events(&policy, &trigger, now).await;
        }

        if now - self.last_rci_check >= self.config.rci_check_interval_sec() {
            self.last_rci_check = now;
            self.check_root_causes(&policy, now).await;
        }

        self.evaluate_due_outcomes(&policy, now).await;
        self.write_snapshots(&policy);

        if now - self.last_metrics_report >= self.config.metrics_interval_secs() {
            self.report_metrics(now);
        }
    }

    /// Ask for a decision on every active person the trigger fires for
    pub(crate) async fn check_events(&mut self, policy: &Policy, trigger: &EventTrigger, now: f64) {
        for state in self.people.active_people() {
            let Some(event) = trigger.maybe_trigger(&state) else {
                continue;
            };
            self.metrics.record_event_triggered();

            let observation = event.to_observation();
            self.sinks.events.write(&observation);

            let (decision, source) = self.decision_agent.decide_with_source(&observation).await;
            if source != DecisionSource::Backend {
                self.metrics.record_decision_fallback();
            }

            let accepted = decision.alert && decision.confidence >= policy.alert_conf_threshold;
            debug!(
                person_id = %event.person_id,
                zone = %event.zone,
                dwell_sec = %observation.dwell_time,
                alert = %decision.alert,
                confidence = %decision.confidence,
                threshold = %policy.alert_conf_threshold,
                source = ?source,
                accepted = %accepted,
                "assistance_decided"
            );
            if accepted {
                self.fire_alert(&event, observation, decision, now);
            }
        }
    }

    fn fire_alert(&mut self, event: &AssistanceCandidateEvent, observation: Observation, decision: DecisionOutput, now: f64) {
        let record = AlertRecord {
            alert_id: new_uuid_v7(),
            event_id: event.event_id.clone(),
            ts: now,
            zone: event.zone.clone(),
            confidence: decision.confidence,
            dwell_time: event.dwell_time,
            person_id: event.person_id,
        };
        let entry = AlertLogEntry {
            alert: record.clone(),
            action: decision.recommended_action.clone(),
            reason: decision.reason.clone(),
            tags: decision.tags.clone(),
        };

        push_capped(&mut self.alerts, entry.clone(), ALERT_HISTORY);
        self.sinks.alerts.write(&entry);
        self.people.mark_alert_sent(event.person_id, &event.zone);
        self.aggregator.add_alert(record);
        self.metrics.record_alert();

        info!(
            alert_id = %entry.alert.alert_id,
            person_id = %event.person_id,
            zone = %event.zone,
            confidence = %decision.confidence,
            dwell_sec = %observation.dwell_time,
            "alert_fired"
        );
        self.notifier.speak(&format!(
            "Shelf assistance suggested at {}. {}",
            event.zone, decision.recommended_action
        ));

        self.outcomes.push(PendingOutcome {
            due_ts: now + self.config.outcome_eval_delay_sec(),
            alert: entry,
            decision,
            observation,
        });
    }

    /// Cluster recent alerts and record one root-cause analysis per cluster
    pub(crate) async fn check_root_causes(&mut self, policy: &Policy, now: f64) {
        self.aggregator.set_min_alerts(policy.rci_min_alerts);
        let clusters = self.aggregator.cluster_candidates(now);

        for cluster in clusters {
            let output = self.rci_agent.analyze(&cluster).await;
            let record = RciRecord {
                ts: now,
                zone: cluster.zone.clone(),
                issue: output.issue.clone(),
                confidence: output.confidence,
                recommended_action: output.recommended_action.clone(),
                reason: output.reason.clone(),
                cluster: cluster.clone(),
            };
            push_capped(&mut self.rci_records, record.clone(), RCI_HISTORY);
            self.sinks.rci.write(&record);
            self.metrics.record_cluster();

            let mut eval = EvalRecord::new(RecordType::Rci, policy.policy_version, now);
            eval.observation = serde_json::to_value(&cluster).unwrap_or_default();
            eval.agent_output = serde_json::to_value(&output).unwrap_or_default();
            eval.outcome_signals.audio_feedback_proxy = self.audio_proxy;
            eval.metadata = RecordMetadata {
                zone: Some(cluster.zone.clone()),
                audio_feedback_excerpt: Some(transcript_excerpt(&self.transcript)),
                ..RecordMetadata::default()
            };
            let scored = evaluate_and_log(self.eval.as_ref(), eval, None).await;
            self.eval_records.push(scored);

            info!(
                zone = %cluster.zone,
                alerts = %cluster.alerts_count,
                issue = %output.issue,
                confidence = %output.confidence,
                "root_cause_detected"
            );
            self.notifier.speak(&format!(
                "Root cause detected in {}. {}",
                cluster.zone, output.recommended_action
            ));
        }
    }

    /// Score every outcome whose delay has elapsed
    pub(crate) async fn evaluate_due_outcomes(&mut self, policy: &Policy, now: f64) {
        let n = self.config.optimize_every_n_events();
        for item in self.outcomes.take_due(now) {
            self.score_outcome(item, policy, now, false).await;
            if self.eval_records.len() % n == 0 {
                self.optimize_now().await;
            }
        }
    }

    pub(crate) async fn score_outcome(&mut self, item: PendingOutcome, policy: &Policy, now: f64, finalized: bool) {
        let person = self.people.get(item.alert.alert.person_id);
        let signals = outcome_signals(
            &item,
            person.as_ref(),
            self.alerts.make_contiguous(),
            policy,
            now,
            self.audio_proxy,
        );
        let record = outcome_record(&item, signals, policy.policy_version, now, &self.transcript, finalized);
        let scored = evaluate_and_log(self.eval.as_ref(), record, Some(&self.sinks.outcomes)).await;
        self.metrics.record_outcome();

        info!(
            alert_id = %item.alert.alert.alert_id,
            zone = %item.alert.alert.zone,
            resolved = %signals.resolved_proxy,
            abandoned = %signals.abandoned_proxy,
            spam = %signals.spam_proxy,
            overall = %scored.scores.overall,
            finalized_at_stream_end = %finalized,
            "outcome_scored"
        );
        self.eval_records.push(scored);
    }

    pub(crate) async fn optimize_now(&mut self) {
        let n = self.config.optimize_every_n_events();
        let window = optimization_window(self.eval.as_ref(), &self.eval_records, n).await;
        let policy = self.optimizer.optimize(&window);
        self.metrics.record_optimization();
        debug!(window = %window.len(), version = %policy.policy_version, "optimization_applied");
    }

    /// Force-finalize pending outcomes at stream end or shutdown
    pub(crate) async fn finish(&mut self) {
        let pending = self.outcomes.drain_all();
        let policy = self.effective_policy();
        if !pending.is_empty() {
            let now = self.now;
            info!(pending = %pending.len(), "outcomes_finalizing");
            for item in pending {
                self.score_outcome(item, &policy, now, true).await;
            }
            if self.eval_records.len() >= self.config.optimize_every_n_events() {
                self.optimize_now().await;
            }
        }

        let latest = self.effective_policy();
        self.write_snapshots(&latest);
        self.report_metrics(self.now);
        info!(
            frames = %self.metrics.frames_total(),
            alerts = %self.metrics.alerts_total(),
            eval_records = %self.eval_records.len(),
            "control_loop_stopped"
        );
    }
}
