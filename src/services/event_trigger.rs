//! Assistance candidate detection
//!
//! Stateless: the caller decides the cadence and marks the alert as sent only
//! after the decision step accepts the event.

use crate::domain::events::{new_uuid_v7, AssistanceCandidateEvent};
use crate::domain::policy::Policy;
use crate::domain::types::UNKNOWN_ZONE;
use crate::services::person_state::PersonState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventTrigger {
    pub dwell_threshold_sec: f64,
    pub motion_threshold: f64,
}

impl EventTrigger {
    pub fn new(dwell_threshold_sec: f64, motion_threshold: f64) -> Self {
        Self { dwell_threshold_sec, motion_threshold }
    }

    pub fn from_policy(policy: &Policy) -> Self {
        Self::new(policy.dwell_threshold_sec, policy.motion_threshold)
    }

    pub fn maybe_trigger(&self, state: &PersonState) -> Option<AssistanceCandidateEvent> {
        if state.current_zone == UNKNOWN_ZONE
            || state.alert_sent(&state.current_zone)
            || state.dwell_time_sec < self.dwell_threshold_sec
            || state.motion_score > self.motion_threshold
        {
            return None;
        }

        Some(AssistanceCandidateEvent {
            event_id: new_uuid_v7(),
            ts: state.last_seen_ts,
            person_id: state.person_id,
            zone: state.current_zone.clone(),
            dwell_time: state.dwell_time_sec,
            motion_score: state.motion_score,
            recent_zone_history: state.recent_zones(),
            queue_len: None,
            pickup_proxy: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TrackId;
    use crate::services::person_state::PersonStateStore;

    fn trigger() -> EventTrigger {
        EventTrigger::from_policy(&Policy::default())
    }

    #[test]
    fn test_fires_once_per_zone_visit() {
        let store = PersonStateStore::new();
        let id = TrackId(7);
        let state = store.update_person(id, "Checkout", (0.9, 0.5), 0.0);
        assert!(trigger().maybe_trigger(&state).is_none());

        let mut state = store.update_person(id, "Checkout", (0.9, 0.5), 25.0);
        state.motion_score = 0.1;
        let event = trigger().maybe_trigger(&state).expect("should fire at t=25");
        assert_eq!(event.zone, "Checkout");
        assert_eq!(event.person_id, id);
        assert_eq!(event.dwell_time, 25.0);
        assert_eq!(event.ts, 25.0);
        assert_eq!(event.recent_zone_history.as_slice(), &["Checkout"]);
        store.mark_alert_sent(id, "Checkout");

        let state = store.update_person(id, "Checkout", (0.9, 0.5), 26.0);
        assert!(trigger().maybe_trigger(&state).is_none());
    }

    #[test]
    fn test_trigger_does_not_mark_alert_sent() {
        let store = PersonStateStore::new();
        store.update_person(TrackId(1), "Aisle_1", (0.2, 0.5), 0.0);
        let state = store.update_person(TrackId(1), "Aisle_1", (0.2, 0.5), 30.0);
        assert!(trigger().maybe_trigger(&state).is_some());
        assert!(trigger().maybe_trigger(&state).is_some());
        assert!(!store.get(TrackId(1)).unwrap().alert_sent("Aisle_1"));
    }

    #[test]
    fn test_threshold_boundaries() {
        let store = PersonStateStore::new();
        store.update_person(TrackId(1), "Aisle_1", (0.2, 0.5), 0.0);
        let mut state = store.update_person(TrackId(1), "Aisle_1", (0.2, 0.5), 20.0);

        state.motion_score = 0.25;
        assert!(trigger().maybe_trigger(&state).is_some(), "dwell and motion equal to thresholds fire");

        state.motion_score = 0.2501;
        assert!(trigger().maybe_trigger(&state).is_none());

        state.motion_score = 0.0;
        state.dwell_time_sec = 19.99;
        assert!(trigger().maybe_trigger(&state).is_none());
    }

    #[test]
    fn test_unknown_zone_never_fires() {
        let store = PersonStateStore::new();
        store.update_person(TrackId(1), UNKNOWN_ZONE, (0.99, 0.99), 0.0);
        let state = store.update_person(TrackId(1), UNKNOWN_ZONE, (0.99, 0.99), 100.0);
        assert!(trigger().maybe_trigger(&state).is_none());
    }

    #[test]
    fn test_new_zone_visit_fires_again() {
        let store = PersonStateStore::new();
        let id = TrackId(3);
        store.update_person(id, "Aisle_1", (0.2, 0.5), 0.0);
        store.update_person(id, "Aisle_1", (0.2, 0.5), 21.0);
        store.mark_alert_sent(id, "Aisle_1");

        store.update_person(id, "Aisle_2", (0.6, 0.5), 22.0);
        let state = store.update_person(id, "Aisle_2", (0.6, 0.5), 50.0);
        // the move between aisles decays below the motion threshold
        assert!(state.motion_score <= 0.25);
        let event = trigger().maybe_trigger(&state).expect("fires in the new zone");
        assert_eq!(event.recent_zone_history.as_slice(), &["Aisle_1", "Aisle_2"]);
    }
}
