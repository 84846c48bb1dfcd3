//! Per-identity dwell and motion state
//!
//! The store is the only structure shared between the control loop and any
//! concurrent reader. A single mutex covers every public method and is held
//! only for the map mutation itself.

use crate::domain::events::RECENT_ZONE_HISTORY;
use crate::domain::types::{TrackId, UNKNOWN_ZONE};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

/// Weight of the previous motion score in the smoothing formula
const MOTION_DECAY: f64 = 0.7;
/// Weight of the newest displacement
const MOTION_GAIN: f64 = 0.3;

/// One stay in a zone; only the last visit has an open exit
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneVisit {
    pub zone: String,
    pub entry_ts: f64,
    pub exit_ts: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonState {
    pub person_id: TrackId,
    pub current_zone: String,
    pub zone_entry_ts: f64,
    pub dwell_time_sec: f64,
    /// Smoothed raw displacement of the normalized center per update
    pub motion_score: f64,
    pub last_seen_ts: f64,
    pub last_center: (f64, f64),
    pub alert_sent_for_zone: FxHashMap<String, bool>,
    pub zone_history: Vec<ZoneVisit>,
}

impl PersonState {
    fn new(person_id: TrackId, zone: &str, center: (f64, f64), ts: f64) -> Self {
        let mut alert_sent_for_zone = FxHashMap::default();
        alert_sent_for_zone.insert(zone.to_string(), false);
        Self {
            person_id,
            current_zone: zone.to_string(),
            zone_entry_ts: ts,
            dwell_time_sec: 0.0,
            motion_score: 0.0,
            last_seen_ts: ts,
            last_center: center,
            alert_sent_for_zone,
            zone_history: vec![ZoneVisit { zone: zone.to_string(), entry_ts: ts, exit_ts: None }],
        }
    }

    pub fn alert_sent(&self, zone: &str) -> bool {
        self.alert_sent_for_zone.get(zone).copied().unwrap_or(false)
    }

    /// Zones of the last few visits, oldest first
    pub fn recent_zones(&self) -> SmallVec<[String; RECENT_ZONE_HISTORY]> {
        let start = self.zone_history.len().saturating_sub(RECENT_ZONE_HISTORY);
        self.zone_history[start..].iter().map(|v| v.zone.clone()).collect()
    }

    fn observe(&mut self, zone: &str, center: (f64, f64), ts: f64) {
        let disp = (center.0 - self.last_center.0).hypot(center.1 - self.last_center.1);
        self.motion_score = MOTION_DECAY * self.motion_score + MOTION_GAIN * disp;
        self.last_center = center;
        self.last_seen_ts = ts;

        // A boundary flicker to Unknown keeps the current zone and its dwell
        let zone = if zone == UNKNOWN_ZONE && self.current_zone != UNKNOWN_ZONE {
            self.current_zone.as_str()
        } else {
            zone
        };

        if zone != self.current_zone {
            if let Some(last) = self.zone_history.last_mut() {
                last.exit_ts = Some(ts);
            }
            let zone = zone.to_string();
            self.alert_sent_for_zone.entry(zone.clone()).or_insert(false);
            self.zone_history.push(ZoneVisit { zone: zone.clone(), entry_ts: ts, exit_ts: None });
            self.current_zone = zone;
            self.zone_entry_ts = ts;
        }

        self.dwell_time_sec = ts - self.zone_entry_ts;
    }
}

/// Thread-safe store of per-identity state
#[derive(Default)]
pub struct PersonStateStore {
    people: Mutex<FxHashMap<TrackId, PersonState>>,
}

impl PersonStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation and return the resulting state
    pub fn update_person(&self, person_id: TrackId, zone: &str, center: (f64, f64), ts: f64) -> PersonState {
        let mut people = self.people.lock();
        match people.get_mut(&person_id) {
            Some(state) => {
                state.observe(zone, center, ts);
                state.clone()
            }
            None => {
                let state = PersonState::new(person_id, zone, center, ts);
                people.insert(person_id, state.clone());
                state
            }
        }
    }

    /// Remove identities unseen for more than `timeout_sec`
    pub fn prune_stale(&self, timeout_sec: f64, now: f64) -> Vec<TrackId> {
        let mut stale = Vec::new();
        self.people.lock().retain(|id, state| {
            let keep = now - state.last_seen_ts <= timeout_sec;
            if !keep {
                stale.push(*id);
            }
            keep
        });
        stale.sort_unstable();
        if !stale.is_empty() {
            debug!(count = %stale.len(), "people_pruned");
        }
        stale
    }

    pub fn mark_alert_sent(&self, person_id: TrackId, zone: &str) {
        if let Some(state) = self.people.lock().get_mut(&person_id) {
            state.alert_sent_for_zone.insert(zone.to_string(), true);
        }
    }

    /// Snapshot of all active identities, ordered by identity
    pub fn active_people(&self) -> Vec<PersonState> {
        let mut out: Vec<PersonState> = self.people.lock().values().cloned().collect();
        out.sort_unstable_by_key(|p| p.person_id);
        out
    }

    pub fn get(&self, person_id: TrackId) -> Option<PersonState> {
        self.people.lock().get(&person_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.people.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: TrackId = TrackId(1);

    #[test]
    fn test_first_observation_creates_state() {
        let store = PersonStateStore::new();
        let state = store.update_person(ID, "Checkout", (0.9, 0.5), 100.0);
        assert_eq!(state.current_zone, "Checkout");
        assert_eq!(state.dwell_time_sec, 0.0);
        assert_eq!(state.motion_score, 0.0);
        assert!(!state.alert_sent("Checkout"));
        assert_eq!(state.zone_history.len(), 1);
        assert_eq!(state.zone_history[0].exit_ts, None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_dwell_monotonic_then_resets_on_zone_change() {
        let store = PersonStateStore::new();
        let mut prev = -1.0;
        for i in 0..20 {
            let state = store.update_person(ID, "Aisle_1", (0.2, 0.5), i as f64 * 0.5);
            assert!(state.dwell_time_sec >= prev);
            prev = state.dwell_time_sec;
        }
        assert_eq!(prev, 9.5);

        let state = store.update_person(ID, "Aisle_2", (0.6, 0.5), 10.0);
        assert_eq!(state.dwell_time_sec, 0.0);
        assert_eq!(state.zone_entry_ts, 10.0);
        assert_eq!(state.zone_history.len(), 2);
        assert_eq!(state.zone_history[0].exit_ts, Some(10.0));
        assert_eq!(state.zone_history[1].exit_ts, None);

        let state = store.update_person(ID, "Aisle_2", (0.6, 0.5), 13.0);
        assert_eq!(state.dwell_time_sec, 3.0);
    }

    #[test]
    fn test_motion_smoothing_formula() {
        let store = PersonStateStore::new();
        let centers = [(0.1, 0.1), (0.4, 0.5), (0.4, 0.5), (0.1, 0.1), (0.13, 0.14)];
        let mut expected = 0.0;
        let mut last = centers[0];
        store.update_person(ID, "A", last, 0.0);
        for (i, c) in centers.iter().enumerate().skip(1) {
            let disp = ((c.0 - last.0).powi(2) + (c.1 - last.1).powi(2)).sqrt();
            expected = 0.7 * expected + 0.3 * disp;
            let state = store.update_person(ID, "A", *c, i as f64);
            assert!((state.motion_score - expected).abs() < 1e-12);
            last = *c;
        }
        // 3-4-5 triangle: first step displacement is exactly 0.5
        let store = PersonStateStore::new();
        store.update_person(ID, "A", (0.1, 0.1), 0.0);
        let state = store.update_person(ID, "A", (0.4, 0.5), 1.0);
        assert!((state.motion_score - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_never_overwrites_valid_zone() {
        let store = PersonStateStore::new();
        store.update_person(ID, "Checkout", (0.9, 0.5), 0.0);
        let state = store.update_person(ID, UNKNOWN_ZONE, (0.99, 0.5), 5.0);
        assert_eq!(state.current_zone, "Checkout");
        assert_eq!(state.dwell_time_sec, 5.0);
        assert_eq!(state.zone_history.len(), 1);
    }

    #[test]
    fn test_unknown_start_then_valid_zone() {
        let store = PersonStateStore::new();
        store.update_person(ID, UNKNOWN_ZONE, (0.99, 0.99), 0.0);
        let state = store.update_person(ID, "Checkout", (0.9, 0.5), 2.0);
        assert_eq!(state.current_zone, "Checkout");
        assert_eq!(state.dwell_time_sec, 0.0);
    }

    #[test]
    fn test_alert_flag_carries_over_on_reentry() {
        let store = PersonStateStore::new();
        store.update_person(ID, "Aisle_1", (0.2, 0.5), 0.0);
        store.mark_alert_sent(ID, "Aisle_1");
        let state = store.update_person(ID, "Aisle_2", (0.6, 0.5), 1.0);
        assert!(!state.alert_sent("Aisle_2"));
        let state = store.update_person(ID, "Aisle_1", (0.2, 0.5), 2.0);
        assert!(state.alert_sent("Aisle_1"));
    }

    #[test]
    fn test_mark_alert_sent_unknown_identity_is_noop() {
        let store = PersonStateStore::new();
        store.mark_alert_sent(TrackId(42), "Checkout");
        assert!(store.is_empty());
    }

    #[test]
    fn test_prune_stale() {
        let store = PersonStateStore::new();
        store.update_person(TrackId(1), "A", (0.1, 0.1), 0.0);
        store.update_person(TrackId(2), "A", (0.1, 0.1), 9.5);
        store.update_person(TrackId(3), "A", (0.1, 0.1), 9.0);

        // exactly at the timeout is kept
        let pruned = store.prune_stale(1.0, 10.0);
        assert_eq!(pruned, vec![TrackId(1)]);
        assert_eq!(store.len(), 2);
        assert!(store.get(TrackId(3)).is_some());
    }

    #[test]
    fn test_active_people_is_snapshot() {
        let store = PersonStateStore::new();
        store.update_person(TrackId(2), "A", (0.1, 0.1), 0.0);
        store.update_person(TrackId(1), "B", (0.1, 0.1), 0.0);
        let snapshot = store.active_people();
        store.update_person(TrackId(1), "B", (0.1, 0.1), 5.0);

        assert_eq!(snapshot.iter().map(|p| p.person_id.0).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(snapshot[0].dwell_time_sec, 0.0);
    }

    #[test]
    fn test_recent_zones() {
        let store = PersonStateStore::new();
        for (i, zone) in ["A", "B", "C", "D", "E"].iter().enumerate() {
            store.update_person(ID, zone, (0.1, 0.1), i as f64);
        }
        let state = store.get(ID).unwrap();
        assert_eq!(state.recent_zones().as_slice(), &["B", "C", "D", "E"]);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(PersonStateStore::new());
        let mut handles = vec![];
        for t in 0..8 {
            let s = store.clone();
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    s.update_person(TrackId(t), "A", (0.1, 0.1), i as f64);
                    let _ = s.active_people();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 8);
        assert_eq!(store.get(TrackId(3)).unwrap().dwell_time_sec, 99.0);
    }
}
