//! Sliding-window per-zone clustering of accepted alerts
//!
//! Each zone that collects enough alerts inside the window yields one cluster,
//! then stays silent for `cooldown_sec` however many alerts keep arriving.

use crate::domain::events::{AlertRecord, Cluster};
use crate::domain::types::round_to;
use rustc_hash::FxHashMap;
use tracing::debug;

pub struct RciAggregator {
    window_sec: f64,
    min_alerts: usize,
    cooldown_sec: f64,
    alerts: Vec<AlertRecord>,
    cooldown_until: FxHashMap<String, f64>,
}

impl RciAggregator {
    pub fn new(window_sec: f64, min_alerts: usize, cooldown_sec: f64) -> Self {
        Self {
            window_sec,
            min_alerts: min_alerts.max(1),
            cooldown_sec,
            alerts: Vec::new(),
            cooldown_until: FxHashMap::default(),
        }
    }

    pub fn add_alert(&mut self, alert: AlertRecord) {
        self.alerts.push(alert);
    }

    /// Apply the live policy's cluster size
    pub fn set_min_alerts(&mut self, min_alerts: usize) {
        self.min_alerts = min_alerts.max(1);
    }

    /// Alerts currently held inside the window
    #[cfg(test)]
    pub(crate) fn pending_alerts(&self) -> usize {
        self.alerts.len()
    }

    pub fn cluster_candidates(&mut self, now: f64) -> Vec<Cluster> {
        let cutoff = now - self.window_sec;
        let before = self.alerts.len();
        self.alerts.retain(|a| a.ts >= cutoff);
        if self.alerts.len() < before {
            debug!(evicted = %(before - self.alerts.len()), "rci_alerts_evicted");
        }

        // Group in first-seen zone order
        let mut order: Vec<&str> = Vec::new();
        let mut grouped: FxHashMap<&str, Vec<&AlertRecord>> = FxHashMap::default();
        for alert in &self.alerts {
            let zone = alert.zone.as_str();
            grouped
                .entry(zone)
                .or_insert_with(|| {
                    order.push(zone);
                    Vec::new()
                })
                .push(alert);
        }

        let mut clusters = Vec::new();
        for zone in order {
            let alerts = &grouped[zone];
            if alerts.len() < self.min_alerts {
                continue;
            }
            if now < self.cooldown_until.get(zone).copied().unwrap_or(f64::NEG_INFINITY) {
                continue;
            }

            let count = alerts.len() as f64;
            let avg_conf = alerts.iter().map(|a| a.confidence).sum::<f64>() / count;
            let avg_dwell = alerts.iter().map(|a| a.dwell_time).sum::<f64>() / count;
            let queue_stats = count / (self.window_sec / 60.0).max(1.0);

            clusters.push(Cluster {
                zone: zone.to_string(),
                alerts_count: alerts.len(),
                avg_confidence: round_to(avg_conf, 3),
                avg_dwell: round_to(avg_dwell, 2),
                abandon_rate_proxy: 0.0,
                queue_stats: round_to(queue_stats, 3),
            });
        }

        for cluster in &clusters {
            self.cooldown_until.insert(cluster.zone.clone(), now + self.cooldown_sec);
        }
        clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TrackId;

    fn alert(zone: &str, ts: f64, confidence: f64, dwell: f64) -> AlertRecord {
        AlertRecord {
            alert_id: format!("a-{}-{}", zone, ts),
            event_id: format!("e-{}-{}", zone, ts),
            ts,
            zone: zone.to_string(),
            confidence,
            dwell_time: dwell,
            person_id: TrackId(1),
        }
    }

    #[test]
    fn test_cluster_aggregates() {
        let mut agg = RciAggregator::new(300.0, 3, 300.0);
        agg.add_alert(alert("Checkout", 100.0, 0.8, 20.0));
        agg.add_alert(alert("Checkout", 110.0, 0.9, 25.0));
        agg.add_alert(alert("Checkout", 120.0, 0.85, 30.5));

        let clusters = agg.cluster_candidates(130.0);
        assert_eq!(clusters.len(), 1);
        let c = &clusters[0];
        assert_eq!(c.zone, "Checkout");
        assert_eq!(c.alerts_count, 3);
        assert_eq!(c.avg_confidence, 0.85);
        assert_eq!(c.avg_dwell, 25.17);
        assert_eq!(c.abandon_rate_proxy, 0.0);
        // 3 alerts over a 5 minute window
        assert_eq!(c.queue_stats, 0.6);
    }

    #[test]
    fn test_below_min_alerts_no_cluster() {
        let mut agg = RciAggregator::new(300.0, 3, 300.0);
        agg.add_alert(alert("Aisle_1", 0.0, 0.9, 20.0));
        agg.add_alert(alert("Aisle_1", 1.0, 0.9, 20.0));
        assert!(agg.cluster_candidates(2.0).is_empty());

        agg.set_min_alerts(2);
        assert_eq!(agg.cluster_candidates(2.0).len(), 1);
    }

    #[test]
    fn test_sliding_window_eviction() {
        let mut agg = RciAggregator::new(60.0, 3, 10.0);
        agg.add_alert(alert("Aisle_1", 0.0, 0.9, 20.0));
        agg.add_alert(alert("Aisle_1", 30.0, 0.9, 20.0));
        agg.add_alert(alert("Aisle_1", 50.0, 0.9, 20.0));

        // at t=61 the first alert is outside the window
        assert!(agg.cluster_candidates(61.0).is_empty());
        assert_eq!(agg.pending_alerts(), 2);

        // an alert exactly at the cutoff is kept
        let mut agg = RciAggregator::new(60.0, 1, 10.0);
        agg.add_alert(alert("Aisle_1", 40.0, 0.9, 20.0));
        assert_eq!(agg.cluster_candidates(100.0).len(), 1);
    }

    #[test]
    fn test_cooldown_suppresses_growing_zone() {
        let mut agg = RciAggregator::new(300.0, 3, 300.0);
        for i in 0..3 {
            agg.add_alert(alert("Checkout", i as f64, 0.9, 20.0));
        }
        assert_eq!(agg.cluster_candidates(10.0).len(), 1);

        for i in 0..10 {
            agg.add_alert(alert("Checkout", 20.0 + i as f64, 0.9, 20.0));
            assert!(agg.cluster_candidates(30.0 + i as f64).is_empty());
        }

        // cooldown until 310 exactly
        assert!(agg.cluster_candidates(309.9).is_empty());
        let clusters = agg.cluster_candidates(310.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].alerts_count, 10);
    }

    #[test]
    fn test_zones_in_first_seen_order_with_independent_cooldowns() {
        let mut agg = RciAggregator::new(300.0, 2, 300.0);
        agg.add_alert(alert("Aisle_2", 0.0, 0.9, 20.0));
        agg.add_alert(alert("Checkout", 1.0, 0.9, 20.0));
        agg.add_alert(alert("Aisle_2", 2.0, 0.9, 20.0));
        agg.add_alert(alert("Checkout", 3.0, 0.9, 20.0));

        let zones: Vec<String> = agg.cluster_candidates(5.0).into_iter().map(|c| c.zone).collect();
        assert_eq!(zones, vec!["Aisle_2", "Checkout"]);

        agg.add_alert(alert("Aisle_1", 6.0, 0.9, 20.0));
        agg.add_alert(alert("Aisle_1", 7.0, 0.9, 20.0));
        let zones: Vec<String> = agg.cluster_candidates(8.0).into_iter().map(|c| c.zone).collect();
        assert_eq!(zones, vec!["Aisle_1"]);
    }

    #[test]
    fn test_short_window_queue_stats_floor() {
        let mut agg = RciAggregator::new(30.0, 1, 0.0);
        agg.add_alert(alert("A", 0.0, 0.9, 20.0));
        agg.add_alert(alert("A", 1.0, 0.9, 20.0));
        assert_eq!(agg.cluster_candidates(2.0)[0].queue_stats, 2.0);
    }
}
