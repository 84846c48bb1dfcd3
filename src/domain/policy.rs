//! Versioned decision thresholds

use serde::{Deserialize, Serialize};

/// Live set of thresholds governing triggering and alerting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub alert_conf_threshold: f64,
    pub dwell_threshold_sec: f64,
    pub motion_threshold: f64,
    pub rci_min_alerts: usize,
    pub policy_version: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            alert_conf_threshold: 0.75,
            dwell_threshold_sec: 20.0,
            motion_threshold: 0.25,
            rci_min_alerts: 3,
            policy_version: 1,
        }
    }
}

impl Policy {
    /// Check the documented value ranges
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.alert_conf_threshold)
            && self.dwell_threshold_sec >= 1.0
            && self.motion_threshold >= 0.0
            && self.rci_min_alerts >= 1
    }
}
