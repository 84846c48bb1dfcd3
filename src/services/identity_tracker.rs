//! Identity assignment across frames
//!
//! Two strategies behind one `update(frame)` contract:
//! - `CentroidTracker` - greedy nearest-centroid association in input order
//! - external tracker - identities supplied upstream, with per-frame fallback
//!   to the centroid tracker and permanent downgrade on failure

use crate::domain::types::{BBox, Detection, Frame, Track, TrackId, TrackedDetection};
use crate::infra::metrics::Metrics;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default association radius in pixels
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 90.0;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("external tracker failed: {0}")]
    Failed(String),
}

/// Produces raw detections for a frame
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Vec<Detection>;
}

/// Produces detections with (possibly missing) identities for a frame
pub trait ExternalTracker: Send {
    fn track(&mut self, frame: &Frame) -> Result<Vec<TrackedDetection>, TrackerError>;
}

/// Detector reading the detections already carried by a replayed frame
#[derive(Debug, Default)]
pub struct FrameDetector;

impl Detector for FrameDetector {
    fn detect(&mut self, frame: &Frame) -> Vec<Detection> {
        frame.detections.iter().map(TrackedDetection::detection).collect()
    }
}

/// External tracker whose identities were assigned upstream of the replay
#[derive(Debug, Default)]
pub struct FrameTracker;

impl ExternalTracker for FrameTracker {
    fn track(&mut self, frame: &Frame) -> Result<Vec<TrackedDetection>, TrackerError> {
        Ok(frame.detections.clone())
    }
}

/// Greedy nearest-centroid tracker
///
/// Tracks are never expired: a subject reappearing near its last box gets
/// its old identity back no matter how long it was gone.
pub struct CentroidTracker {
    next_id: i64,
    /// Keyed by identity; ids grow monotonically so key order is creation order
    tracks: BTreeMap<TrackId, BBox>,
    distance_threshold: f64,
}

impl CentroidTracker {
    pub fn new(distance_threshold: f64) -> Self {
        Self { next_id: 1, tracks: BTreeMap::new(), distance_threshold }
    }

    fn allocate_id(&mut self) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn update(&mut self, detections: &[Detection]) -> Vec<Track> {
        let mut assigned: Vec<TrackId> = Vec::with_capacity(detections.len());
        let mut output = Vec::with_capacity(detections.len());

        for det in detections {
            let (cx, cy) = det.bbox.center();
            let mut best: Option<TrackId> = None;
            let mut best_dist = f64::INFINITY;

            for (&tid, tb) in &self.tracks {
                if assigned.contains(&tid) {
                    continue;
                }
                let (tx, ty) = tb.center();
                let dist = (cx - tx).hypot(cy - ty);
                if dist < best_dist && dist <= self.distance_threshold {
                    best_dist = dist;
                    best = Some(tid);
                }
            }

            let id = match best {
                Some(id) => id,
                None => self.allocate_id(),
            };
            self.tracks.insert(id, det.bbox);
            assigned.push(id);
            output.push(Track { identity: id, bbox: det.bbox, confidence: det.confidence });
        }
        output
    }

    #[cfg(test)]
    pub(crate) fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DISTANCE_THRESHOLD)
    }
}

/// Strategy selector exposing the single `update(frame)` contract
pub struct IdentityTracker {
    detector: Box<dyn Detector>,
    fallback_detector: Option<Box<dyn Detector>>,
    external: Option<Box<dyn ExternalTracker>>,
    centroid: CentroidTracker,
    metrics: Option<Arc<Metrics>>,
}

impl IdentityTracker {
    /// Centroid-only tracker
    pub fn centroid(detector: Box<dyn Detector>, distance_threshold: f64) -> Self {
        Self {
            detector,
            fallback_detector: None,
            external: None,
            centroid: CentroidTracker::new(distance_threshold),
            metrics: None,
        }
    }

    /// Tracker delegating to `external` until it fails
    pub fn with_external(
        detector: Box<dyn Detector>,
        external: Box<dyn ExternalTracker>,
        distance_threshold: f64,
    ) -> Self {
        Self { external: Some(external), ..Self::centroid(detector, distance_threshold) }
    }

    /// Secondary detector consulted when the primary finds nothing
    pub fn with_fallback_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.fallback_detector = Some(detector);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn external_enabled(&self) -> bool {
        self.external.is_some()
    }

    pub fn update(&mut self, frame: &Frame) -> Vec<Track> {
        if let Some(external) = self.external.as_mut() {
            match external.track(frame) {
                Ok(tracked) => {
                    if tracked.iter().all(|d| d.identity.is_some()) {
                        return tracked
                            .into_iter()
                            .filter_map(|d| {
                                d.identity.map(|identity| Track {
                                    identity,
                                    bbox: d.bbox,
                                    confidence: d.confidence,
                                })
                            })
                            .collect();
                    }
                    // Identities missing for this frame only; keep the external strategy
                    debug!(detections = %tracked.len(), "external_tracker_missing_ids");
                    if let Some(ref m) = self.metrics {
                        m.record_tracker_fallback_frame();
                    }
                    let detections: Vec<Detection> =
                        tracked.iter().map(TrackedDetection::detection).collect();
                    return self.centroid.update(&detections);
                }
                Err(e) => {
                    warn!(error = %e, "external_tracker_failed_centroid_enabled");
                    self.external = None;
                }
            }
        }

        let mut detections = self.detector.detect(frame);
        if detections.is_empty() {
            if let Some(fallback) = self.fallback_detector.as_mut() {
                detections = fallback.detect(frame);
            }
        }
        self.centroid.update(&detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
        Detection { bbox: BBox::new(x1, y1, x2, y2), confidence: 0.9 }
    }

    fn ids(tracks: &[Track]) -> Vec<i64> {
        tracks.iter().map(|t| t.identity.0).collect()
    }

    #[test]
    fn test_new_tracks_get_monotonic_ids() {
        let mut tracker = CentroidTracker::default();
        let out = tracker.update(&[det(0, 0, 10, 10), det(500, 500, 510, 510)]);
        assert_eq!(ids(&out), vec![1, 2]);
    }

    #[test]
    fn test_identity_persists_within_radius() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[det(0, 0, 10, 10)]);
        let out = tracker.update(&[det(50, 0, 60, 10)]);
        assert_eq!(ids(&out), vec![1]);

        // 90 px is still inside the radius, 91 is not
        let out = tracker.update(&[det(140, 0, 150, 10)]);
        assert_eq!(ids(&out), vec![1]);
        let out = tracker.update(&[det(231, 0, 241, 10)]);
        assert_eq!(ids(&out), vec![2]);
    }

    #[test]
    fn test_greedy_input_order_assignment() {
        let mut tracker = CentroidTracker::default();
        // track 1 at x=5, track 2 at x=105
        tracker.update(&[det(0, 0, 10, 10), det(100, 0, 110, 10)]);

        // First detection (x=85) is closer to track 2 (20) than track 1 (80) and
        // takes it; the second detection (x=45) falls back to track 1.
        let out = tracker.update(&[det(80, 0, 90, 10), det(40, 0, 50, 10)]);
        assert_eq!(ids(&out), vec![2, 1]);
    }

    #[test]
    fn test_greedy_is_not_globally_optimal() {
        let mut tracker = CentroidTracker::default();
        // track 1 at x=5, track 2 at x=95
        tracker.update(&[det(0, 0, 10, 10), det(90, 0, 100, 10)]);

        // Detection A at x=55 is nearest track 2 (40 vs 50) and claims it first.
        // Detection B at x=140 is then 135 px from track 1 and gets a new id,
        // although the optimal matching would have been A->1, B->2.
        let out = tracker.update(&[det(50, 0, 60, 10), det(135, 0, 145, 10)]);
        assert_eq!(ids(&out), vec![2, 3]);
    }

    #[test]
    fn test_tie_prefers_older_track() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[det(0, 0, 10, 10), det(100, 0, 110, 10)]);
        // centroid x=55 is exactly 50 from both
        let out = tracker.update(&[det(50, 0, 60, 10)]);
        assert_eq!(ids(&out), vec![1]);
    }

    #[test]
    fn test_each_track_assigned_once_per_frame() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[det(0, 0, 10, 10)]);
        let out = tracker.update(&[det(0, 0, 10, 10), det(2, 0, 12, 10)]);
        assert_eq!(ids(&out), vec![1, 2]);
        assert_eq!(tracker.track_count(), 2);
    }

    struct ScriptedTracker {
        frames: Vec<Result<Vec<TrackedDetection>, TrackerError>>,
    }

    impl ExternalTracker for ScriptedTracker {
        fn track(&mut self, _frame: &Frame) -> Result<Vec<TrackedDetection>, TrackerError> {
            if self.frames.is_empty() {
                return Ok(Vec::new());
            }
            self.frames.remove(0)
        }
    }

    fn tracked(x: i32, id: Option<i64>) -> TrackedDetection {
        TrackedDetection { bbox: BBox::new(x, 0, x + 10, 10), confidence: 0.8, identity: id.map(TrackId) }
    }

    fn frame_with(dets: Vec<TrackedDetection>) -> Frame {
        Frame { ts: None, width: 640, height: 480, detections: dets }
    }

    #[test]
    fn test_external_ids_pass_through() {
        let external = ScriptedTracker { frames: vec![Ok(vec![tracked(0, Some(42))])] };
        let mut tracker =
            IdentityTracker::with_external(Box::new(FrameDetector), Box::new(external), 90.0);
        let out = tracker.update(&frame_with(vec![]));
        assert_eq!(ids(&out), vec![42]);
        assert!(tracker.external_enabled());
    }

    #[test]
    fn test_missing_ids_fall_back_for_one_frame() {
        let external = ScriptedTracker {
            frames: vec![Ok(vec![tracked(0, None), tracked(300, Some(9))]), Ok(vec![tracked(0, Some(7))])],
        };
        let mut tracker =
            IdentityTracker::with_external(Box::new(FrameDetector), Box::new(external), 90.0);

        let out = tracker.update(&frame_with(vec![]));
        assert_eq!(ids(&out), vec![1, 2]);
        assert!(tracker.external_enabled());

        let out = tracker.update(&frame_with(vec![]));
        assert_eq!(ids(&out), vec![7]);
    }

    #[test]
    fn test_external_failure_disables_for_run() {
        let external = ScriptedTracker {
            frames: vec![Err(TrackerError::Failed("boom".to_string())), Ok(vec![tracked(0, Some(7))])],
        };
        let mut tracker =
            IdentityTracker::with_external(Box::new(FrameDetector), Box::new(external), 90.0);

        let frame = frame_with(vec![tracked(0, Some(99))]);
        let out = tracker.update(&frame);
        assert_eq!(ids(&out), vec![1]);
        assert!(!tracker.external_enabled());

        let out = tracker.update(&frame);
        assert_eq!(ids(&out), vec![1]);
    }

    struct FixedDetector(Vec<Detection>);

    impl Detector for FixedDetector {
        fn detect(&mut self, _frame: &Frame) -> Vec<Detection> {
            self.0.clone()
        }
    }

    #[test]
    fn test_fallback_detector_used_when_primary_empty() {
        let mut tracker = IdentityTracker::centroid(Box::new(FrameDetector), 90.0)
            .with_fallback_detector(Box::new(FixedDetector(vec![det(0, 0, 10, 10)])));
        let out = tracker.update(&frame_with(vec![]));
        assert_eq!(ids(&out), vec![1]);
    }
}
