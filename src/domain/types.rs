//! Shared perception types for the ShelfSense core

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Zone label used when a point falls outside every configured rectangle
pub const UNKNOWN_ZONE: &str = "Unknown";

/// Newtype wrapper for tracked identities to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TrackId(pub i64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pixel-space bounding box `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Midpoint in pixel coordinates
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        ((self.x1 as f64 + self.x2 as f64) / 2.0, (self.y1 as f64 + self.y2 as f64) / 2.0)
    }

    /// Midpoint divided by frame size; zero dimensions are treated as 1
    #[inline]
    pub fn normalized_center(&self, width: u32, height: u32) -> (f64, f64) {
        let (cx, cy) = self.center();
        (cx / width.max(1) as f64, cy / height.max(1) as f64)
    }
}

impl From<[i32; 4]> for BBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [i32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Raw detector output for a single subject
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f64,
}

/// External tracker output; `identity` is absent while the tracker warms up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedDetection {
    pub bbox: BBox,
    pub confidence: f64,
    #[serde(default, rename = "track_id")]
    pub identity: Option<TrackId>,
}

impl TrackedDetection {
    #[inline]
    pub fn detection(&self) -> Detection {
        Detection { bbox: self.bbox, confidence: self.confidence }
    }
}

/// Tracker output: a detection bound to a stable identity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Track {
    pub identity: TrackId,
    pub bbox: BBox,
    pub confidence: f64,
}

/// One decoded frame as seen by the core
///
/// Frames come from a replay source; `detections` carries whatever the
/// upstream detector/tracker produced for this frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frame {
    /// Stream time in seconds, if the source provides one
    #[serde(default)]
    pub ts: Option<f64>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub detections: Vec<TrackedDetection>,
}

/// Get current epoch seconds with millisecond resolution
#[inline]
pub fn epoch_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as f64 / 1000.0
}

/// Round half away from zero to `places` decimals
#[inline]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
