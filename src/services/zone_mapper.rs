//! Static geometric lookup from normalized coordinates to zone labels

use crate::domain::types::{BBox, UNKNOWN_ZONE};
use crate::infra::config::ZoneConfig;

/// Axis-aligned rectangle in normalized coordinates, edges inclusive
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneRect {
    pub name: String,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl ZoneRect {
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.x1 <= x && x <= self.x2 && self.y1 <= y && y <= self.y2
    }
}

/// Maps points and boxes to zones; the first configured rectangle wins
#[derive(Debug, Clone)]
pub struct ZoneMapper {
    zones: Vec<ZoneRect>,
}

impl ZoneMapper {
    pub fn new(zone_defs: &[ZoneConfig]) -> Self {
        let zones = zone_defs
            .iter()
            .map(|z| ZoneRect {
                name: z.name.clone(),
                x1: z.rect[0],
                y1: z.rect[1],
                x2: z.rect[2],
                y2: z.rect[3],
            })
            .collect();
        Self { zones }
    }

    pub fn point_to_zone(&self, x: f64, y: f64) -> &str {
        self.zones
            .iter()
            .find(|zone| zone.contains(x, y))
            .map(|zone| zone.name.as_str())
            .unwrap_or(UNKNOWN_ZONE)
    }

    pub fn bbox_to_zone(&self, bbox: &BBox, width: u32, height: u32) -> &str {
        let (cx, cy) = bbox.normalized_center(width, height);
        self.point_to_zone(cx, cy)
    }

    /// Zones projected into pixel space, for overlays
    pub fn to_pixel_rects(&self, width: u32, height: u32) -> Vec<(&str, BBox)> {
        let (w, h) = (width as f64, height as f64);
        self.zones
            .iter()
            .map(|z| {
                (
                    z.name.as_str(),
                    BBox::new(
                        (z.x1 * w) as i32,
                        (z.y1 * h) as i32,
                        (z.x2 * w) as i32,
                        (z.y2 * h) as i32,
                    ),
                )
            })
            .collect()
    }
}
