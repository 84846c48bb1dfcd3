//! Domain models - core types shared by every stage of the loop
//!
//! This module contains the canonical data types used throughout the system:
//! - `types` - identities, boxes, detections and frames
//! - `events` - assistance candidates, alerts, clusters and backend outputs
//! - `policy` - the versioned threshold set
//! - `eval` - the unified evaluation record schema

pub mod eval;
pub mod events;
pub mod policy;
pub mod types;

// Re-export commonly used types at module level
pub use eval::{EvalRecord, OutcomeSignals, RecordType, Scores};
pub use events::{AlertRecord, AssistanceCandidateEvent, Cluster, DecisionOutput, RciOutput};
pub use policy::Policy;
pub use types::{BBox, Detection, Frame, Track, TrackId, TrackedDetection, UNKNOWN_ZONE};
