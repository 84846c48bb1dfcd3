//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `control_loop` - Frame-driven orchestrator tying every stage together
//! - `identity_tracker` - Stable identities from per-frame detections
//! - `zone_mapper` - Named store zones from normalized rectangles
//! - `person_state` - Per-identity dwell, motion and alert bookkeeping
//! - `event_trigger` - Assistance candidate detection
//! - `decision_agent` / `root_cause_agent` - Backend-assisted judgements with local fallbacks
//! - `rci_aggregator` - Per-zone alert clustering
//! - `outcomes` - Delayed outcome proxies for accepted alerts
//! - `scoring` - Local evaluation scores and dashboard metrics
//! - `optimizer` / `policy_store` - Policy adaptation and persistence
//! - `simulation` - Offline replay of recorded observations

pub mod control_loop;
pub mod decision_agent;
pub mod event_trigger;
pub mod identity_tracker;
pub mod optimizer;
pub mod outcomes;
pub mod person_state;
pub mod policy_store;
pub mod rci_aggregator;
pub mod root_cause_agent;
pub mod scoring;
pub mod simulation;
pub mod zone_mapper;

// Re-export commonly used types
pub use control_loop::{ControlLoop, LoopComponents};
pub use decision_agent::DecisionAgent;
pub use identity_tracker::IdentityTracker;
pub use person_state::PersonStateStore;
pub use policy_store::PolicyStore;
pub use simulation::Simulation;
