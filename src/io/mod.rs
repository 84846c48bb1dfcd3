//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `backend` - Boundary traits and the typed backend error
//! - `llm_client` - REST client for the JSON-generating model
//! - `eval_client` - Evaluation log client with a local JSONL fallback
//! - `voice` - Text-to-speech staff notifications
//! - `frame_source` - JSONL frame replay
//! - `egress` - Append-only JSONL files
//! - `runtime_state` - Dashboard snapshots (`state.json`, `metrics.json`)

pub mod backend;
pub mod egress;
pub mod eval_client;
pub mod frame_source;
pub mod llm_client;
pub mod runtime_state;
pub mod voice;

// Re-export commonly used types
pub use backend::{BackendError, EvalBackend, JsonGenerator, LogNotifier, Notifier};
pub use eval_client::EvalClient;
pub use frame_source::{FrameSource, JsonlFrameSource};
pub use llm_client::LlmClient;
pub use voice::VoiceNotifier;
