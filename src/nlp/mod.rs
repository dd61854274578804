//! Message understanding and reply generation.
//!
//! Two-layer design throughout: a model-backed primary path and a
//! deterministic fallback that is always available. Falling back is an
//! explicit value (`FallbackReason`), not an exception path, so every
//! branch is visible and testable.

pub mod classifier;
pub mod generator;
pub mod selector;

pub use classifier::{IntentClassifier, RankedIntent, keyword_rank};
pub use generator::{GeneratedReply, ResponseGenerator};
pub use selector::select_template;

/// Why the model-backed primary path was not used.
#[derive(Debug, thiserror::Error)]
pub enum FallbackReason {
    #[error("no model provider configured")]
    Unconfigured,

    #[error("model call timed out")]
    Timeout,

    #[error("model call failed: {0}")]
    Request(String),

    #[error("unusable model reply: {0}")]
    Unparseable(String),

    #[error("model named unknown intent: {0}")]
    UnknownIntent(String),
}
