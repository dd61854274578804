//! Error types for Reply Assist.

use std::time::Duration;

use crate::channels::Channel;

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Query(e))
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

/// Channel transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send on {channel}: {reason}")]
    SendFailed { channel: Channel, reason: String },

    #[error("Failed to fetch from {channel}: {reason}")]
    FetchFailed { channel: Channel, reason: String },

    #[error("Account does not belong to the {channel} channel")]
    AccountMismatch { channel: Channel },

    #[error("Dispatch on {channel} timed out after {timeout:?}")]
    Timeout { channel: Channel, timeout: Duration },
}

/// Model provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Pipeline orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No account matches lookup key {key}")]
    UnknownAccount { key: String },
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
