//! Failure taxonomy shared by the stores, the sink and the pipelines.
//!
//! Field-level coercion problems are not errors: they are reported through
//! [`crate::coerce::CoercionReport`] and never abort a sync.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Input that is not structurally valid, such as a non-JSON request body.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The backing store could not be read.
    #[error("{0}")]
    Retrieval(String),

    /// The backing store rejected a write.
    #[error("{0}")]
    Write(String),

    /// The relational sink answered a batch upsert with a non-success status.
    #[error("Failed to upsert into {table} (batch {batch}): {status} {body}")]
    UpstreamBatch {
        table: String,
        batch: usize,
        status: u16,
        body: String,
    },

    /// The request body could not be understood.
    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn retrieval(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        SyncError::Retrieval(format!("{context}: {err}"))
    }

    pub fn write(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        SyncError::Write(format!("{context}: {err}"))
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
