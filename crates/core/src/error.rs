//! Failure taxonomy for the commit pipeline.
//!
//! These variants mirror the persistence contract (`§6`/`§7` of the design
//! notes carried in `DESIGN.md`): a backend maps its own error space onto
//! this enum so the stream/facade layer never has to know about SQL error
//! codes, document-store status codes, etc.

use thiserror::Error;

/// Errors that can surface from the commit/read pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another commit already occupies this stream's next revision/sequence.
    /// The stream refreshes its committed history; the caller decides
    /// whether to retry with a fresh decision.
    #[error("concurrency conflict on stream {bucket_id}/{stream_id}")]
    ConcurrencyConflict { bucket_id: String, stream_id: String },

    /// A commit with this `(stream_id, commit_id)` is already durable.
    /// Treated as an idempotent success by the stream, never surfaced to
    /// callers of `CommitChanges`.
    #[error("duplicate commit {commit_id} on stream {bucket_id}/{stream_id}")]
    DuplicateCommit { bucket_id: String, stream_id: String, commit_id: uuid::Uuid },

    /// Transient backend fault (connection pool exhaustion, timeout, ...).
    /// Safe to retry.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The attempt violates a structural invariant and was rejected before
    /// reaching persistence.
    #[error("invalid commit attempt: {0}")]
    InvalidAttempt(String),

    /// A catch-all for backend errors that don't fit the taxonomy above.
    #[error("unknown storage error: {0}")]
    Unknown(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::StorageUnavailable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
