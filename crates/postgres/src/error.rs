//! Maps Diesel/connection errors onto [`eventstore_core::StoreError`].
//!
//! `PersistenceError` is the crate-local intermediate: it keeps the SQLSTATE
//! constraint name around so `pg::PgPersistence::commit` can tell a
//! `commit_sequence` collision (concurrency conflict) apart from a
//! `commit_id` collision (duplicate commit) before collapsing everything
//! else into the shared taxonomy.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use eventstore_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation on {constraint:?}: {message}")]
    UniqueViolation { constraint: Option<String>, message: String },

    #[error("check violation: {0}")]
    CheckViolation(String),

    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("serialization conflict (retryable)")]
    SerializationConflict,

    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),

    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => {
                    Self::UniqueViolation { constraint: info.constraint_name().map(str::to_string),
                                           message: info.message().to_string() }
                }
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                other => Self::Unknown(format!("db error kind {other:?}: {}", info.message())),
            },
            DieselError::NotFound => Self::Unknown("not found".into()),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::DeserializationError(e) => Self::Unknown(format!("deserialize: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("serialize: {e}")),
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

/// Generic fallback mapping, used once callers have already special-cased
/// the unique-violation variants they care about.
impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::SerializationConflict => StoreError::StorageUnavailable(err.to_string()),
            PersistenceError::TransientIo(msg) => StoreError::StorageUnavailable(msg),
            other => StoreError::Unknown(other.to_string()),
        }
    }
}

/// Whether a retry with backoff is worth attempting.
pub fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict | PersistenceError::TransientIo(_) => true,
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected") || m.contains("could not serialize access due to concurrent update")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed") || m.contains("connection refused") || m.contains("timeout")
        }
        _ => false,
    }
}
