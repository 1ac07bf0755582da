//! Durable data model: events, commit attempts, durable commits and
//! snapshots.
//!
//! Nothing in this module touches storage. `CommitAttempt` is the transient,
//! client-built value a stream hands to the facade; `Commit` is what comes
//! back once persistence has assigned a `CheckpointToken`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default bucket used when a caller doesn't care to namespace streams.
pub const DEFAULT_BUCKET: &str = "default";

/// A storage-assigned, globally monotonically increasing ordering key that
/// linearizes commits across all streams in a bucket.
pub type CheckpointToken = u64;

/// A single domain event. The body is opaque to the store; callers own
/// serialization (see the `Serializer` trait in `persistence.rs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub headers: BTreeMap<String, serde_json::Value>,
    pub body: serde_json::Value,
}

impl EventMessage {
    pub fn new(body: serde_json::Value) -> Self {
        Self { headers: BTreeMap::new(), body }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.headers.insert(key.into(), value);
        self
    }
}

/// A client-built, not-yet-durable batch of events for one stream.
///
/// Invariants enforced by [`CommitAttempt::new`] (see §3 of the design
/// notes): `events` is non-empty, `stream_revision >= events.len()`, and
/// `commit_sequence >= 1`. The invariant that `commit_id` is unique per
/// stream is a persistence-layer concern, not something this type can check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitAttempt {
    pub bucket_id: String,
    pub stream_id: String,
    pub stream_revision: u64,
    pub commit_id: Uuid,
    pub commit_sequence: u64,
    pub commit_stamp: DateTime<Utc>,
    pub headers: BTreeMap<String, serde_json::Value>,
    pub events: Vec<EventMessage>,
}

impl CommitAttempt {
    /// The stream revision the stream had *before* this attempt, i.e.
    /// `stream_revision - events.len()`.
    pub fn previous_stream_revision(&self) -> u64 {
        self.stream_revision - self.events.len() as u64
    }

    /// Structural validation per §3. Does not check uniqueness of
    /// `commit_id` or ordering against other commits — that's persistence's
    /// job.
    pub fn validate(&self) -> Result<(), String> {
        if self.events.is_empty() {
            return Err("commit attempt must contain at least one event".into());
        }
        if self.stream_revision < self.events.len() as u64 {
            return Err("stream_revision must be >= events.len()".into());
        }
        if self.commit_sequence < 1 {
            return Err("commit_sequence must be >= 1".into());
        }
        Ok(())
    }
}

/// A durable commit: everything in `CommitAttempt` plus the checkpoint
/// assigned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub bucket_id: String,
    pub stream_id: String,
    pub stream_revision: u64,
    pub commit_id: Uuid,
    pub commit_sequence: u64,
    pub commit_stamp: DateTime<Utc>,
    pub headers: BTreeMap<String, serde_json::Value>,
    pub events: Vec<EventMessage>,
    pub checkpoint_token: CheckpointToken,
}

impl Commit {
    /// The effective (1-based) stream revision of the event at `index`
    /// (0-based) within this commit. See §4.6 "Merging a commit".
    pub fn effective_revision(&self, index: usize) -> u64 {
        self.stream_revision - self.events.len() as u64 + 1 + index as u64
    }

    pub fn from_attempt(attempt: CommitAttempt, checkpoint_token: CheckpointToken) -> Self {
        Self {
            bucket_id: attempt.bucket_id,
            stream_id: attempt.stream_id,
            stream_revision: attempt.stream_revision,
            commit_id: attempt.commit_id,
            commit_sequence: attempt.commit_sequence,
            commit_stamp: attempt.commit_stamp,
            headers: attempt.headers,
            events: attempt.events,
            checkpoint_token,
        }
    }
}

/// A cached fold of a stream up to `stream_revision`, used to shortcut
/// replay. Multiple snapshots per stream may coexist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub bucket_id: String,
    pub stream_id: String,
    pub stream_revision: u64,
    pub payload: serde_json::Value,
}

/// Head position of a stream, used by `GetStreamsToSnapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamHead {
    pub bucket_id: String,
    pub stream_id: String,
    pub head_revision: u64,
    pub snapshot_revision: u64,
}

impl StreamHead {
    pub fn unsnapshotted_revisions(&self) -> u64 {
        self.head_revision.saturating_sub(self.snapshot_revision)
    }
}
