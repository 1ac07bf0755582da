//! The persistence contract (§4.1 / §6 of the design notes).
//!
//! This is the abstract append-only log the rest of the crate depends on.
//! A concrete backend (in-memory, SQL, document store) implements
//! [`Persistence`] and is otherwise invisible to [`crate::stream::OptimisticEventStream`]
//! and [`crate::store::EventStoreFacade`].
//!
//! Implementations must be safe for concurrent use: the facade and the
//! hook-aware decorator are shared across threads, even though any single
//! `OptimisticEventStream` is owned by one writer at a time.

use crate::commit::{CheckpointToken, Commit, CommitAttempt, Snapshot, StreamHead};
use crate::error::StoreResult;

/// Abstract append-only log over buckets of streams.
///
/// All read methods are side-effect free and safe to re-run; `commit` is the
/// only method that mutates durable state, and it must be atomic — either
/// every event in the attempt becomes durable, or none do.
pub trait Persistence: Send + Sync {
    /// Commits whose revision ranges intersect `[min_revision, max_revision]`,
    /// ordered by `commit_sequence` ascending. Callers that want an
    /// unbounded upper end pass `u64::MAX` — the public `maxRevision <= 0`
    /// sentinel from the facade API is translated to `u64::MAX` before it
    /// ever reaches a `Persistence` implementation (see `DESIGN.md`).
    fn get_from_revision(&self,
                         bucket_id: &str,
                         stream_id: &str,
                         min_revision: u64,
                         max_revision: u64)
                         -> StoreResult<Vec<Commit>>;

    /// All commits across all streams in `bucket_id` with checkpoint
    /// strictly greater than `checkpoint_token`, in checkpoint order.
    fn get_from_checkpoint(&self, bucket_id: &str, checkpoint_token: CheckpointToken) -> StoreResult<Vec<Commit>>;

    /// Durably appends `attempt`. Fails with
    /// [`crate::error::StoreError::ConcurrencyConflict`] if another commit
    /// already occupies `(bucket_id, stream_id, commit_sequence)` or an
    /// overlapping revision, or
    /// [`crate::error::StoreError::DuplicateCommit`] if `(bucket_id,
    /// stream_id, commit_id)` already exists.
    fn commit(&self, attempt: CommitAttempt) -> StoreResult<Commit>;

    /// Highest-revision snapshot with `stream_revision <= max_revision`.
    fn get_snapshot(&self, bucket_id: &str, stream_id: &str, max_revision: u64) -> StoreResult<Option<Snapshot>>;

    /// Idempotently stores a snapshot. Returns `false` if the target stream
    /// no longer exists or the snapshot is stale (a newer or equal-revision
    /// snapshot already exists).
    fn add_snapshot(&self, snapshot: Snapshot) -> StoreResult<bool>;

    /// Streams whose `head_revision - snapshot_revision >= min_threshold`.
    fn get_streams_to_snapshot(&self, bucket_id: &str, min_threshold: u64) -> StoreResult<Vec<StreamHead>>;

    /// Prepares the backend (schema, indices). Idempotent.
    fn initialize(&self) -> StoreResult<()>;

    /// Deletes all commits and snapshots in `bucket_id`, or the entire store
    /// if `bucket_id` is `None`.
    fn purge(&self, bucket_id: Option<&str>) -> StoreResult<()>;

    /// Deletes every bucket.
    fn drop_all(&self) -> StoreResult<()> {
        self.purge(None)
    }

    /// Deletes a single stream and its snapshots.
    fn delete_stream(&self, bucket_id: &str, stream_id: &str) -> StoreResult<()>;
}
