//! Event store facade (§4.5).
//!
//! Opens and creates streams, and routes every commit through the hook
//! chain before handing it to persistence. The facade owns the hook chain's
//! lifecycle: `dispose` tears down persistence first, then each hook once,
//! in registration order — mirroring how the source engine's builder hands
//! off ownership of its stores once `build()` is called.

use std::sync::Arc;

use crate::commit::{Commit, CommitAttempt, Snapshot, StreamHead, DEFAULT_BUCKET};
use crate::error::{StoreError, StoreResult};
use crate::hooks::{HookAwarePersistence, PipelineHook, PipelineHooks};
use crate::persistence::Persistence;
use crate::stream::OptimisticEventStream;

/// An unbounded upper revision bound, as seen by a `Persistence`
/// implementation. The public API instead accepts `max_revision: 0` to mean
/// "unbounded" (see `DESIGN.md`); the facade translates between the two at
/// this boundary and never passes a literal `0` down to persistence.
pub const UNBOUNDED_REVISION: u64 = u64::MAX;

fn resolve_max_revision(max_revision: u64) -> u64 {
    if max_revision == 0 {
        UNBOUNDED_REVISION
    } else {
        max_revision
    }
}

/// Builds an [`EventStoreFacade`] with a registered set of hooks.
#[derive(Debug)]
pub struct EventStoreFacadeBuilder<P: Persistence> {
    persistence: P,
    hooks: PipelineHooks,
}

impl<P: Persistence> EventStoreFacadeBuilder<P> {
    pub fn register_hook(mut self, hook: Box<dyn PipelineHook>) -> Self {
        self.hooks.register(hook);
        self
    }

    pub fn build(self) -> EventStoreFacade<P> {
        let hooks = Arc::new(self.hooks);
        EventStoreFacade { persistence: HookAwarePersistence::new(self.persistence, hooks.clone()), hooks }
    }
}

/// Opens/creates streams and routes commits through the pipeline.
#[derive(Debug)]
pub struct EventStoreFacade<P: Persistence> {
    persistence: HookAwarePersistence<P>,
    hooks: Arc<PipelineHooks>,
}

impl<P: Persistence> EventStoreFacade<P> {
    pub fn builder(persistence: P) -> EventStoreFacadeBuilder<P> {
        EventStoreFacadeBuilder { persistence, hooks: PipelineHooks::new() }
    }

    pub fn new(persistence: P) -> Self {
        Self::builder(persistence).build()
    }

    /// A fresh, transient stream at revision 0.
    pub fn create_stream(&self, bucket_id: impl Into<String>, stream_id: impl Into<String>) -> OptimisticEventStream {
        OptimisticEventStream::new_fresh(bucket_id.into(), stream_id.into())
    }

    /// A fresh, transient stream in [`crate::commit::DEFAULT_BUCKET`].
    pub fn create_stream_default_bucket(&self, stream_id: impl Into<String>) -> OptimisticEventStream {
        self.create_stream(DEFAULT_BUCKET, stream_id)
    }

    /// Materializes committed history by replaying `get_from` into a stream.
    /// `max_revision <= 0` means unbounded.
    pub fn open_stream(&self,
                       bucket_id: impl Into<String>,
                       stream_id: impl Into<String>,
                       min_revision: u64,
                       max_revision: u64)
                       -> StoreResult<OptimisticEventStream> {
        let bucket_id = bucket_id.into();
        let stream_id = stream_id.into();
        let max_revision = resolve_max_revision(max_revision);
        let commits = self.persistence.get_from_revision(&bucket_id, &stream_id, min_revision, max_revision)?;
        Ok(OptimisticEventStream::from_commits(bucket_id, stream_id, commits, min_revision, max_revision))
    }

    /// Materializes a stream from a snapshot, loading only commits with
    /// revision greater than `snapshot.stream_revision`. `max_revision <= 0`
    /// means unbounded.
    pub fn open_stream_from_snapshot(&self, snapshot: Snapshot, max_revision: u64) -> StoreResult<OptimisticEventStream> {
        let max_revision = resolve_max_revision(max_revision);
        let commits = self.persistence.get_from_revision(&snapshot.bucket_id,
                                                         &snapshot.stream_id,
                                                         snapshot.stream_revision + 1,
                                                         max_revision)?;
        Ok(OptimisticEventStream::from_snapshot(snapshot, commits, max_revision))
    }

    /// Runs the pre-commit chain; if not vetoed, commits to persistence and
    /// runs the post-commit chain. Returns `Ok(None)` if a hook vetoed the
    /// attempt.
    pub fn commit(&self, attempt: CommitAttempt) -> StoreResult<Option<Commit>> {
        attempt.validate().map_err(StoreError::InvalidAttempt)?;

        if !self.hooks.run_pre_commit(&attempt)? {
            return Ok(None);
        }

        let commit = self.persistence.commit(attempt)?;
        self.hooks.run_post_commit(&commit);
        Ok(Some(commit))
    }

    /// Reads commits across a stream's revision range, after the hook
    /// chain's `select` has had a chance to transform/filter each one.
    pub fn get_from(&self,
                    bucket_id: &str,
                    stream_id: &str,
                    min_revision: u64,
                    max_revision: u64)
                    -> StoreResult<Vec<Commit>> {
        self.persistence.get_from_revision(bucket_id, stream_id, min_revision, resolve_max_revision(max_revision))
    }

    /// Reads commits across all streams in a bucket past `checkpoint_token`.
    pub fn get_from_checkpoint(&self, bucket_id: &str, checkpoint_token: u64) -> StoreResult<Vec<Commit>> {
        self.persistence.get_from_checkpoint(bucket_id, checkpoint_token)
    }

    pub fn get_snapshot(&self, bucket_id: &str, stream_id: &str, max_revision: u64) -> StoreResult<Option<Snapshot>> {
        self.persistence.get_snapshot(bucket_id, stream_id, resolve_max_revision(max_revision))
    }

    pub fn add_snapshot(&self, snapshot: Snapshot) -> StoreResult<bool> {
        self.persistence.add_snapshot(snapshot)
    }

    pub fn get_streams_to_snapshot(&self, bucket_id: &str, min_threshold: u64) -> StoreResult<Vec<StreamHead>> {
        self.persistence.get_streams_to_snapshot(bucket_id, min_threshold)
    }

    pub fn purge(&self, bucket_id: Option<&str>) -> StoreResult<()> {
        self.persistence.purge(bucket_id)
    }

    pub fn delete_stream(&self, bucket_id: &str, stream_id: &str) -> StoreResult<()> {
        self.persistence.delete_stream(bucket_id, stream_id)
    }

    /// Escape hatch exposing the full persistence contract directly,
    /// bypassing the stream/facade ergonomics above.
    pub fn advanced(&self) -> &HookAwarePersistence<P> {
        &self.persistence
    }

    /// Disposes persistence and then each hook once, in registration order.
    pub fn dispose(self) {
        // Dropping `self.persistence` releases the backend (connection
        // pools, file handles, ...) before hooks tear down.
        drop(self.persistence);
        self.hooks.dispose_all();
    }
}

