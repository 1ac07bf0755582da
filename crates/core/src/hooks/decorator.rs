//! Hook-aware persistence decorator (§4.3).
//!
//! Wraps a raw [`Persistence`] so read paths run each commit through every
//! hook's `select` before yielding it to the caller, and so admin operations
//! fan out to `on_purge` / `on_delete_stream`. Write paths pass through
//! unchanged — the facade runs the pre/post-commit chain itself. This
//! decorator exists purely so that hooks with caches (the optimistic
//! concurrency hook, in particular) observe the same commits on reads as
//! they observe on writes.
//!
//! Composed by wrapping, not by subclassing: `HookAwarePersistence` and the
//! raw persistence it wraps share the same `Persistence` contract.

use std::sync::Arc;

use crate::commit::{CheckpointToken, Commit, CommitAttempt, Snapshot, StreamHead};
use crate::error::StoreResult;
use crate::persistence::Persistence;

use super::PipelineHooks;

#[derive(Debug)]
pub struct HookAwarePersistence<P: Persistence> {
    inner: P,
    hooks: Arc<PipelineHooks>,
}

impl<P: Persistence> HookAwarePersistence<P> {
    pub fn new(inner: P, hooks: Arc<PipelineHooks>) -> Self {
        Self { inner, hooks }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn filter_selected(&self, commits: Vec<Commit>) -> Vec<Commit> {
        commits.into_iter().filter_map(|c| self.hooks.run_select(c)).collect()
    }
}

impl<P: Persistence> Persistence for HookAwarePersistence<P> {
    fn get_from_revision(&self,
                         bucket_id: &str,
                         stream_id: &str,
                         min_revision: u64,
                         max_revision: u64)
                         -> StoreResult<Vec<Commit>> {
        let commits = self.inner.get_from_revision(bucket_id, stream_id, min_revision, max_revision)?;
        Ok(self.filter_selected(commits))
    }

    fn get_from_checkpoint(&self, bucket_id: &str, checkpoint_token: CheckpointToken) -> StoreResult<Vec<Commit>> {
        let commits = self.inner.get_from_checkpoint(bucket_id, checkpoint_token)?;
        Ok(self.filter_selected(commits))
    }

    fn commit(&self, attempt: CommitAttempt) -> StoreResult<Commit> {
        self.inner.commit(attempt)
    }

    fn get_snapshot(&self, bucket_id: &str, stream_id: &str, max_revision: u64) -> StoreResult<Option<Snapshot>> {
        self.inner.get_snapshot(bucket_id, stream_id, max_revision)
    }

    fn add_snapshot(&self, snapshot: Snapshot) -> StoreResult<bool> {
        self.inner.add_snapshot(snapshot)
    }

    fn get_streams_to_snapshot(&self, bucket_id: &str, min_threshold: u64) -> StoreResult<Vec<StreamHead>> {
        self.inner.get_streams_to_snapshot(bucket_id, min_threshold)
    }

    fn initialize(&self) -> StoreResult<()> {
        self.inner.initialize()
    }

    fn purge(&self, bucket_id: Option<&str>) -> StoreResult<()> {
        self.inner.purge(bucket_id)?;
        self.hooks.run_on_purge(bucket_id);
        Ok(())
    }

    fn delete_stream(&self, bucket_id: &str, stream_id: &str) -> StoreResult<()> {
        self.inner.delete_stream(bucket_id, stream_id)?;
        self.hooks.run_on_delete_stream(bucket_id, stream_id);
        Ok(())
    }
}
