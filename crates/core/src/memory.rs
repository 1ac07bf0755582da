//! In-memory [`Persistence`] implementation.
//!
//! Volatile: data is lost when the process exits. Useful for tests and for
//! running the engine without a real backend. Thread-safe via an internal
//! mutex — unlike the teacher's original `InMemoryEventStore`, which took
//! `&mut self` and assumed single-threaded ownership, this type satisfies
//! `Persistence: Send + Sync` so it can sit behind the same facade a SQL
//! backend would.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use uuid::Uuid;

use crate::commit::{CheckpointToken, Commit, CommitAttempt, Snapshot, StreamHead};
use crate::error::{StoreError, StoreResult};
use crate::persistence::Persistence;

type StreamKey = (String, String);

#[derive(Debug, Default)]
struct State {
    streams: HashMap<StreamKey, Vec<Commit>>,
    by_checkpoint: BTreeMap<CheckpointToken, Commit>,
    snapshots: HashMap<StreamKey, Vec<Snapshot>>,
    next_checkpoint: CheckpointToken,
}

/// Volatile, in-process `Persistence` backend.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    state: Mutex<State>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(bucket_id: &str, stream_id: &str) -> StreamKey {
        (bucket_id.to_string(), stream_id.to_string())
    }
}

fn commit_overlaps(commit: &Commit, min_revision: u64, max_revision: u64) -> bool {
    let previous_revision = commit.stream_revision - commit.events.len() as u64;
    commit.stream_revision >= min_revision && previous_revision < max_revision
}

impl Persistence for InMemoryPersistence {
    fn get_from_revision(&self,
                         bucket_id: &str,
                         stream_id: &str,
                         min_revision: u64,
                         max_revision: u64)
                         -> StoreResult<Vec<Commit>> {
        let state = self.state.lock().expect("in-memory persistence mutex poisoned");
        let key = Self::key(bucket_id, stream_id);
        let commits = state.streams
                           .get(&key)
                           .map(|commits| {
                               commits.iter().filter(|c| commit_overlaps(c, min_revision, max_revision)).cloned().collect()
                           })
                           .unwrap_or_default();
        Ok(commits)
    }

    fn get_from_checkpoint(&self, bucket_id: &str, checkpoint_token: CheckpointToken) -> StoreResult<Vec<Commit>> {
        let state = self.state.lock().expect("in-memory persistence mutex poisoned");
        let commits = state.by_checkpoint
                           .range((checkpoint_token + 1)..)
                           .map(|(_, commit)| commit)
                           .filter(|commit| commit.bucket_id == bucket_id)
                           .cloned()
                           .collect();
        Ok(commits)
    }

    fn commit(&self, attempt: CommitAttempt) -> StoreResult<Commit> {
        let mut state = self.state.lock().expect("in-memory persistence mutex poisoned");
        let key = Self::key(&attempt.bucket_id, &attempt.stream_id);
        let existing = state.streams.entry(key.clone()).or_default();

        if existing.iter().any(|c| c.commit_id == attempt.commit_id) {
            return Err(StoreError::DuplicateCommit { bucket_id: attempt.bucket_id.clone(),
                                                     stream_id: attempt.stream_id.clone(),
                                                     commit_id: attempt.commit_id });
        }

        let expected_sequence = existing.len() as u64 + 1;
        let expected_previous_revision = existing.last().map(|c| c.stream_revision).unwrap_or(0);
        if attempt.commit_sequence != expected_sequence || attempt.previous_stream_revision() != expected_previous_revision {
            return Err(StoreError::ConcurrencyConflict { bucket_id: attempt.bucket_id.clone(),
                                                         stream_id: attempt.stream_id.clone() });
        }

        let checkpoint_token = state.next_checkpoint + 1;
        let commit = Commit::from_attempt(attempt, checkpoint_token);

        state.next_checkpoint = checkpoint_token;
        state.by_checkpoint.insert(checkpoint_token, commit.clone());
        state.streams.get_mut(&key).expect("stream entry inserted above").push(commit.clone());
        Ok(commit)
    }

    fn get_snapshot(&self, bucket_id: &str, stream_id: &str, max_revision: u64) -> StoreResult<Option<Snapshot>> {
        let state = self.state.lock().expect("in-memory persistence mutex poisoned");
        let key = Self::key(bucket_id, stream_id);
        let snapshot = state.snapshots
                            .get(&key)
                            .and_then(|snapshots| {
                                snapshots.iter().filter(|s| s.stream_revision <= max_revision).max_by_key(|s| s.stream_revision)
                            })
                            .cloned();
        Ok(snapshot)
    }

    fn add_snapshot(&self, snapshot: Snapshot) -> StoreResult<bool> {
        let mut state = self.state.lock().expect("in-memory persistence mutex poisoned");
        let key = Self::key(&snapshot.bucket_id, &snapshot.stream_id);
        if !state.streams.contains_key(&key) {
            return Ok(false);
        }
        let snapshots = state.snapshots.entry(key).or_default();
        if snapshots.iter().any(|s| s.stream_revision >= snapshot.stream_revision) {
            return Ok(false);
        }
        snapshots.push(snapshot);
        Ok(true)
    }

    fn get_streams_to_snapshot(&self, bucket_id: &str, min_threshold: u64) -> StoreResult<Vec<StreamHead>> {
        let state = self.state.lock().expect("in-memory persistence mutex poisoned");
        let heads = state.streams
                         .iter()
                         .filter(|((bucket, _), _)| bucket == bucket_id)
                         .filter_map(|((bucket, stream), commits)| {
                             let head_revision = commits.last()?.stream_revision;
                             let snapshot_revision = state.snapshots
                                                          .get(&(bucket.clone(), stream.clone()))
                                                          .and_then(|s| s.iter().map(|s| s.stream_revision).max())
                                                          .unwrap_or(0);
                             let head = StreamHead { bucket_id: bucket.clone(),
                                                     stream_id: stream.clone(),
                                                     head_revision,
                                                     snapshot_revision };
                             (head.unsnapshotted_revisions() >= min_threshold).then_some(head)
                         })
                         .collect();
        Ok(heads)
    }

    fn initialize(&self) -> StoreResult<()> {
        Ok(())
    }

    fn purge(&self, bucket_id: Option<&str>) -> StoreResult<()> {
        let mut state = self.state.lock().expect("in-memory persistence mutex poisoned");
        match bucket_id {
            Some(bucket_id) => {
                state.streams.retain(|(bucket, _), _| bucket != bucket_id);
                state.snapshots.retain(|(bucket, _), _| bucket != bucket_id);
                state.by_checkpoint.retain(|_, commit| commit.bucket_id != bucket_id);
            }
            None => {
                state.streams.clear();
                state.snapshots.clear();
                state.by_checkpoint.clear();
            }
        }
        Ok(())
    }

    fn delete_stream(&self, bucket_id: &str, stream_id: &str) -> StoreResult<()> {
        let mut state = self.state.lock().expect("in-memory persistence mutex poisoned");
        let key = Self::key(bucket_id, stream_id);
        state.streams.remove(&key);
        state.snapshots.remove(&key);
        state.by_checkpoint.retain(|_, commit| !(commit.bucket_id == bucket_id && commit.stream_id == stream_id));
        Ok(())
    }
}
