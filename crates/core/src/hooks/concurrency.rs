//! Optimistic concurrency hook (§4.4).
//!
//! A process-local fast-path conflict detector. For each `(bucket_id,
//! stream_id)` it tracks the head `(stream_revision, commit_sequence)`
//! observed via `select` (reads) or a successful `post_commit` (writes), plus
//! a bounded LRU of recently-seen commit ids for duplicate detection.
//!
//! The cache is advisory: entries are monotonic (revisions only increase),
//! so an eviction degrades to a false-negative cache miss — persistence's
//! own uniqueness constraints are the authority of record. Evictions must
//! never produce a false commit.

use std::collections::VecDeque;
use std::sync::Mutex;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::commit::{Commit, CommitAttempt};
use crate::error::{StoreError, StoreResult};

use super::PipelineHook;

const DEFAULT_MAX_TRACKED_STREAMS: usize = 10_000;
const DEFAULT_MAX_RECENT_COMMIT_IDS: usize = 64;

#[derive(Debug, Default)]
struct StreamHeadCache {
    stream_revision: u64,
    commit_sequence: u64,
    recent_commit_ids: VecDeque<Uuid>,
}

impl StreamHeadCache {
    fn remembers(&self, commit_id: Uuid) -> bool {
        self.recent_commit_ids.contains(&commit_id)
    }

    fn remember(&mut self, commit_id: Uuid, cap: usize) {
        if self.remembers(commit_id) {
            return;
        }
        if self.recent_commit_ids.len() >= cap {
            self.recent_commit_ids.pop_front();
        }
        self.recent_commit_ids.push_back(commit_id);
    }

    fn observe(&mut self, stream_revision: u64, commit_sequence: u64, commit_id: Uuid, cap: usize) {
        self.stream_revision = self.stream_revision.max(stream_revision);
        self.commit_sequence = self.commit_sequence.max(commit_sequence);
        self.remember(commit_id, cap);
    }
}

/// In-memory head cache backing the optimistic concurrency hook. Bounded by
/// `max_tracked_streams` streams and `max_recent_commit_ids` per stream.
#[derive(Debug)]
pub struct OptimisticConcurrencyHook {
    cache: Mutex<IndexMap<(String, String), StreamHeadCache>>,
    max_tracked_streams: usize,
    max_recent_commit_ids: usize,
}

impl OptimisticConcurrencyHook {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_TRACKED_STREAMS, DEFAULT_MAX_RECENT_COMMIT_IDS)
    }

    pub fn with_capacity(max_tracked_streams: usize, max_recent_commit_ids: usize) -> Self {
        Self { cache: Mutex::new(IndexMap::new()), max_tracked_streams, max_recent_commit_ids }
    }

    fn key(bucket_id: &str, stream_id: &str) -> (String, String) {
        (bucket_id.to_string(), stream_id.to_string())
    }
}

impl Default for OptimisticConcurrencyHook {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineHook for OptimisticConcurrencyHook {
    fn pre_commit(&self, attempt: &CommitAttempt) -> StoreResult<bool> {
        let key = Self::key(&attempt.bucket_id, &attempt.stream_id);
        let cache = self.cache.lock().expect("optimistic concurrency cache poisoned");
        if let Some(head) = cache.get(&key) {
            if attempt.commit_sequence <= head.commit_sequence || attempt.stream_revision <= head.stream_revision {
                return Err(StoreError::ConcurrencyConflict { bucket_id: attempt.bucket_id.clone(),
                                                             stream_id: attempt.stream_id.clone() });
            }
            if head.remembers(attempt.commit_id) {
                return Err(StoreError::DuplicateCommit { bucket_id: attempt.bucket_id.clone(),
                                                         stream_id: attempt.stream_id.clone(),
                                                         commit_id: attempt.commit_id });
            }
        }
        Ok(true)
    }

    fn post_commit(&self, commit: &Commit) -> StoreResult<()> {
        self.observe(commit);
        Ok(())
    }

    fn select(&self, commit: Commit) -> Option<Commit> {
        self.observe(&commit);
        Some(commit)
    }

    fn on_purge(&self, bucket_id: Option<&str>) {
        let mut cache = self.cache.lock().expect("optimistic concurrency cache poisoned");
        match bucket_id {
            Some(bucket_id) => cache.retain(|(b, _), _| b != bucket_id),
            None => cache.clear(),
        }
    }

    fn on_delete_stream(&self, bucket_id: &str, stream_id: &str) {
        let mut cache = self.cache.lock().expect("optimistic concurrency cache poisoned");
        cache.shift_remove(&Self::key(bucket_id, stream_id));
    }
}

impl OptimisticConcurrencyHook {
    fn observe(&self, commit: &Commit) {
        let key = Self::key(&commit.bucket_id, &commit.stream_id);
        let mut cache = self.cache.lock().expect("optimistic concurrency cache poisoned");
        if !cache.contains_key(&key) && cache.len() >= self.max_tracked_streams {
            // FIFO eviction of the oldest-tracked stream. Correctness
            // tolerates this since a miss just defers to persistence.
            cache.shift_remove_index(0);
        }
        let entry = cache.entry(key).or_default();
        entry.observe(commit.stream_revision, commit.commit_sequence, commit.commit_id, self.max_recent_commit_ids);
    }
}
