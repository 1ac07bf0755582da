//! Optimistic event stream (§4.6).
//!
//! The central client-side object: an uncommitted event buffer plus the
//! replayed committed history for one `(bucket_id, stream_id)`. A stream is
//! owned by exactly one writer at a time — it is not `Sync`-safe by
//! contract, mirroring how the source engine's `FlowInstance` is rebuilt
//! fresh per replay rather than shared behind a lock.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use uuid::Uuid;

use crate::commit::{Commit, CommitAttempt, EventMessage, Snapshot};
use crate::error::{StoreError, StoreResult};
use crate::persistence::Persistence;
use crate::store::{EventStoreFacade, UNBOUNDED_REVISION};

/// Client-side buffer, revision tracker, and commit assembler for one
/// stream. See §4.6 and the state machine table in the design notes.
#[derive(Debug, Clone)]
pub struct OptimisticEventStream {
    bucket_id: String,
    stream_id: String,
    stream_revision: u64,
    commit_sequence: u64,
    committed_headers: BTreeMap<String, serde_json::Value>,
    committed_events: Vec<EventMessage>,
    uncommitted_headers: BTreeMap<String, serde_json::Value>,
    uncommitted_events: Vec<EventMessage>,
    identifiers: HashSet<Uuid>,
    min_revision: u64,
    max_revision: u64,
}

impl OptimisticEventStream {
    pub fn new_fresh(bucket_id: String, stream_id: String) -> Self {
        Self { bucket_id,
              stream_id,
              stream_revision: 0,
              commit_sequence: 0,
              committed_headers: BTreeMap::new(),
              committed_events: Vec::new(),
              uncommitted_headers: BTreeMap::new(),
              uncommitted_events: Vec::new(),
              identifiers: HashSet::new(),
              min_revision: 1,
              max_revision: UNBOUNDED_REVISION }
    }

    pub fn from_commits(bucket_id: String, stream_id: String, commits: Vec<Commit>, min_revision: u64, max_revision: u64) -> Self {
        let mut stream = Self { min_revision, max_revision, ..Self::new_fresh(bucket_id, stream_id) };
        for commit in commits {
            stream.merge_commit(&commit);
        }
        stream
    }

    pub fn from_snapshot(snapshot: Snapshot, commits: Vec<Commit>, max_revision: u64) -> Self {
        let mut stream = Self { min_revision: snapshot.stream_revision + 1,
                                max_revision,
                                stream_revision: snapshot.stream_revision,
                                ..Self::new_fresh(snapshot.bucket_id, snapshot.stream_id) };
        for commit in commits {
            stream.merge_commit(&commit);
        }
        stream
    }

    pub fn bucket_id(&self) -> &str {
        &self.bucket_id
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn stream_revision(&self) -> u64 {
        self.stream_revision
    }

    pub fn commit_sequence(&self) -> u64 {
        self.commit_sequence
    }

    pub fn committed_events(&self) -> &[EventMessage] {
        &self.committed_events
    }

    pub fn committed_headers(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.committed_headers
    }

    pub fn uncommitted_events(&self) -> &[EventMessage] {
        &self.uncommitted_events
    }

    pub fn uncommitted_headers(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.uncommitted_headers
    }

    pub fn has_changes(&self) -> bool {
        !self.uncommitted_events.is_empty()
    }

    /// Appends an event to the uncommitted buffer. Events with a `null` body
    /// are rejected.
    pub fn add(&mut self, event: EventMessage) -> Result<(), StoreError> {
        if event.body.is_null() {
            return Err(StoreError::InvalidAttempt("event body must not be null".into()));
        }
        self.uncommitted_events.push(event);
        Ok(())
    }

    /// Stages a header for the next commit.
    pub fn set_header(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.uncommitted_headers.insert(key.into(), value);
    }

    /// Drops all uncommitted state.
    pub fn clear_changes(&mut self) {
        self.uncommitted_events.clear();
        self.uncommitted_headers.clear();
    }

    /// Folds a durable commit into committed state: appends events whose
    /// effective revision falls within `[min_revision, max_revision]`,
    /// advances `stream_revision`/`commit_sequence` monotonically, and
    /// merges headers last-writer-wins in commit order.
    fn merge_commit(&mut self, commit: &Commit) {
        for (index, event) in commit.events.iter().enumerate() {
            let effective_revision = commit.effective_revision(index);
            if effective_revision >= self.min_revision && effective_revision <= self.max_revision {
                self.committed_events.push(event.clone());
            }
        }
        self.stream_revision = self.stream_revision.max(commit.stream_revision);
        self.commit_sequence = self.commit_sequence.max(commit.commit_sequence);
        for (key, value) in &commit.headers {
            self.committed_headers.insert(key.clone(), value.clone());
        }
        self.identifiers.insert(commit.commit_id);
    }

    /// Refreshes committed history past the current `stream_revision` by
    /// re-reading from the facade. Used after a concurrency conflict.
    fn refresh<P: Persistence>(&mut self, facade: &EventStoreFacade<P>) -> StoreResult<()> {
        let commits = facade.get_from(&self.bucket_id, &self.stream_id, self.stream_revision + 1, self.max_revision)?;
        for commit in commits {
            self.merge_commit(&commit);
        }
        Ok(())
    }

    fn build_attempt(&self, commit_id: Uuid) -> CommitAttempt {
        CommitAttempt { bucket_id: self.bucket_id.clone(),
                       stream_id: self.stream_id.clone(),
                       stream_revision: self.stream_revision + self.uncommitted_events.len() as u64,
                       commit_id,
                       commit_sequence: self.commit_sequence + 1,
                       commit_stamp: Utc::now(),
                       headers: self.uncommitted_headers.clone(),
                       events: self.uncommitted_events.clone() }
    }

    /// Commits the uncommitted buffer through `facade`. See the state
    /// machine in the design notes:
    ///
    /// - `commit_id` already incorporated -> idempotent no-op, `Ok(None)`.
    /// - empty buffer -> `Ok(None)` without calling the facade.
    /// - success -> merges the durable commit, returns `Ok(Some(commit))`.
    /// - `ConcurrencyConflict` -> refreshes history, buffer preserved,
    ///   returns `Err`.
    /// - `DuplicateCommit` -> recorded and swallowed as success, `Ok(None)`.
    /// - hook veto (`Ok(None)` from the facade) -> buffer preserved,
    ///   `Ok(None)`.
    /// - any other error -> propagated, buffer preserved.
    pub fn commit_changes<P: Persistence>(&mut self, facade: &EventStoreFacade<P>, commit_id: Uuid) -> StoreResult<Option<Commit>> {
        if self.identifiers.contains(&commit_id) {
            self.clear_changes();
            return Ok(None);
        }
        if self.uncommitted_events.is_empty() {
            return Ok(None);
        }

        let attempt = self.build_attempt(commit_id);

        match facade.commit(attempt) {
            Ok(Some(commit)) => {
                self.merge_commit(&commit);
                self.clear_changes();
                Ok(Some(commit))
            }
            Ok(None) => Ok(None), // vetoed by a pre-commit hook; buffer preserved
            Err(StoreError::ConcurrencyConflict { .. }) => {
                let conflict = StoreError::ConcurrencyConflict { bucket_id: self.bucket_id.clone(),
                                                                 stream_id: self.stream_id.clone() };
                self.refresh(facade)?;
                Err(conflict)
            }
            Err(StoreError::DuplicateCommit { .. }) => {
                self.identifiers.insert(commit_id);
                self.clear_changes();
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }
}
