//! Postgres-backed [`Persistence`] implementation (Diesel).
//!
//! Goals:
//! - Durable parity with [`eventstore_core::InMemoryPersistence`]: the same
//!   ordering, uniqueness and idempotency guarantees, backed by a real
//!   append-only table instead of a `Mutex<HashMap<..>>`.
//! - Every commit goes through a single serializable-read-then-insert path
//!   so `commit_sequence`/`commit_id` collisions surface as the right
//!   `StoreError` variant rather than an opaque SQL error.
//! - Transient backend faults (pool exhaustion, serialization failures) are
//!   retried with a small backoff before being surfaced as
//!   `StoreError::StorageUnavailable`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use diesel::dsl::sql;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::sql_types::{BigInt, Bool, Text};
use log::warn;
use serde_json::Value;
use uuid::Uuid;

use eventstore_core::{CheckpointToken, Commit, CommitAttempt, EventMessage, Persistence, Snapshot, StoreError, StoreResult, StreamHead};

use crate::error::{is_retryable, PersistenceError};
use crate::migrations::run_pending_migrations;
use crate::schema::{commits, snapshots};

/// Alias for the r2d2 pool of Postgres connections.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Abstracts obtaining a connection, so tests can substitute a fake provider
/// without depending on a live pool.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

/// The production `ConnectionProvider`, backed by an r2d2 pool.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

#[derive(Queryable, Debug)]
struct CommitRow {
    checkpoint_token: i64,
    bucket_id: String,
    stream_id: String,
    stream_revision: i64,
    commit_id: Uuid,
    commit_sequence: i64,
    commit_stamp: DateTime<Utc>,
    headers: Value,
    events: Value,
}

impl CommitRow {
    fn into_commit(self) -> Result<Commit, PersistenceError> {
        let headers: BTreeMap<String, Value> =
            serde_json::from_value(self.headers).map_err(|e| PersistenceError::Unknown(format!("bad headers json: {e}")))?;
        let events: Vec<EventMessage> =
            serde_json::from_value(self.events).map_err(|e| PersistenceError::Unknown(format!("bad events json: {e}")))?;
        Ok(Commit { bucket_id: self.bucket_id,
                   stream_id: self.stream_id,
                   stream_revision: self.stream_revision as u64,
                   commit_id: self.commit_id,
                   commit_sequence: self.commit_sequence as u64,
                   commit_stamp: self.commit_stamp,
                   headers,
                   events,
                   checkpoint_token: self.checkpoint_token as u64 })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = commits)]
struct NewCommitRow {
    bucket_id: String,
    stream_id: String,
    stream_revision: i64,
    commit_id: Uuid,
    commit_sequence: i64,
    commit_stamp: DateTime<Utc>,
    headers: Value,
    events: Value,
}

#[derive(Queryable, Debug)]
struct SnapshotRow {
    #[allow(dead_code)]
    bucket_id: String,
    #[allow(dead_code)]
    stream_id: String,
    stream_revision: i64,
    payload: Value,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = snapshots)]
struct NewSnapshotRow {
    bucket_id: String,
    stream_id: String,
    stream_revision: i64,
    payload: Value,
}

#[derive(QueryableByName, Debug)]
struct StreamHeadRow {
    #[diesel(sql_type = Text)]
    bucket_id: String,
    #[diesel(sql_type = Text)]
    stream_id: String,
    #[diesel(sql_type = BigInt)]
    head_revision: i64,
    #[diesel(sql_type = BigInt)]
    snapshot_revision: i64,
}

/// Retries `f` up to 3 times with a small linear backoff when the error is
/// transient. Mirrors the retry policy used by the hook-aware decorator's
/// in-process counterpart: no business semantics change, just repetition.
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * (attempts + 1);
                warn!("retryable persistence error (attempt {}): {e:?} -> sleeping {delay_ms}ms", attempts + 1);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

fn headers_json(headers: &BTreeMap<String, Value>) -> Result<Value, PersistenceError> {
    serde_json::to_value(headers).map_err(|e| PersistenceError::Unknown(format!("serialize headers: {e}")))
}

fn events_json(events: &[EventMessage]) -> Result<Value, PersistenceError> {
    serde_json::to_value(events).map_err(|e| PersistenceError::Unknown(format!("serialize events: {e}")))
}

/// Postgres-backed `Persistence`. Generic over the connection provider so
/// tests can swap in a fake without a live database.
pub struct PgPersistence<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgPersistence<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: ConnectionProvider> Persistence for PgPersistence<P> {
    fn get_from_revision(&self,
                         bucket_id: &str,
                         stream_id: &str,
                         min_revision: u64,
                         max_revision: u64)
                         -> StoreResult<Vec<Commit>> {
        let bucket_id = bucket_id.to_string();
        let stream_id = stream_id.to_string();
        let min_rev = min_revision as i64;
        let max_rev = max_revision.min(i64::MAX as u64) as i64;

        let rows: Vec<CommitRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            commits::table.filter(commits::bucket_id.eq(&bucket_id))
                          .filter(commits::stream_id.eq(&stream_id))
                          .filter(commits::stream_revision.ge(min_rev))
                          .filter(sql::<Bool>("stream_revision - jsonb_array_length(events) + 1 <= ").bind::<BigInt, _>(max_rev))
                          .order(commits::commit_sequence.asc())
                          .load(&mut conn)
                          .map_err(PersistenceError::from)
        }).map_err(StoreError::from)?;

        rows.into_iter().map(|r| r.into_commit().map_err(StoreError::from)).collect()
    }

    fn get_from_checkpoint(&self, bucket_id: &str, checkpoint_token: CheckpointToken) -> StoreResult<Vec<Commit>> {
        let bucket_id = bucket_id.to_string();
        let token = checkpoint_token as i64;

        let rows: Vec<CommitRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            commits::table.filter(commits::bucket_id.eq(&bucket_id))
                          .filter(commits::checkpoint_token.gt(token))
                          .order(commits::checkpoint_token.asc())
                          .load(&mut conn)
                          .map_err(PersistenceError::from)
        }).map_err(StoreError::from)?;

        rows.into_iter().map(|r| r.into_commit().map_err(StoreError::from)).collect()
    }

    fn commit(&self, attempt: CommitAttempt) -> StoreResult<Commit> {
        let headers = headers_json(&attempt.headers).map_err(StoreError::from)?;
        let events = events_json(&attempt.events).map_err(StoreError::from)?;
        let row = NewCommitRow { bucket_id: attempt.bucket_id.clone(),
                                stream_id: attempt.stream_id.clone(),
                                stream_revision: attempt.stream_revision as i64,
                                commit_id: attempt.commit_id,
                                commit_sequence: attempt.commit_sequence as i64,
                                commit_stamp: attempt.commit_stamp,
                                headers,
                                events };

        let inserted: Result<i64, PersistenceError> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(commits::table).values(&row)
                                               .returning(commits::checkpoint_token)
                                               .get_result(&mut conn)
                                               .map_err(PersistenceError::from)
        });

        match inserted {
            Ok(checkpoint_token) => Ok(Commit::from_attempt(attempt, checkpoint_token as u64)),
            Err(PersistenceError::UniqueViolation { constraint, .. }) => {
                match constraint.as_deref() {
                    Some("uq_commits_commit_id") => Err(StoreError::DuplicateCommit { bucket_id: attempt.bucket_id,
                                                                                      stream_id: attempt.stream_id,
                                                                                      commit_id: attempt.commit_id }),
                    _ => Err(StoreError::ConcurrencyConflict { bucket_id: attempt.bucket_id, stream_id: attempt.stream_id }),
                }
            }
            Err(other) => Err(other.into()),
        }
    }

    fn get_snapshot(&self, bucket_id: &str, stream_id: &str, max_revision: u64) -> StoreResult<Option<Snapshot>> {
        let bucket_id_owned = bucket_id.to_string();
        let stream_id_owned = stream_id.to_string();
        let max_rev = max_revision.min(i64::MAX as u64) as i64;

        let row: Option<SnapshotRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            snapshots::table.filter(snapshots::bucket_id.eq(&bucket_id_owned))
                            .filter(snapshots::stream_id.eq(&stream_id_owned))
                            .filter(snapshots::stream_revision.le(max_rev))
                            .order(snapshots::stream_revision.desc())
                            .first(&mut conn)
                            .optional()
                            .map_err(PersistenceError::from)
        }).map_err(StoreError::from)?;

        Ok(row.map(|r| Snapshot { bucket_id: bucket_id.to_string(),
                                  stream_id: stream_id.to_string(),
                                  stream_revision: r.stream_revision as u64,
                                  payload: r.payload }))
    }

    fn add_snapshot(&self, snapshot: Snapshot) -> StoreResult<bool> {
        let new_revision = snapshot.stream_revision as i64;
        let bucket_id = snapshot.bucket_id.clone();
        let stream_id = snapshot.stream_id.clone();

        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction().read_write().run(|tx_conn| {
                let stream_exists: bool = diesel::select(diesel::dsl::exists(commits::table.filter(commits::bucket_id.eq(&bucket_id))
                                                                                           .filter(commits::stream_id.eq(&stream_id)))).get_result(tx_conn)?;
                if !stream_exists {
                    return Ok(false);
                }

                let newest: Option<i64> = snapshots::table.filter(snapshots::bucket_id.eq(&bucket_id))
                                                           .filter(snapshots::stream_id.eq(&stream_id))
                                                           .select(diesel::dsl::max(snapshots::stream_revision))
                                                           .first(tx_conn)?;
                if newest.map(|rev| rev >= new_revision).unwrap_or(false) {
                    return Ok(false);
                }

                diesel::insert_into(snapshots::table).values(NewSnapshotRow { bucket_id: bucket_id.clone(),
                                                                              stream_id: stream_id.clone(),
                                                                              stream_revision: new_revision,
                                                                              payload: snapshot.payload.clone() })
                                                     .execute(tx_conn)?;
                Ok::<bool, diesel::result::Error>(true)
            }).map_err(PersistenceError::from)
        }).map_err(StoreError::from)
    }

    fn get_streams_to_snapshot(&self, bucket_id: &str, min_threshold: u64) -> StoreResult<Vec<StreamHead>> {
        let bucket_id = bucket_id.to_string();
        let threshold = min_threshold as i64;

        let rows: Vec<StreamHeadRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::sql_query("SELECT c.bucket_id, c.stream_id, MAX(c.stream_revision) AS head_revision, \
                                COALESCE(MAX(s.stream_revision), 0) AS snapshot_revision \
                                FROM commits c LEFT JOIN snapshots s \
                                ON s.bucket_id = c.bucket_id AND s.stream_id = c.stream_id \
                                WHERE c.bucket_id = $1 \
                                GROUP BY c.bucket_id, c.stream_id \
                                HAVING MAX(c.stream_revision) - COALESCE(MAX(s.stream_revision), 0) >= $2")
                .bind::<Text, _>(&bucket_id)
                .bind::<BigInt, _>(threshold)
                .load(&mut conn)
                .map_err(PersistenceError::from)
        }).map_err(StoreError::from)?;

        Ok(rows.into_iter()
               .map(|r| StreamHead { bucket_id: r.bucket_id,
                                     stream_id: r.stream_id,
                                     head_revision: r.head_revision as u64,
                                     snapshot_revision: r.snapshot_revision as u64 })
               .collect())
    }

    fn initialize(&self) -> StoreResult<()> {
        let mut conn = self.provider.connection().map_err(StoreError::from)?;
        run_pending_migrations(&mut conn).map_err(StoreError::from)
    }

    fn purge(&self, bucket_id: Option<&str>) -> StoreResult<()> {
        let bucket_id = bucket_id.map(str::to_string);
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            match &bucket_id {
                Some(b) => {
                    diesel::delete(commits::table.filter(commits::bucket_id.eq(b))).execute(&mut conn)?;
                    diesel::delete(snapshots::table.filter(snapshots::bucket_id.eq(b))).execute(&mut conn)?;
                }
                None => {
                    diesel::delete(commits::table).execute(&mut conn)?;
                    diesel::delete(snapshots::table).execute(&mut conn)?;
                }
            }
            Ok(())
        }).map_err(StoreError::from)
    }

    fn delete_stream(&self, bucket_id: &str, stream_id: &str) -> StoreResult<()> {
        let bucket_id = bucket_id.to_string();
        let stream_id = stream_id.to_string();
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::delete(commits::table.filter(commits::bucket_id.eq(&bucket_id)).filter(commits::stream_id.eq(&stream_id))).execute(&mut conn)?;
            diesel::delete(snapshots::table.filter(snapshots::bucket_id.eq(&bucket_id)).filter(snapshots::stream_id.eq(&stream_id))).execute(&mut conn)?;
            Ok(())
        }).map_err(StoreError::from)
    }
}

/// Builds an r2d2 pool and runs pending migrations against it once.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let min_size = min_size.max(1);
    let max_size = max_size.max(min_size);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(min_size))
                                    .max_size(max_size)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Development helper: loads `.env`, reads `DbConfig`, builds a migrated
/// pool.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env();
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
