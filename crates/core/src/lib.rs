//! eventstore-core: optimistic commit pipeline and stream-projection engine
//!
//! Purpose:
//! - Provide the storage-neutral contracts and the minimal orchestration
//!   needed to accumulate uncommitted events against a stream, commit them
//!   through an ordered hook chain, and detect concurrent writers
//!   optimistically — without locking across writers.
//! - Produce an append-only, globally checkpointed commit log that can be
//!   replayed deterministically into application state.
//!
//! Main components:
//! - `commit`: the data model — `EventMessage`, `CommitAttempt`, `Commit`,
//!   `Snapshot`.
//! - `persistence`: the `Persistence` trait backends must satisfy.
//! - `memory`: a volatile, thread-safe `Persistence` for tests and demos.
//! - `hooks`: the pipeline hook chain, the hook-aware persistence decorator,
//!   and the optimistic concurrency hook.
//! - `store`: `EventStoreFacade`, which opens/creates streams and routes
//!   commits through the hook chain.
//! - `stream`: `OptimisticEventStream`, the client-owned uncommitted buffer
//!   and commit assembler.
//! - `error`: the failure taxonomy shared by persistence and the facade.
//!
//! Re-exports: the symbols most callers need are re-exported at the crate
//! root.

pub mod commit;
pub mod error;
pub mod hooks;
pub mod memory;
pub mod persistence;
pub mod store;
pub mod stream;

pub use commit::{CheckpointToken, Commit, CommitAttempt, EventMessage, Snapshot, StreamHead, DEFAULT_BUCKET};
pub use error::{StoreError, StoreResult};
pub use hooks::{HookAwarePersistence, OptimisticConcurrencyHook, PipelineHook, PipelineHooks};
pub use memory::InMemoryPersistence;
pub use persistence::Persistence;
pub use store::{EventStoreFacade, EventStoreFacadeBuilder, UNBOUNDED_REVISION};
pub use stream::OptimisticEventStream;
