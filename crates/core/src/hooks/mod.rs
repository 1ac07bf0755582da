//! Pipeline hook chain (§4.2).
//!
//! A hook is a pluggable interceptor over the commit/read path. It exposes
//! optional capabilities — pre-commit veto, post-commit observation,
//! per-commit read transform/filter, and admin-event observation — as
//! default no-op methods on [`PipelineHook`], the same shape as
//! `ParamInjector` in the engine this crate grew out of: a trait object
//! collected into a plain `Vec` and applied in registration order, not a
//! class hierarchy.

mod decorator;
mod concurrency;

pub use decorator::HookAwarePersistence;
pub use concurrency::OptimisticConcurrencyHook;

use std::fmt::Debug;

use crate::commit::{Commit, CommitAttempt};
use crate::error::StoreResult;

/// A pluggable interceptor over the commit/read path. All methods have
/// no-op defaults; implementations override only the capabilities they need.
pub trait PipelineHook: Send + Sync + Debug {
    /// Called in registration order before persistence. Returning `Ok(false)`
    /// vetoes the commit: the facade returns `Ok(None)` without invoking
    /// persistence, and no further hooks (pre- or post-commit) run.
    /// Returning `Err` aborts the commit with that error.
    fn pre_commit(&self, _attempt: &CommitAttempt) -> StoreResult<bool> {
        Ok(true)
    }

    /// Called in registration order after a successful `Persistence::commit`.
    /// Errors are logged by the facade and never propagated to the caller.
    fn post_commit(&self, _commit: &Commit) -> StoreResult<()> {
        Ok(())
    }

    /// Applied to each commit produced by a read (`get_from_revision` /
    /// get_from_checkpoint`). Returning `None` drops the commit from the
    /// result; hooks compose left-to-right.
    fn select(&self, commit: Commit) -> Option<Commit> {
        Some(commit)
    }

    /// Observes a `purge` admin operation, used to invalidate hook-local
    /// caches.
    fn on_purge(&self, _bucket_id: Option<&str>) {}

    /// Observes a `delete_stream` admin operation.
    fn on_delete_stream(&self, _bucket_id: &str, _stream_id: &str) {}

    /// Called once during facade teardown, in registration order, after
    /// persistence has been disposed. Failures are logged and suppressed.
    fn dispose(&self) {}
}

/// An ordered collection of [`PipelineHook`]s.
#[derive(Debug, Default)]
pub struct PipelineHooks {
    hooks: Vec<Box<dyn PipelineHook>>,
}

impl PipelineHooks {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn register(&mut self, hook: Box<dyn PipelineHook>) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook's `pre_commit` in order. Stops and returns `Ok(false)`
    /// on the first veto, or `Err` on the first failure. Hooks after a veto
    /// or a failure are never invoked.
    pub fn run_pre_commit(&self, attempt: &CommitAttempt) -> StoreResult<bool> {
        for hook in &self.hooks {
            if !hook.pre_commit(attempt)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Runs every hook's `post_commit` in order. A failing hook is logged
    /// and does not stop the remaining hooks from running.
    pub fn run_post_commit(&self, commit: &Commit) {
        for hook in &self.hooks {
            if let Err(err) = hook.post_commit(commit) {
                log::warn!("post-commit hook {hook:?} failed: {err}");
            }
        }
    }

    /// Applies every hook's `select` to `commit`, left to right. Returns
    /// `None` as soon as a hook drops the commit.
    pub fn run_select(&self, mut commit: Commit) -> Option<Commit> {
        for hook in &self.hooks {
            commit = hook.select(commit)?;
        }
        Some(commit)
    }

    pub fn run_on_purge(&self, bucket_id: Option<&str>) {
        for hook in &self.hooks {
            hook.on_purge(bucket_id);
        }
    }

    pub fn run_on_delete_stream(&self, bucket_id: &str, stream_id: &str) {
        for hook in &self.hooks {
            hook.on_delete_stream(bucket_id, stream_id);
        }
    }

    /// Disposes every hook once, in registration order. Failures are logged
    /// (a hook's `dispose` never returns a `Result`, so this can't fail, but
    /// we keep the call site uniform with how the facade disposes
    /// persistence).
    pub fn dispose_all(&self) {
        for hook in &self.hooks {
            hook.dispose();
        }
    }
}
