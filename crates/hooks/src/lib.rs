//! Example [`PipelineHook`] implementations.
//!
//! Split in two layers, the same shape as the selection-policy module this
//! crate grew out of: a small `CommitPolicy` contract for deterministic
//! accept/reject decisions, plus concrete policies; and a couple of hooks
//! that aren't policy-shaped at all (logging, header redaction on read).
//! `PolicyHook` adapts any `CommitPolicy` into a `PipelineHook`.

use std::fmt::Debug;

use eventstore_core::{Commit, CommitAttempt, PipelineHook, StoreResult};

/// Outcome of evaluating a commit attempt against a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    Accept,
    Reject { reason: String },
}

/// A deterministic, side-effect-free accept/reject decision over a commit
/// attempt. Kept separate from `PipelineHook` so policies can be tested and
/// composed without touching the facade's veto plumbing.
pub trait CommitPolicy: Send + Sync + Debug {
    fn id(&self) -> &'static str;
    fn evaluate(&self, attempt: &CommitAttempt) -> PolicyOutcome;
}

/// Adapts a [`CommitPolicy`] into a [`PipelineHook`] by vetoing on
/// `PolicyOutcome::Reject`.
#[derive(Debug)]
pub struct PolicyHook<P: CommitPolicy> {
    policy: P,
}

impl<P: CommitPolicy> PolicyHook<P> {
    pub fn new(policy: P) -> Self {
        Self { policy }
    }
}

impl<P: CommitPolicy> PipelineHook for PolicyHook<P> {
    fn pre_commit(&self, attempt: &CommitAttempt) -> StoreResult<bool> {
        match self.policy.evaluate(attempt) {
            PolicyOutcome::Accept => Ok(true),
            PolicyOutcome::Reject { reason } => {
                log::debug!("commit vetoed by policy {}: {reason}", self.policy.id());
                Ok(false)
            }
        }
    }
}

/// Rejects attempts whose event batch exceeds `max_events`. Useful as a
/// cheap backstop against pathologically large commits before they ever
/// reach persistence.
#[derive(Debug, Clone, Copy)]
pub struct MaxEventsPerCommitPolicy {
    pub max_events: usize,
}

impl MaxEventsPerCommitPolicy {
    pub fn new(max_events: usize) -> Self {
        Self { max_events }
    }
}

impl CommitPolicy for MaxEventsPerCommitPolicy {
    fn id(&self) -> &'static str {
        "max_events_per_commit"
    }

    fn evaluate(&self, attempt: &CommitAttempt) -> PolicyOutcome {
        if attempt.events.len() > self.max_events {
            PolicyOutcome::Reject { reason: format!("{} events exceeds limit of {}", attempt.events.len(), self.max_events) }
        } else {
            PolicyOutcome::Accept
        }
    }
}

/// Rejects attempts that don't carry a required commit-level header, e.g. a
/// caller-supplied correlation id.
#[derive(Debug, Clone)]
pub struct RequiredHeaderPolicy {
    pub key: String,
}

impl RequiredHeaderPolicy {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl CommitPolicy for RequiredHeaderPolicy {
    fn id(&self) -> &'static str {
        "required_header"
    }

    fn evaluate(&self, attempt: &CommitAttempt) -> PolicyOutcome {
        if attempt.headers.contains_key(&self.key) {
            PolicyOutcome::Accept
        } else {
            PolicyOutcome::Reject { reason: format!("missing required header {:?}", self.key) }
        }
    }
}

/// Logs every commit/admin event at `info`/`debug` level. Registration order
/// matters only insofar as it determines when in the chain the log line is
/// emitted relative to other hooks' side effects.
#[derive(Debug, Default)]
pub struct LoggingHook;

impl PipelineHook for LoggingHook {
    fn pre_commit(&self, attempt: &CommitAttempt) -> StoreResult<bool> {
        log::debug!("pre_commit {}/{} seq={} events={}",
                    attempt.bucket_id,
                    attempt.stream_id,
                    attempt.commit_sequence,
                    attempt.events.len());
        Ok(true)
    }

    fn post_commit(&self, commit: &Commit) -> StoreResult<()> {
        log::info!("committed {}/{} rev={} checkpoint={}",
                   commit.bucket_id,
                   commit.stream_id,
                   commit.stream_revision,
                   commit.checkpoint_token);
        Ok(())
    }

    fn on_purge(&self, bucket_id: Option<&str>) {
        log::warn!("purge bucket={bucket_id:?}");
    }

    fn on_delete_stream(&self, bucket_id: &str, stream_id: &str) {
        log::warn!("delete_stream {bucket_id}/{stream_id}");
    }
}

/// Strips a header key from every event on read, without touching the
/// durable record. Useful for redacting sensitive values the original
/// writer attached (e.g. a raw auth token) before handing commits to an
/// arbitrary reader.
#[derive(Debug, Clone)]
pub struct RedactHeaderHook {
    pub key: String,
}

impl RedactHeaderHook {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl PipelineHook for RedactHeaderHook {
    fn select(&self, mut commit: Commit) -> Option<Commit> {
        for event in &mut commit.events {
            event.headers.remove(&self.key);
        }
        Some(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use eventstore_core::EventMessage;
    use uuid::Uuid;

    fn attempt_with(n_events: usize, headers: &[(&str, serde_json::Value)]) -> CommitAttempt {
        CommitAttempt { bucket_id: "b".into(),
                       stream_id: "s".into(),
                       stream_revision: n_events as u64,
                       commit_id: Uuid::new_v4(),
                       commit_sequence: 1,
                       commit_stamp: Utc::now(),
                       headers: headers.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                       events: (0..n_events).map(|i| EventMessage::new(serde_json::json!({ "i": i }))).collect() }
    }

    #[test]
    fn max_events_policy_rejects_over_limit_deterministically() {
        let policy = MaxEventsPerCommitPolicy::new(2);
        let under = attempt_with(2, &[]);
        let over = attempt_with(3, &[]);
        assert_eq!(policy.evaluate(&under), PolicyOutcome::Accept);
        assert!(matches!(policy.evaluate(&over), PolicyOutcome::Reject { .. }));
        // Stable across repeated calls on the same input.
        assert_eq!(policy.evaluate(&over), policy.evaluate(&over));
    }

    #[test]
    fn required_header_policy_checks_presence_not_value() {
        let policy = RequiredHeaderPolicy::new("correlation_id");
        let missing = attempt_with(1, &[]);
        let present = attempt_with(1, &[("correlation_id", serde_json::json!("anything"))]);
        assert!(matches!(policy.evaluate(&missing), PolicyOutcome::Reject { .. }));
        assert_eq!(policy.evaluate(&present), PolicyOutcome::Accept);
    }

    #[test]
    fn policy_hook_vetoes_on_reject() {
        let hook = PolicyHook::new(MaxEventsPerCommitPolicy::new(1));
        let attempt = attempt_with(2, &[]);
        assert_eq!(hook.pre_commit(&attempt).unwrap(), false);
    }

    #[test]
    fn redact_header_hook_strips_only_the_named_key() {
        let hook = RedactHeaderHook::new("secret");
        let mut event = EventMessage::new(serde_json::json!({"n": 1}));
        event.headers.insert("secret".into(), serde_json::json!("shh"));
        event.headers.insert("keep".into(), serde_json::json!(true));
        let commit = Commit { bucket_id: "b".into(),
                              stream_id: "s".into(),
                              stream_revision: 1,
                              commit_id: Uuid::new_v4(),
                              commit_sequence: 1,
                              commit_stamp: Utc::now(),
                              headers: Default::default(),
                              events: vec![event],
                              checkpoint_token: 1 };
        let redacted = hook.select(commit).unwrap();
        assert!(!redacted.events[0].headers.contains_key("secret"));
        assert!(redacted.events[0].headers.contains_key("keep"));
    }
}
