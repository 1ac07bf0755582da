use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use eventstore_core::{Commit, CommitAttempt, EventMessage, EventStoreFacade, InMemoryPersistence, PipelineHook, StoreError, StoreResult};
use serde_json::json;
use uuid::Uuid;

/// Vetoes any attempt carrying an event tagged `"skip": true`.
#[derive(Debug)]
struct SkipTaggedHook;

impl PipelineHook for SkipTaggedHook {
    fn pre_commit(&self, attempt: &CommitAttempt) -> StoreResult<bool> {
        let should_skip = attempt.events.iter().any(|e| e.body.get("skip").and_then(|v| v.as_bool()).unwrap_or(false));
        Ok(!should_skip)
    }
}

#[derive(Debug)]
struct OrderRecordingHook {
    name: &'static str,
    order: &'static Mutex<Vec<&'static str>>,
}

impl PipelineHook for OrderRecordingHook {
    fn post_commit(&self, _commit: &Commit) -> StoreResult<()> {
        self.order.lock().unwrap().push(self.name);
        Ok(())
    }
}

#[test]
fn veto_blocks_the_commit_and_no_post_commit_runs() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct RecordingHook;
    impl PipelineHook for RecordingHook {
        fn post_commit(&self, _commit: &Commit) -> StoreResult<()> {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let facade = EventStoreFacade::builder(InMemoryPersistence::new()).register_hook(Box::new(SkipTaggedHook))
                                                                      .register_hook(Box::new(RecordingHook))
                                                                      .build();

    let mut stream = facade.create_stream("b", "s");
    stream.add(EventMessage::new(json!({"skip": true}))).unwrap();

    let result = stream.commit_changes(&facade, Uuid::new_v4()).unwrap();
    assert!(result.is_none(), "vetoed commit returns None");
    assert!(facade.get_from("b", "s", 1, 0).unwrap().is_empty(), "persistence untouched");
    assert_eq!(CALLS.load(Ordering::SeqCst), 0);
}

#[test]
fn non_tagged_events_commit_normally() {
    let facade = EventStoreFacade::builder(InMemoryPersistence::new()).register_hook(Box::new(SkipTaggedHook))
                                                                      .build();
    let mut stream = facade.create_stream("b", "s");
    stream.add(EventMessage::new(json!({"skip": false}))).unwrap();
    let result = stream.commit_changes(&facade, Uuid::new_v4()).unwrap();
    assert!(result.is_some());
}

#[test]
fn post_commit_hooks_run_once_in_registration_order() {
    static ORDER: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

    let facade = EventStoreFacade::builder(InMemoryPersistence::new())
        .register_hook(Box::new(OrderRecordingHook { name: "first", order: &ORDER }))
        .register_hook(Box::new(OrderRecordingHook { name: "second", order: &ORDER }))
        .build();

    let mut stream = facade.create_stream("b", "s");
    stream.add(EventMessage::new(json!({"v": 1}))).unwrap();
    stream.commit_changes(&facade, Uuid::new_v4()).unwrap();

    assert_eq!(*ORDER.lock().unwrap(), vec!["first", "second"]);
}

#[test]
fn optimistic_concurrency_hook_rejects_stale_sequence() {
    use eventstore_core::OptimisticConcurrencyHook;

    let facade = EventStoreFacade::builder(InMemoryPersistence::new()).register_hook(Box::new(OptimisticConcurrencyHook::new()))
                                                                      .build();

    let mut a = facade.create_stream("b", "s");
    let mut b = facade.create_stream("b", "s");

    a.add(EventMessage::new(json!({"v": "a"}))).unwrap();
    a.commit_changes(&facade, Uuid::new_v4()).unwrap();

    b.add(EventMessage::new(json!({"v": "b"}))).unwrap();
    let err = b.commit_changes(&facade, Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, StoreError::ConcurrencyConflict { .. }));
}
