use eventstore_core::{EventMessage, EventStoreFacade, InMemoryPersistence, StoreError};
use serde_json::json;
use uuid::Uuid;

fn facade() -> EventStoreFacade<InMemoryPersistence> {
    EventStoreFacade::new(InMemoryPersistence::new())
}

#[test]
fn fresh_stream_single_commit() {
    let facade = facade();
    let mut stream = facade.create_stream("b1", "s1");

    stream.add(EventMessage::new(json!({"n": 1}))).unwrap();
    stream.add(EventMessage::new(json!({"n": 2}))).unwrap();

    let commit = stream.commit_changes(&facade, Uuid::new_v4()).unwrap().expect("commit should be durable");
    assert_eq!(commit.stream_revision, 2);
    assert_eq!(commit.commit_sequence, 1);
    assert_eq!(stream.stream_revision(), 2);
    assert_eq!(stream.committed_events().len(), 2);
    assert!(stream.uncommitted_events().is_empty());
}

#[test]
fn rejects_null_event_body() {
    let facade = facade();
    let mut stream = facade.create_stream("b1", "s1");
    let err = stream.add(EventMessage::new(serde_json::Value::Null)).unwrap_err();
    assert!(matches!(err, StoreError::InvalidAttempt(_)));
}

#[test]
fn optimistic_conflict_refreshes_history_and_preserves_buffer() {
    let facade = facade();

    // Both writers open the stream at revision 0.
    let mut writer_a = facade.create_stream("b", "s");
    let mut writer_b = facade.create_stream("b", "s");

    writer_a.add(EventMessage::new(json!({"v": "a"}))).unwrap();
    writer_a.commit_changes(&facade, Uuid::new_v4()).unwrap();

    // B is unaware of A's commit and attempts to commit against revision 0.
    writer_b.add(EventMessage::new(json!({"v": "b"}))).unwrap();
    let err = writer_b.commit_changes(&facade, Uuid::new_v4()).unwrap_err();

    assert!(matches!(err, StoreError::ConcurrencyConflict { .. }));
    assert_eq!(writer_b.stream_revision(), 1, "refreshed to the durable head written by A");
    assert_eq!(writer_b.uncommitted_events().len(), 1, "B's uncommitted event survives the conflict");
}

#[test]
fn idempotent_retry_is_a_single_durable_commit() {
    let facade = facade();
    let mut stream = facade.create_stream("b", "s");
    stream.add(EventMessage::new(json!({"v": 1}))).unwrap();

    let commit_id = Uuid::new_v4();
    let first = stream.commit_changes(&facade, commit_id).unwrap();
    assert!(first.is_some());

    // Retry with the same commit_id and no new events: already incorporated.
    let second = stream.commit_changes(&facade, commit_id).unwrap();
    assert!(second.is_none());
    assert!(stream.uncommitted_events().is_empty());

    let commits = facade.get_from("b", "s", 1, 0).unwrap();
    assert_eq!(commits.len(), 1);
}

#[test]
fn duplicate_commit_from_a_fresh_stream_instance_is_swallowed() {
    let facade = facade();
    let mut first_handle = facade.create_stream("b", "s");
    let commit_id = Uuid::new_v4();
    first_handle.add(EventMessage::new(json!({"v": 1}))).unwrap();
    first_handle.commit_changes(&facade, commit_id).unwrap();

    // A second stream object (e.g. a retried request) doesn't know the id
    // was already incorporated locally, but persistence does.
    let mut retry_handle = eventstore_core::OptimisticEventStream::new_fresh("b".into(), "s".into());
    retry_handle.add(EventMessage::new(json!({"v": 1}))).unwrap();
    let result = retry_handle.commit_changes(&facade, commit_id).unwrap();
    assert!(result.is_none());
    assert!(retry_handle.uncommitted_events().is_empty());
}

#[test]
fn snapshot_based_open_loads_only_newer_commits() {
    let facade = facade();
    let mut stream = facade.create_stream("b", "s");
    for i in 0..100u32 {
        stream.add(EventMessage::new(json!({"i": i}))).unwrap();
        stream.commit_changes(&facade, Uuid::new_v4()).unwrap();
    }
    assert_eq!(stream.stream_revision(), 100);

    let snapshot = eventstore_core::Snapshot { bucket_id: "b".into(),
                                               stream_id: "s".into(),
                                               stream_revision: 80,
                                               payload: json!({"folded": "state"}) };
    facade.add_snapshot(snapshot.clone()).unwrap();

    let resumed = facade.open_stream_from_snapshot(snapshot, 0).unwrap();
    assert_eq!(resumed.committed_events().len(), 20);
    assert_eq!(resumed.stream_revision(), 100);
}

#[test]
fn checkpoint_iteration_is_total_order_across_streams() {
    let facade = facade();
    let mut s1 = facade.create_stream("b", "s1");
    let mut s2 = facade.create_stream("b", "s2");
    let mut s3 = facade.create_stream("b", "s3");

    s1.add(EventMessage::new(json!({"v": 1}))).unwrap();
    s1.commit_changes(&facade, Uuid::new_v4()).unwrap();

    s2.add(EventMessage::new(json!({"v": 1}))).unwrap();
    s2.commit_changes(&facade, Uuid::new_v4()).unwrap();

    s1.add(EventMessage::new(json!({"v": 2}))).unwrap();
    s1.commit_changes(&facade, Uuid::new_v4()).unwrap();

    s3.add(EventMessage::new(json!({"v": 1}))).unwrap();
    s3.commit_changes(&facade, Uuid::new_v4()).unwrap();

    let commits = facade.get_from_checkpoint("b", 0).unwrap();
    assert_eq!(commits.len(), 4);
    let stream_order: Vec<&str> = commits.iter().map(|c| c.stream_id.as_str()).collect();
    assert_eq!(stream_order, vec!["s1", "s2", "s1", "s3"]);
    assert!(commits.windows(2).all(|w| w[0].checkpoint_token < w[1].checkpoint_token));
}
