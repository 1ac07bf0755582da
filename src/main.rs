//! Top-level demo: build a facade, commit a few events across streams,
//! replay one of them, and verify the invariants the rest of the workspace
//! is tested against (gap-free commit sequences, monotonic checkpoints).
//!
//! Run with `--features pg_demo` to exercise the Postgres backend instead
//! of the in-memory one (requires `DATABASE_URL`).

use eventstore_core::{EventMessage, EventStoreFacade, Persistence};
use eventstore_hooks::{LoggingHook, MaxEventsPerCommitPolicy, PolicyHook};
use uuid::Uuid;

fn drive<P: Persistence>(facade: EventStoreFacade<P>) {
    let mut orders = facade.create_stream("demo", "order-1");
    orders.add(EventMessage::new(serde_json::json!({"type": "OrderPlaced", "total_cents": 4200}))).expect("add event");
    orders.commit_changes(&facade, Uuid::new_v4()).expect("first commit");

    orders.add(EventMessage::new(serde_json::json!({"type": "OrderShipped"}))).expect("add event");
    let second = orders.commit_changes(&facade, Uuid::new_v4()).expect("second commit");

    let mut receipts = facade.create_stream("demo", "order-1-receipts");
    receipts.add(EventMessage::new(serde_json::json!({"type": "ReceiptIssued"}))).expect("add event");
    receipts.commit_changes(&facade, Uuid::new_v4()).expect("receipt commit");

    let replayed = facade.open_stream("demo", "order-1", 1, 0).expect("open stream");
    assert_eq!(replayed.committed_events().len(), 2, "both order events replay in order");
    assert_eq!(replayed.commit_sequence(), 2, "commit sequence has no gaps");

    let commits = facade.get_from_checkpoint("demo", 0).expect("checkpoint read");
    assert!(commits.windows(2).all(|w| w[0].checkpoint_token < w[1].checkpoint_token), "checkpoints strictly ordered");

    println!("order-1 at revision {} ({} committed events)", replayed.stream_revision(), replayed.committed_events().len());
    if let Some(commit) = second {
        println!("last commit checkpoint = {}", commit.checkpoint_token);
    }
}

#[cfg(feature = "pg_demo")]
fn main() {
    env_logger::init();
    let pool = eventstore_postgres::pg::build_dev_pool_from_env().expect("build postgres pool (is DATABASE_URL set?)");
    let persistence = eventstore_postgres::pg::PgPersistence::new(eventstore_postgres::PoolProvider { pool });
    let facade = EventStoreFacade::builder(persistence).register_hook(Box::new(LoggingHook))
                                                        .register_hook(Box::new(PolicyHook::new(MaxEventsPerCommitPolicy::new(100))))
                                                        .build();
    drive(facade);
}

#[cfg(not(feature = "pg_demo"))]
fn main() {
    env_logger::init();
    let facade = EventStoreFacade::builder(eventstore_core::InMemoryPersistence::new())
        .register_hook(Box::new(LoggingHook))
        .register_hook(Box::new(PolicyHook::new(MaxEventsPerCommitPolicy::new(100))))
        .build();
    drive(facade);
}
