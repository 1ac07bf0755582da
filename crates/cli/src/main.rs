//! eventstore-cli: a small demo binary exercising `eventstore-core`.
//!
//! Opens a stream, commits a couple of events, re-opens it and replays the
//! committed history. Talks to `InMemoryPersistence` by default; pass
//! `--pg` to run the same script against Postgres (`DATABASE_URL` must be
//! set).

use std::env;

use eventstore_core::{EventMessage, EventStoreFacade, InMemoryPersistence};
use eventstore_hooks::LoggingHook;
use eventstore_postgres::pg::{build_dev_pool_from_env, PgPersistence};
use eventstore_postgres::PoolProvider;
use uuid::Uuid;

fn run<P: eventstore_core::Persistence>(facade: EventStoreFacade<P>) {
    let mut stream = facade.create_stream("demo", "greeting");
    stream.add(EventMessage::new(serde_json::json!({"message": "hello"}))).expect("add event");
    stream.add(EventMessage::new(serde_json::json!({"message": "world"}))).expect("add event");

    match stream.commit_changes(&facade, Uuid::new_v4()) {
        Ok(Some(commit)) => {
            println!("committed stream_revision={} checkpoint={}", commit.stream_revision, commit.checkpoint_token);
        }
        Ok(None) => println!("commit was vetoed or already applied"),
        Err(e) => {
            eprintln!("commit failed: {e}");
            return;
        }
    }

    let replayed = facade.open_stream("demo", "greeting", 1, 0).expect("open stream");
    println!("replayed {} events at revision {}", replayed.committed_events().len(), replayed.stream_revision());
    for event in replayed.committed_events() {
        println!("  - {}", event.body);
    }
}

fn main() {
    env_logger::init();

    if env::args().any(|a| a == "--pg") {
        let pool = build_dev_pool_from_env().expect("build postgres pool (is DATABASE_URL set?)");
        let facade = EventStoreFacade::builder(PgPersistence::new(PoolProvider { pool })).register_hook(Box::new(LoggingHook))
                                                                                        .build();
        run(facade);
    } else {
        let facade = EventStoreFacade::builder(InMemoryPersistence::new()).register_hook(Box::new(LoggingHook)).build();
        run(facade);
    }
}
