//! Diesel schema for the Postgres backend. Mirrors the "Persisted layout"
//! in the design notes: a commit log keyed by `checkpoint_token` and a
//! snapshot table keyed by `(bucket_id, stream_id, stream_revision)`.
//!
//! Regenerable with `diesel print-schema` once `migrations/` has run.

diesel::table! {
    commits (checkpoint_token) {
        checkpoint_token -> BigInt,
        bucket_id -> Text,
        stream_id -> Text,
        stream_revision -> BigInt,
        commit_id -> Uuid,
        commit_sequence -> BigInt,
        commit_stamp -> Timestamptz,
        headers -> Jsonb,
        events -> Jsonb,
    }
}

diesel::table! {
    snapshots (bucket_id, stream_id, stream_revision) {
        bucket_id -> Text,
        stream_id -> Text,
        stream_revision -> BigInt,
        payload -> Jsonb,
    }
}

diesel::allow_tables_to_appear_in_same_query!(commits, snapshots,);
