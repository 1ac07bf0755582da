//! eventstore-postgres: Diesel/Postgres-backed `Persistence`.
//!
//! Provides a durable implementation of `eventstore_core::Persistence` with
//! the same ordering and idempotency guarantees as `InMemoryPersistence`,
//! plus connection pooling, embedded migrations, and retry-on-transient-
//! failure around every query.
//!
//! Modules:
//! - `pg`: the `PgPersistence` implementation, connection pooling.
//! - `migrations`: embedded Diesel migration runner.
//! - `config`: `.env`-driven connection configuration.
//! - `schema`: Diesel table declarations.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgPersistence, PgPool, PoolProvider};
