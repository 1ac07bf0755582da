//! Embedded migration runner.
//!
//! Migrations live under `migrations/` in this crate and are embedded at
//! compile time, so a deployed binary never needs the `.sql` files on disk.

use diesel::pg::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub fn run_pending_migrations(conn: &mut PgConnection) -> Result<(), crate::error::PersistenceError> {
    conn.run_pending_migrations(MIGRATIONS)
        .map(|_| ())
        .map_err(|e| crate::error::PersistenceError::Unknown(format!("migration error: {e}")))
}
