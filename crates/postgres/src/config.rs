//! Connection configuration loaded from the environment.
//!
//! Follows the `DATABASE_URL` convention plus optional pool sizing knobs.

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

/// Loads `.env` exactly once per process, ignoring a missing file.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    /// Reads `DATABASE_URL` (required), `DATABASE_MIN_CONNECTIONS` and
    /// `DATABASE_MAX_CONNECTIONS` (both optional, default 2/16).
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL").expect("DATABASE_URL is not set");
        let min_connections = env::var("DATABASE_MIN_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(2);
        let max_connections = env::var("DATABASE_MAX_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(16);
        Self { url, min_connections, max_connections }
    }
}

/// Forces early `.env` loading for callers that want it before `from_env`.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
