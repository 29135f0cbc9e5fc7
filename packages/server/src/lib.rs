//! Startup helpers shared by the `flock-server` and `renumber` binaries.

use anyhow::{Context, Result};
use api::db::{self, PgStore};
use api::settings::Settings;
use tracing_subscriber::EnvFilter;

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Connect to PostgreSQL, apply pending migrations and wrap the pool in a store.
pub async fn connect_store(settings: &Settings) -> Result<PgStore> {
    let pool = db::connect(&settings.database)
        .await
        .context("Failed to connect to database")?;
    db::migrate(&pool)
        .await
        .context("Failed to run migrations")?;
    Ok(PgStore::new(pool))
}
