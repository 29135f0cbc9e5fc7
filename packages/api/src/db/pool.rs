//! Database connection pool and migrations.

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::settings::Database;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open a connection pool for the configured database.
pub async fn connect(settings: &Database) -> Result<PgPool, sqlx::Error> {
    tracing::info!("Connecting to database (pool size {})", settings.pool);
    PgPoolOptions::new()
        .max_connections(settings.pool)
        .connect(&settings.url())
        .await
}

/// Apply pending migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}
