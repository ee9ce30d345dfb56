//! Persistence layer: sqlx/PostgreSQL models and repositories.
//!
//! Every durable mutation of task and notebook state goes through the
//! repositories here, so any worker process can observe progress made by
//! another.

pub mod models;
pub mod repositories;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Default maximum connections per worker process.
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Connect to the database and return a pool.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .connect(database_url)
        .await
}

/// Run pending migrations. Called by the startup winner only.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
