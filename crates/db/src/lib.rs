//! Authoritative per-request lifecycle store.
//!
//! The [`StatusStore`](store::StatusStore) trait exposes the bulk state
//! transitions; [`PgStore`](pg::PgStore) is the production PostgreSQL
//! implementation, [`MemoryStore`](memory::MemoryStore) the in-process one
//! used by tests and the mock deployment profile.

use sqlx::postgres::PgPoolOptions;

use attest_core::config::DatabaseConfig;

pub mod memory;
pub mod models;
pub mod pg;
pub mod store;

pub use memory::MemoryStore;
pub use pg::PgStore;
pub use store::{StatusStore, StoreError, MAX_RETRIES_EXCEEDED};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from the database configuration.
pub async fn create_pool(cfg: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .min_connections(cfg.min_connections)
        .max_connections(cfg.max_connections)
        .idle_timeout(cfg.max_idle)
        .max_lifetime(cfg.max_lifetime)
        .connect(&cfg.url)
        .await
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
