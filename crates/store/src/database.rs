//! PostgreSQL connection pool management.
//!
//! A single pool serves the whole process. The ingestion path, the
//! background jobs, and the out-of-scope dashboard all share it; isolation
//! is transactional, not structural.

use irm_core::{config::DatabaseConfig, error::Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

#[derive(Clone)]
pub struct DatabasePool {
    pub pool: PgPool,
}

impl DatabasePool {
    /// Establish the connection pool.
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        info!("Initializing database pool");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        info!("Database pool initialized successfully");

        Ok(Self { pool })
    }

    /// Apply pending migrations from the workspace `migrations/` directory.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| irm_core::Error::new(irm_core::ErrorCode::DatabaseMigrationError, e.to_string()))?;

        info!("Migrations completed successfully");
        Ok(())
    }
}
