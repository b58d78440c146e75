//! Database connection pool management

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::StoreError;

/// Manages a pool of Postgres connections for the subscription store.
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Connects to `database_url` and runs schema migrations.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Self::run_migrations(&pool).await?;

        tracing::info!("database pool initialized");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
        let migration_sql = include_str!("migrations/0001_initial.sql");
        sqlx::raw_sql(migration_sql)
            .execute(pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

        tracing::debug!("database migrations completed");
        Ok(())
    }
}
