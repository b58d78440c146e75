//! Store adapter errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("failed to run schema migration: {0}")]
    MigrationFailed(String),

    #[error("database query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    #[error("stored value could not be parsed: {0}")]
    MalformedRow(String),
}
