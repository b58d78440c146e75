//! Durable subscription and delta-token store
//!
//! Postgres-backed implementation of `ingest_core::ports::subscription_store::SubscriptionStore`.

pub mod error;
pub mod pool;
pub mod repository;

pub use error::StoreError;
pub use pool::DatabasePool;
pub use repository::PostgresSubscriptionStore;
