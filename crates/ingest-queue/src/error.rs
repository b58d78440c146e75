//! Queue adapter errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to connect to redis: {0}")]
    ConnectionFailed(#[from] redis::RedisError),

    #[error("failed to serialize envelope: {0}")]
    Serialization(#[from] serde_json::Error),
}
