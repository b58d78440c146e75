//! The downstream publisher port.

use async_trait::async_trait;

use crate::domain::envelope::EmailEnvelope;

/// Hands a fetched message off to the downstream queue.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, envelope: &EmailEnvelope) -> anyhow::Result<()>;
}
