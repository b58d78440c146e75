//! The durable subscription and delta-token store port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::newtypes::{DeltaToken, MailboxUserId, SubscriptionId, TenantId};
use crate::domain::subscription::{SubscriptionRecord, SubscriptionStatus};

/// Durable persistence for subscription records and delta tokens.
///
/// One trait covering both concerns because both are small, related pieces
/// of per-mailbox state that a single adapter (the Postgres-backed store)
/// owns together.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Inserts a new subscription or replaces the existing one for
    /// `(tenant_id, user_id)`.
    async fn upsert(&self, record: &SubscriptionRecord) -> anyhow::Result<()>;

    /// Looks up the subscription for a given mailbox, if one exists.
    async fn get(
        &self,
        tenant_id: &TenantId,
        user_id: &MailboxUserId,
    ) -> anyhow::Result<Option<SubscriptionRecord>>;

    /// Looks up a subscription by its provider-assigned id — used when a
    /// notification arrives and must be matched back to a mailbox.
    async fn get_by_subscription_id(
        &self,
        subscription_id: &SubscriptionId,
    ) -> anyhow::Result<Option<SubscriptionRecord>>;

    /// Lists every subscription known for a tenant, for the renewal sweep.
    async fn list_by_tenant(&self, tenant_id: &TenantId) -> anyhow::Result<Vec<SubscriptionRecord>>;

    /// Lists active subscriptions whose expiry falls within `buffer` of `now`.
    async fn list_expiring_soon(
        &self,
        now: DateTime<Utc>,
        buffer: chrono::Duration,
    ) -> anyhow::Result<Vec<SubscriptionRecord>>;

    /// Updates a subscription's expiry after a successful renewal.
    async fn update_expiry(
        &self,
        subscription_id: &SubscriptionId,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Transitions a subscription's lifecycle status.
    async fn mark_status(
        &self,
        subscription_id: &SubscriptionId,
        status: SubscriptionStatus,
    ) -> anyhow::Result<()>;

    /// Records that a push notification was just observed for this
    /// subscription, used to detect mailboxes that have gone quiet.
    async fn touch_push_observed(
        &self,
        subscription_id: &SubscriptionId,
        observed_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Persists the latest delta cursor for a mailbox.
    async fn save_delta_token(
        &self,
        tenant_id: &TenantId,
        user_id: &MailboxUserId,
        token: &DeltaToken,
    ) -> anyhow::Result<()>;

    /// Reads the last persisted delta cursor for a mailbox, if any.
    async fn get_delta_token(
        &self,
        tenant_id: &TenantId,
        user_id: &MailboxUserId,
    ) -> anyhow::Result<Option<DeltaToken>>;
}
