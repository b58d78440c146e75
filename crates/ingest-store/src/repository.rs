//! Postgres implementation of `SubscriptionStore`
//!
//! ## Type Mapping
//!
//! | Domain Type              | SQL Type    | Strategy                                   |
//! |---------------------------|-------------|---------------------------------------------|
//! | TenantId, MailboxUserId   | TEXT        | `.as_str()` / `FromStr`                      |
//! | SubscriptionId            | TEXT        | `.as_str()` / `FromStr`                      |
//! | ClientState               | TEXT        | `.as_str()` / `FromStr`                      |
//! | DeltaToken                | TEXT        | `.as_str()` / `FromStr`                      |
//! | SubscriptionStatus        | TEXT        | `Display` / `FromStr`                        |
//! | DateTime<Utc>             | TIMESTAMPTZ | native sqlx mapping                          |

use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use ingest_core::domain::newtypes::{ClientState, DeltaToken, MailboxUserId, SubscriptionId, TenantId};
use ingest_core::domain::subscription::{SubscriptionRecord, SubscriptionStatus};
use ingest_core::ports::subscription_store::SubscriptionStore;
use async_trait::async_trait;

/// Postgres-backed implementation of the subscription/delta-token store port.
pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: PgRow) -> anyhow::Result<SubscriptionRecord> {
    let tenant_id: String = row.try_get("tenant_id")?;
    let user_id: String = row.try_get("user_id")?;
    let subscription_id: String = row.try_get("subscription_id")?;
    let client_state: String = row.try_get("client_state")?;
    let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
    let status: String = row.try_get("status")?;
    let last_push_observed_at: Option<DateTime<Utc>> = row.try_get("last_push_observed_at")?;

    Ok(SubscriptionRecord {
        tenant_id: TenantId::new(tenant_id)?,
        user_id: MailboxUserId::new(user_id)?,
        subscription_id: SubscriptionId::new(subscription_id)?,
        client_state: ClientState::new(client_state)?,
        expires_at,
        status: SubscriptionStatus::from_str(&status)?,
        last_push_observed_at,
    })
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn upsert(&self, record: &SubscriptionRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (tenant_id, user_id, subscription_id, client_state, expires_at, status, last_push_observed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, user_id) DO UPDATE SET
                subscription_id = EXCLUDED.subscription_id,
                client_state = EXCLUDED.client_state,
                expires_at = EXCLUDED.expires_at,
                status = EXCLUDED.status,
                last_push_observed_at = EXCLUDED.last_push_observed_at
            "#,
        )
        .bind(record.tenant_id.as_str())
        .bind(record.user_id.as_str())
        .bind(record.subscription_id.as_str())
        .bind(record.client_state.as_str())
        .bind(record.expires_at)
        .bind(record.status.to_string())
        .bind(record.last_push_observed_at)
        .execute(&self.pool)
        .await
        .context("failed to upsert subscription")?;

        Ok(())
    }

    async fn get(
        &self,
        tenant_id: &TenantId,
        user_id: &MailboxUserId,
    ) -> anyhow::Result<Option<SubscriptionRecord>> {
        let row = sqlx::query("SELECT * FROM subscriptions WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id.as_str())
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("failed to query subscription")?;

        row.map(row_to_record).transpose()
    }

    async fn get_by_subscription_id(
        &self,
        subscription_id: &SubscriptionId,
    ) -> anyhow::Result<Option<SubscriptionRecord>> {
        let row = sqlx::query("SELECT * FROM subscriptions WHERE subscription_id = $1")
            .bind(subscription_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("failed to query subscription by subscription id")?;

        row.map(row_to_record).transpose()
    }

    async fn list_by_tenant(&self, tenant_id: &TenantId) -> anyhow::Result<Vec<SubscriptionRecord>> {
        let rows = sqlx::query("SELECT * FROM subscriptions WHERE tenant_id = $1")
            .bind(tenant_id.as_str())
            .fetch_all(&self.pool)
            .await
            .context("failed to list subscriptions for tenant")?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn list_expiring_soon(
        &self,
        now: DateTime<Utc>,
        buffer: chrono::Duration,
    ) -> anyhow::Result<Vec<SubscriptionRecord>> {
        let cutoff = now + buffer;
        let rows = sqlx::query(
            "SELECT * FROM subscriptions WHERE status = 'active' AND expires_at <= $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .context("failed to list expiring subscriptions")?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn update_expiry(
        &self,
        subscription_id: &SubscriptionId,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE subscriptions SET expires_at = $1 WHERE subscription_id = $2")
            .bind(expires_at)
            .bind(subscription_id.as_str())
            .execute(&self.pool)
            .await
            .context("failed to update subscription expiry")?;

        Ok(())
    }

    async fn mark_status(
        &self,
        subscription_id: &SubscriptionId,
        status: SubscriptionStatus,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE subscriptions SET status = $1 WHERE subscription_id = $2")
            .bind(status.to_string())
            .bind(subscription_id.as_str())
            .execute(&self.pool)
            .await
            .context("failed to update subscription status")?;

        Ok(())
    }

    async fn touch_push_observed(
        &self,
        subscription_id: &SubscriptionId,
        observed_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE subscriptions SET last_push_observed_at = $1 WHERE subscription_id = $2")
            .bind(observed_at)
            .bind(subscription_id.as_str())
            .execute(&self.pool)
            .await
            .context("failed to record push observation")?;

        Ok(())
    }

    async fn save_delta_token(
        &self,
        tenant_id: &TenantId,
        user_id: &MailboxUserId,
        token: &DeltaToken,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO delta_tokens (tenant_id, user_id, delta_token, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (tenant_id, user_id) DO UPDATE SET
                delta_token = EXCLUDED.delta_token,
                updated_at = now()
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(user_id.as_str())
        .bind(token.as_str())
        .execute(&self.pool)
        .await
        .context("failed to save delta token")?;

        Ok(())
    }

    async fn get_delta_token(
        &self,
        tenant_id: &TenantId,
        user_id: &MailboxUserId,
    ) -> anyhow::Result<Option<DeltaToken>> {
        let row = sqlx::query("SELECT delta_token FROM delta_tokens WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id.as_str())
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("failed to query delta token")?;

        row.map(|r| -> anyhow::Result<DeltaToken> {
            let raw: String = r.try_get("delta_token")?;
            Ok(DeltaToken::new(raw)?)
        })
        .transpose()
    }
}
