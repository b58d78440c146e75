//! `GraphProvider` implementation wiring the client, auth, and per-operation
//! modules together.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingest_core::domain::envelope::EmailEnvelope;
use ingest_core::domain::newtypes::{ClientState, DeltaToken, MailboxUserId, SubscriptionId};
use ingest_core::domain::tenant::Tenant;
use ingest_core::ports::graph_provider::{DiscoveredUser, GraphProvider, NewSubscription};
use ingest_core::ports::graph_provider::DeltaPage;
use ingest_core::ports::transport::AuthenticatedTransport;

use crate::client::GraphClient;
use crate::rate_limit::AdaptiveRateLimiter;
use crate::{delta, messages, subscriptions, users};

/// Adapter implementing [`GraphProvider`] against the mail provider's API.
///
/// Builds a fresh [`GraphClient`] per call so that each call always carries
/// a current token from `transport`; the shared rate limiter is what
/// actually throttles request volume, not client reuse.
pub struct GraphProviderImpl {
    transport: Arc<dyn AuthenticatedTransport>,
    rate_limiter: Arc<AdaptiveRateLimiter>,
}

impl GraphProviderImpl {
    #[must_use]
    pub fn new(transport: Arc<dyn AuthenticatedTransport>) -> Self {
        Self {
            transport,
            rate_limiter: Arc::new(AdaptiveRateLimiter::with_defaults()),
        }
    }

    async fn mailbox_client(&self, tenant: &Tenant) -> Result<GraphClient> {
        let token = self.transport.mailbox_scope_token(tenant).await?;
        Ok(GraphClient::new(token).with_rate_limiter(self.rate_limiter.clone()))
    }

    async fn management_client(&self, tenant: &Tenant) -> Result<GraphClient> {
        let token = self.transport.management_scope_token(tenant).await?;
        Ok(GraphClient::new(token).with_rate_limiter(self.rate_limiter.clone()))
    }
}

#[async_trait]
impl GraphProvider for GraphProviderImpl {
    async fn list_licensed_users(&self, tenant: &Tenant) -> Result<Vec<DiscoveredUser>> {
        let client = self.management_client(tenant).await?;
        users::list_licensed_users(&client).await
    }

    async fn create_subscription(
        &self,
        tenant: &Tenant,
        user_id: &MailboxUserId,
        client_state: &ClientState,
        notification_url: &str,
        expiration: DateTime<Utc>,
    ) -> Result<NewSubscription> {
        let client = self.management_client(tenant).await?;
        subscriptions::create_subscription(&client, user_id, client_state, notification_url, expiration)
            .await
    }

    async fn renew_subscription(
        &self,
        tenant: &Tenant,
        subscription_id: &SubscriptionId,
        expiration: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let client = self.management_client(tenant).await?;
        subscriptions::renew_subscription(&client, subscription_id, expiration).await
    }

    async fn get_delta(
        &self,
        tenant: &Tenant,
        user_id: &MailboxUserId,
        token: Option<&DeltaToken>,
    ) -> Result<DeltaPage> {
        let client = self.mailbox_client(tenant).await?;
        delta::get_delta(&client, user_id, token).await
    }

    async fn get_delta_page(&self, tenant: &Tenant, page_token: &str) -> Result<DeltaPage> {
        let client = self.mailbox_client(tenant).await?;
        delta::get_delta_page(&client, page_token).await
    }

    async fn fetch_message(
        &self,
        tenant: &Tenant,
        user_id: &MailboxUserId,
        message_id: &str,
    ) -> Result<Option<EmailEnvelope>> {
        let client = self.mailbox_client(tenant).await?;
        messages::fetch_message(&client, &tenant.tenant_id, &tenant.alias, user_id, message_id).await
    }
}
