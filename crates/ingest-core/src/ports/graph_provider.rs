//! The mail provider port: user discovery, subscriptions, delta sync, fetch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::envelope::EmailEnvelope;
use crate::domain::newtypes::{ClientState, DeltaToken, MailboxAddress, MailboxUserId, SubscriptionId};
use crate::domain::tenant::Tenant;

/// A mailbox user surfaced by the provider's directory listing.
#[derive(Debug, Clone)]
pub struct DiscoveredUser {
    pub user_id: MailboxUserId,
    pub address: MailboxAddress,
    pub display_name: Option<String>,
}

/// The result of registering a change-notification subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub subscription_id: SubscriptionId,
    pub expires_at: DateTime<Utc>,
}

/// Where a delta page leaves the caller: either there is more to fetch, or
/// this round is complete and `token` is the cursor to resume from next time
/// (the provider's `@odata.nextLink`/`@odata.deltaLink` split).
#[derive(Debug, Clone)]
pub enum DeltaCursor {
    /// More pages remain; `page_token` is opaque and passed to
    /// [`GraphProvider::get_delta_page`].
    NextPage(String),
    /// This round is exhausted; persist `DeltaToken` and resume from it
    /// on the next sweep.
    Complete(DeltaToken),
}

/// One changed (or deleted) message surfaced by a delta page.
#[derive(Debug, Clone)]
pub struct DeltaMessageItem {
    pub message_id: String,
    pub deleted: bool,
}

/// One page of a delta query response.
#[derive(Debug, Clone)]
pub struct DeltaPage {
    pub items: Vec<DeltaMessageItem>,
    pub cursor: DeltaCursor,
}

/// Operations against the mail provider's Graph API.
#[async_trait]
pub trait GraphProvider: Send + Sync {
    /// Lists every licensed mailbox user visible to this tenant's
    /// application credentials.
    async fn list_licensed_users(&self, tenant: &Tenant) -> anyhow::Result<Vec<DiscoveredUser>>;

    /// Registers a new change-notification subscription for a mailbox.
    async fn create_subscription(
        &self,
        tenant: &Tenant,
        user_id: &MailboxUserId,
        client_state: &ClientState,
        notification_url: &str,
        expiration: DateTime<Utc>,
    ) -> anyhow::Result<NewSubscription>;

    /// Extends an existing subscription's expiry.
    async fn renew_subscription(
        &self,
        tenant: &Tenant,
        subscription_id: &SubscriptionId,
        expiration: DateTime<Utc>,
    ) -> anyhow::Result<DateTime<Utc>>;

    /// Starts or resumes a delta query. `token` is `None` for an initial
    /// (full) sync, or the last persisted cursor for an incremental one.
    async fn get_delta(
        &self,
        tenant: &Tenant,
        user_id: &MailboxUserId,
        token: Option<&DeltaToken>,
    ) -> anyhow::Result<DeltaPage>;

    /// Fetches the next page of an in-progress delta query.
    async fn get_delta_page(&self, tenant: &Tenant, page_token: &str) -> anyhow::Result<DeltaPage>;

    /// Fetches a single message's full content for publication.
    ///
    /// Returns `Ok(None)` on HTTP 404 — the message was deleted in a race
    /// with the notification, which is treated as a normal outcome, not an
    /// error.
    async fn fetch_message(
        &self,
        tenant: &Tenant,
        user_id: &MailboxUserId,
        message_id: &str,
    ) -> anyhow::Result<Option<EmailEnvelope>>;
}
