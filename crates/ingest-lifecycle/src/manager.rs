//! Subscription Lifecycle Manager

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ingest_core::config::LifecycleConfig;
use ingest_core::domain::newtypes::{ClientState, MailboxUserId, SubscriptionId, TenantAlias};
use ingest_core::domain::subscription::{SubscriptionRecord, SubscriptionStatus};
use ingest_core::domain::tenant::Tenant;
use ingest_core::ports::{GraphProvider, LifecycleEventSink, SubscriptionStore};

use crate::discovery::discover_mailboxes;

/// Upper bound the provider enforces on a subscription's lifetime, roughly
/// three days.
pub const MAX_SUBSCRIPTION_LIFETIME_HOURS: i64 = 72;

type GapFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Called after a subscription is (re)created, to trigger a gap-recovery
/// delta sync for the mailbox — a one-way callback rather than a trait
/// object held bidirectionally, so the Synchroniser and the Lifecycle
/// Manager don't need to depend on each other.
pub type GapCallback = Arc<dyn Fn(TenantAlias, MailboxUserId) -> GapFuture + Send + Sync>;

/// Keeps every tracked mailbox covered by a valid, not-near-expiry
/// subscription, and reacts to provider lifecycle signals.
pub struct LifecycleManager {
    tenants: Vec<Tenant>,
    store: Arc<dyn SubscriptionStore>,
    provider: Arc<dyn GraphProvider>,
    config: LifecycleConfig,
    webhook_base_url: String,
    on_gap: GapCallback,
    shutdown: CancellationToken,
    renewal_handle: Mutex<Option<JoinHandle<()>>>,
}

impl LifecycleManager {
    #[must_use]
    pub fn new(
        tenants: Vec<Tenant>,
        store: Arc<dyn SubscriptionStore>,
        provider: Arc<dyn GraphProvider>,
        config: LifecycleConfig,
        webhook_base_url: String,
        on_gap: GapCallback,
    ) -> Self {
        Self {
            tenants,
            store,
            provider,
            config,
            webhook_base_url,
            on_gap,
            shutdown: CancellationToken::new(),
            renewal_handle: Mutex::new(None),
        }
    }

    /// Runs initial discovery and subscription coverage for every tenant,
    /// then starts the renewal loop. Per-user failures are logged and do
    /// not abort startup.
    pub async fn start(self: &Arc<Self>) {
        for tenant in &self.tenants {
            let mailboxes = match discover_mailboxes(tenant, self.provider.as_ref()).await {
                Ok(m) => m,
                Err(e) => {
                    error!(tenant = %tenant.alias, error = %e, "user discovery failed, skipping tenant at startup");
                    continue;
                }
            };

            for mailbox in mailboxes {
                if let Err(e) = self.ensure_subscription(tenant, &mailbox.user_id).await {
                    warn!(
                        tenant = %tenant.alias,
                        user = mailbox.user_id.as_str(),
                        error = %e,
                        "failed to ensure subscription at startup"
                    );
                }
            }
        }

        let renewal_period = (self.config.renewal_buffer / 2).max(StdDuration::from_secs(60));
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.renewal_loop(renewal_period).await });
        *self.renewal_handle.lock().await = Some(handle);
    }

    /// Cancels the renewal loop and waits for it to finish.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.renewal_handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    async fn renewal_loop(&self, period: StdDuration) {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.renewal_tick().await,
                () = self.shutdown.cancelled() => {
                    info!("lifecycle renewal loop shutting down");
                    break;
                }
            }
        }
    }

    async fn renewal_tick(&self) {
        let buffer = chrono::Duration::from_std(self.config.renewal_buffer).unwrap_or(chrono::Duration::zero());
        for tenant in &self.tenants {
            let expiring = match self.store.list_expiring_soon(Utc::now(), buffer).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(tenant = %tenant.alias, error = %e, "failed to list expiring subscriptions");
                    continue;
                }
            };

            for record in expiring.into_iter().filter(|r| r.tenant_id == tenant.tenant_id) {
                if let Err(e) = self.renew_subscription(tenant, &record).await {
                    warn!(
                        tenant = %tenant.alias,
                        subscription_id = %record.subscription_id,
                        error = %e,
                        "renewal failed, will retry next tick"
                    );
                }
            }
        }
    }

    /// Ensures `user_id` has coverage: no-op if healthy, renew if near
    /// expiry, create if absent or already expired/removed.
    pub async fn ensure_subscription(&self, tenant: &Tenant, user_id: &MailboxUserId) -> anyhow::Result<()> {
        let buffer = chrono::Duration::from_std(self.config.renewal_buffer).unwrap_or(chrono::Duration::zero());
        let existing = self.store.get(&tenant.tenant_id, user_id).await?;

        match existing {
            Some(record) if record.status == SubscriptionStatus::Active && !record.needs_renewal(Utc::now(), buffer) => {
                Ok(())
            }
            Some(record) if record.status == SubscriptionStatus::Active => self.renew_subscription(tenant, &record).await,
            _ => self.create_subscription(tenant, user_id).await,
        }
    }

    async fn create_subscription(&self, tenant: &Tenant, user_id: &MailboxUserId) -> anyhow::Result<()> {
        let client_state = ClientState::generate();
        let expiration = Utc::now() + chrono::Duration::hours(MAX_SUBSCRIPTION_LIFETIME_HOURS.min(self.config.subscription_ttl_hours));
        let notification_url = format!(
            "{}/webhook/{}/{}",
            self.webhook_base_url,
            tenant.alias.as_str(),
            user_id.as_str()
        );

        let created = self
            .provider
            .create_subscription(tenant, user_id, &client_state, &notification_url, expiration)
            .await?;

        let record = SubscriptionRecord::new(
            tenant.tenant_id.clone(),
            user_id.clone(),
            created.subscription_id,
            client_state,
            created.expires_at,
        );
        self.store.upsert(&record).await?;

        info!(tenant = %tenant.alias, user = user_id.as_str(), "subscription created");
        self.trigger_gap_sync(tenant, user_id);
        Ok(())
    }

    async fn renew_subscription(&self, tenant: &Tenant, record: &SubscriptionRecord) -> anyhow::Result<()> {
        let expiration = Utc::now() + chrono::Duration::hours(MAX_SUBSCRIPTION_LIFETIME_HOURS.min(self.config.subscription_ttl_hours));

        match self.provider.renew_subscription(tenant, &record.subscription_id, expiration).await {
            Ok(new_expiry) => {
                self.store.update_expiry(&record.subscription_id, new_expiry).await?;
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                warn!(
                    subscription_id = %record.subscription_id,
                    "subscription gone from provider, marking removed and recreating"
                );
                self.store.mark_status(&record.subscription_id, SubscriptionStatus::Removed).await?;
                self.create_subscription(tenant, &record.user_id).await
            }
            Err(e) => Err(e),
        }
    }

    fn trigger_gap_sync(&self, tenant: &Tenant, user_id: &MailboxUserId) {
        let fut = (self.on_gap)(tenant.alias.clone(), user_id.clone());
        tokio::spawn(fut);
    }
}

/// Best-effort classification of a "not found" provider error. The Graph
/// adapter surfaces these as plain `anyhow::Error` (see `ingest-graph`'s
/// `GraphError::NotFound`), so this matches on its rendered message rather
/// than downcasting to a concrete type the port doesn't expose.
fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.to_string().contains("404") || cause.to_string().to_lowercase().contains("not found"))
}

#[async_trait::async_trait]
impl LifecycleEventSink for LifecycleManager {
    async fn subscription_removed(&self, subscription_id: &SubscriptionId) {
        if let Err(e) = self.store.mark_status(subscription_id, SubscriptionStatus::Removed).await {
            warn!(subscription_id = %subscription_id, error = %e, "failed to mark subscription removed");
        }
    }

    async fn reauthorization_required(&self, subscription_id: &SubscriptionId) {
        let record = match self.store.get_by_subscription_id(subscription_id).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                warn!(subscription_id = %subscription_id, "reauthorization event for unknown subscription");
                return;
            }
            Err(e) => {
                warn!(subscription_id = %subscription_id, error = %e, "failed to look up subscription for reauthorization");
                return;
            }
        };
        let Some(tenant) = self.tenants.iter().find(|t| t.tenant_id == record.tenant_id) else {
            warn!(subscription_id = %subscription_id, "reauthorization event for unknown tenant");
            return;
        };
        if let Err(e) = self.renew_subscription(tenant, &record).await {
            warn!(subscription_id = %subscription_id, error = %e, "immediate renewal after reauthorization event failed");
        }
    }

    async fn missed(&self, subscription_id: &SubscriptionId) {
        let record = match self.store.get_by_subscription_id(subscription_id).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                warn!(subscription_id = %subscription_id, "missed event for unknown subscription");
                return;
            }
            Err(e) => {
                warn!(subscription_id = %subscription_id, error = %e, "failed to look up subscription for missed event");
                return;
            }
        };
        let Some(tenant) = self.tenants.iter().find(|t| t.tenant_id == record.tenant_id) else {
            warn!(subscription_id = %subscription_id, "missed event for unknown tenant");
            return;
        };
        self.trigger_gap_sync(tenant, &record.user_id);
    }
}
