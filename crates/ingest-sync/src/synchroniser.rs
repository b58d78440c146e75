//! Delta Synchroniser
//!
//! Runs the periodic delta-query sweep and also services one-off
//! gap-recovery requests raised by the Subscription Lifecycle Manager after
//! a subscription is created or recreated. Both paths go through the same
//! [`DeltaSynchroniser::sync_mailbox`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ingest_core::config::SyncConfig;
use ingest_core::domain::newtypes::{DeltaToken, Fingerprint, MailboxUserId, TenantAlias};
use ingest_core::domain::subscription::SubscriptionStatus;
use ingest_core::domain::tenant::Tenant;
use ingest_core::ports::graph_provider::DeltaCursor;
use ingest_core::ports::{DedupFilter, GraphProvider, Publisher, SubscriptionStore};

use crate::cache::DeltaTokenCache;

pub struct DeltaSynchroniser {
    tenants: HashMap<TenantAlias, Tenant>,
    store: Arc<dyn SubscriptionStore>,
    provider: Arc<dyn GraphProvider>,
    dedup: Arc<dyn DedupFilter>,
    publisher: Arc<dyn Publisher>,
    cache: DeltaTokenCache,
    config: SyncConfig,
}

impl DeltaSynchroniser {
    #[must_use]
    pub fn new(
        tenants: HashMap<TenantAlias, Tenant>,
        store: Arc<dyn SubscriptionStore>,
        provider: Arc<dyn GraphProvider>,
        dedup: Arc<dyn DedupFilter>,
        publisher: Arc<dyn Publisher>,
        config: SyncConfig,
    ) -> Self {
        Self {
            tenants,
            store,
            provider,
            dedup,
            publisher,
            cache: DeltaTokenCache::new(),
            config,
        }
    }

    /// Runs the periodic sweep until `shutdown` is cancelled. Every tick,
    /// every active subscription across every tenant gets a delta round;
    /// a failure on one mailbox is logged and does not stop the sweep.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep_once().await,
                () = shutdown.cancelled() => {
                    info!("delta sync sweep shutting down");
                    break;
                }
            }
        }
    }

    async fn sweep_once(&self) {
        for tenant in self.tenants.values() {
            let records = match self.store.list_by_tenant(&tenant.tenant_id).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(tenant = %tenant.alias, error = %e, "failed to list subscriptions for sweep");
                    continue;
                }
            };

            for record in records.into_iter().filter(|r| r.status == SubscriptionStatus::Active) {
                if let Err(e) = self.sync_mailbox(&tenant.alias, &record.user_id).await {
                    warn!(
                        tenant = %tenant.alias,
                        user = record.user_id.as_str(),
                        error = %e,
                        "delta sync failed for mailbox"
                    );
                }
            }
        }
    }

    /// Runs one full delta round for a single mailbox: resolves the saved
    /// cursor (if any), follows pages via [`GraphProvider::get_delta`],
    /// dedups and publishes every changed message, then persists the new
    /// cursor. Recovers from an expired cursor (HTTP 410) by discarding it
    /// and falling through to a fresh initial sync.
    ///
    /// An initial sync — no saved cursor, whether at cold start or after
    /// discarding an expired one — only anchors the delta cursor; messages
    /// encountered while paging to that anchor are not published. Only
    /// incremental rounds (a saved cursor was present) publish.
    pub async fn sync_mailbox(&self, alias: &TenantAlias, user_id: &MailboxUserId) -> anyhow::Result<()> {
        let tenant = self
            .tenants
            .get(alias)
            .ok_or_else(|| anyhow::anyhow!("unknown tenant alias: {alias}"))?;

        let token = self.resolve_token(tenant, alias, user_id).await?;
        let mut is_initial_sync = token.is_none();

        let page = match self.provider.get_delta(tenant, user_id, token.as_ref()).await {
            Ok(page) => page,
            Err(e) if token.is_some() && is_gone(&e) => {
                warn!(
                    tenant = %alias,
                    user = user_id.as_str(),
                    "delta token expired, discarding and restarting with a full sync"
                );
                self.cache.clear(alias, user_id);
                is_initial_sync = true;
                self.provider.get_delta(tenant, user_id, None).await?
            }
            Err(e) => return Err(e),
        };

        if is_initial_sync {
            debug!(
                tenant = %alias,
                user = user_id.as_str(),
                items = page.items.len(),
                "initial sync: anchoring delta cursor without publishing"
            );
        } else {
            for item in &page.items {
                if item.deleted {
                    debug!(message_id = %item.message_id, "delta item is a deletion, skipping publish");
                    continue;
                }
                self.fetch_and_publish(tenant, user_id, &item.message_id).await;
            }
        }

        if let DeltaCursor::Complete(new_token) = page.cursor {
            self.store.save_delta_token(&tenant.tenant_id, user_id, &new_token).await?;
            self.cache.set(alias, user_id, new_token);
        }

        Ok(())
    }

    async fn resolve_token(&self, tenant: &Tenant, alias: &TenantAlias, user_id: &MailboxUserId) -> anyhow::Result<Option<DeltaToken>> {
        if let Some(token) = self.cache.get(alias, user_id) {
            return Ok(Some(token));
        }
        let token = self.store.get_delta_token(&tenant.tenant_id, user_id).await?;
        if let Some(token) = &token {
            self.cache.set(alias, user_id, token.clone());
        }
        Ok(token)
    }

    async fn fetch_and_publish(&self, tenant: &Tenant, user_id: &MailboxUserId, message_id: &str) {
        let fingerprint = match Fingerprint::delta(message_id) {
            Ok(f) => f,
            Err(e) => {
                warn!(message_id, error = %e, "failed to build dedup fingerprint");
                return;
            }
        };

        match self.dedup.is_new(&fingerprint).await {
            Ok(false) => {
                debug!(message_id, "already published via another path, skipping");
                return;
            }
            Ok(true) => {}
            Err(e) => warn!(message_id, error = %e, "dedup store unreachable, proceeding (may duplicate)"),
        }

        let envelope = match self.provider.fetch_message(tenant, user_id, message_id).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                debug!(message_id, "message no longer exists, dropping");
                return;
            }
            Err(e) => {
                warn!(message_id, error = %e, "failed to fetch message");
                return;
            }
        };

        if let Err(e) = self.publisher.publish(&envelope).await {
            warn!(message_id, error = %e, "failed to publish envelope, dropping");
        }
    }
}

/// Best-effort classification of an expired-delta-token error. The Graph
/// adapter's delta module surfaces 410 as a plain `anyhow::Error` (see
/// `ingest-graph`'s `delta::get_delta`), so this matches on its rendered
/// message rather than downcasting to a concrete type the port doesn't
/// expose.
fn is_gone(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.to_string().contains("410") || cause.to_string().to_lowercase().contains("gone"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::{DateTime, Utc};
    use ingest_core::domain::envelope::{Body, EmailEnvelope, Participant};
    use ingest_core::domain::newtypes::{ClientState, SubscriptionId, TenantId};
    use ingest_core::ports::graph_provider::{DeltaMessageItem, DeltaPage, DiscoveredUser};
    use ingest_core::ports::NewSubscription;

    #[derive(Default)]
    struct FakeStore {
        tokens: Mutex<HashMap<(String, String), DeltaToken>>,
        saved_token_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SubscriptionStore for FakeStore {
        async fn upsert(&self, _record: &ingest_core::domain::subscription::SubscriptionRecord) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get(&self, _tenant_id: &TenantId, _user_id: &MailboxUserId) -> anyhow::Result<Option<ingest_core::domain::subscription::SubscriptionRecord>> {
            Ok(None)
        }
        async fn get_by_subscription_id(&self, _subscription_id: &SubscriptionId) -> anyhow::Result<Option<ingest_core::domain::subscription::SubscriptionRecord>> {
            Ok(None)
        }
        async fn list_by_tenant(&self, _tenant_id: &TenantId) -> anyhow::Result<Vec<ingest_core::domain::subscription::SubscriptionRecord>> {
            Ok(vec![])
        }
        async fn list_expiring_soon(&self, _now: DateTime<Utc>, _buffer: chrono::Duration) -> anyhow::Result<Vec<ingest_core::domain::subscription::SubscriptionRecord>> {
            Ok(vec![])
        }
        async fn update_expiry(&self, _subscription_id: &SubscriptionId, _expires_at: DateTime<Utc>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn mark_status(&self, _subscription_id: &SubscriptionId, _status: SubscriptionStatus) -> anyhow::Result<()> {
            Ok(())
        }
        async fn touch_push_observed(&self, _subscription_id: &SubscriptionId, _observed_at: DateTime<Utc>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn save_delta_token(&self, tenant_id: &TenantId, user_id: &MailboxUserId, token: &DeltaToken) -> anyhow::Result<()> {
            self.saved_token_calls.fetch_add(1, Ordering::SeqCst);
            self.tokens
                .lock()
                .unwrap()
                .insert((tenant_id.as_str().to_string(), user_id.as_str().to_string()), token.clone());
            Ok(())
        }
        async fn get_delta_token(&self, tenant_id: &TenantId, user_id: &MailboxUserId) -> anyhow::Result<Option<DeltaToken>> {
            Ok(self
                .tokens
                .lock()
                .unwrap()
                .get(&(tenant_id.as_str().to_string(), user_id.as_str().to_string()))
                .cloned())
        }
    }

    #[derive(Default)]
    struct FakeDedup;

    #[async_trait::async_trait]
    impl DedupFilter for FakeDedup {
        async fn is_new(&self, _fingerprint: &Fingerprint) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    #[derive(Default)]
    struct FakePublisher {
        published: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Publisher for FakePublisher {
        async fn publish(&self, _envelope: &EmailEnvelope) -> anyhow::Result<()> {
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Returns one non-deleted and one deleted item on the first call with
    /// `token.is_none()`; on any retry with a fresh call returns a 410 error
    /// once if `fail_once_with_gone` is set, to exercise the token-expiry
    /// recovery path.
    struct FakeProvider {
        fail_once_with_gone: std::sync::atomic::AtomicBool,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self { fail_once_with_gone: std::sync::atomic::AtomicBool::new(false) }
        }
        fn gone_then_ok() -> Self {
            Self { fail_once_with_gone: std::sync::atomic::AtomicBool::new(true) }
        }
    }

    #[async_trait::async_trait]
    impl GraphProvider for FakeProvider {
        async fn list_licensed_users(&self, _tenant: &Tenant) -> anyhow::Result<Vec<DiscoveredUser>> {
            Ok(vec![])
        }
        async fn create_subscription(
            &self,
            _tenant: &Tenant,
            _user_id: &MailboxUserId,
            _client_state: &ClientState,
            _notification_url: &str,
            _expiration: DateTime<Utc>,
        ) -> anyhow::Result<NewSubscription> {
            unreachable!()
        }
        async fn renew_subscription(&self, _tenant: &Tenant, _subscription_id: &SubscriptionId, _expiration: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
            unreachable!()
        }
        async fn get_delta(&self, _tenant: &Tenant, _user_id: &MailboxUserId, token: Option<&DeltaToken>) -> anyhow::Result<DeltaPage> {
            if token.is_some() && self.fail_once_with_gone.swap(false, Ordering::SeqCst) {
                anyhow::bail!("delta token expired (410 Gone)");
            }
            Ok(DeltaPage {
                items: vec![
                    DeltaMessageItem { message_id: "m-1".to_string(), deleted: false },
                    DeltaMessageItem { message_id: "m-2".to_string(), deleted: true },
                ],
                cursor: DeltaCursor::Complete(DeltaToken::new("tok-next".to_string()).unwrap()),
            })
        }
        async fn get_delta_page(&self, _tenant: &Tenant, _page_token: &str) -> anyhow::Result<DeltaPage> {
            unreachable!()
        }
        async fn fetch_message(&self, tenant: &Tenant, user_id: &MailboxUserId, message_id: &str) -> anyhow::Result<Option<EmailEnvelope>> {
            Ok(Some(EmailEnvelope {
                message_id: message_id.to_string(),
                user_id: user_id.as_str().to_string(),
                tenant_id: tenant.tenant_id.as_str().to_string(),
                tenant_alias: tenant.alias.as_str().to_string(),
                received_at: Utc::now(),
                from: Participant { address: "a@example.com".to_string(), name: None },
                to: vec![],
                subject: "hi".to_string(),
                body: Body { content_type: "text".to_string(), content: "hi".to_string() },
                headers: std::collections::BTreeMap::new(),
                attachments: vec![],
            }))
        }
    }

    fn tenant() -> Tenant {
        Tenant {
            alias: TenantAlias::new("acme".to_string()).unwrap(),
            tenant_id: TenantId::new("tid-1".to_string()).unwrap(),
            client_id: "c".to_string(),
            client_secret: "s".to_string(),
            include: vec![],
            exclude: vec![],
        }
    }

    fn synchroniser(provider: FakeProvider, store: Arc<FakeStore>, publisher: Arc<FakePublisher>) -> DeltaSynchroniser {
        let mut tenants = HashMap::new();
        tenants.insert(tenant().alias, tenant());
        DeltaSynchroniser::new(
            tenants,
            store,
            Arc::new(provider),
            Arc::new(FakeDedup),
            publisher,
            SyncConfig { sweep_interval: std::time::Duration::from_secs(900) },
        )
    }

    #[tokio::test]
    async fn sync_mailbox_publishes_non_deleted_items_and_skips_deletions() {
        let publisher = Arc::new(FakePublisher::default());
        let store = Arc::new(FakeStore::default());
        let user_id = MailboxUserId::new("u-1".to_string()).unwrap();
        store
            .save_delta_token(&tenant().tenant_id, &user_id, &DeltaToken::new("tok-prev".to_string()).unwrap())
            .await
            .unwrap();
        let sync = synchroniser(FakeProvider::new(), store, publisher.clone());

        sync.sync_mailbox(&tenant().alias, &user_id).await.unwrap();

        assert_eq!(publisher.published.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn initial_sync_anchors_the_cursor_without_publishing() {
        let publisher = Arc::new(FakePublisher::default());
        let store = Arc::new(FakeStore::default());
        let sync = synchroniser(FakeProvider::new(), store.clone(), publisher.clone());
        let user_id = MailboxUserId::new("u-1".to_string()).unwrap();

        sync.sync_mailbox(&tenant().alias, &user_id).await.unwrap();

        assert_eq!(publisher.published.load(Ordering::SeqCst), 0);
        let persisted = store.get_delta_token(&tenant().tenant_id, &user_id).await.unwrap().unwrap();
        assert_eq!(persisted.as_str(), "tok-next");
    }

    #[tokio::test]
    async fn sync_mailbox_persists_the_new_token_to_store_and_cache() {
        let publisher = Arc::new(FakePublisher::default());
        let store = Arc::new(FakeStore::default());
        let sync = synchroniser(FakeProvider::new(), store.clone(), publisher);
        let user_id = MailboxUserId::new("u-1".to_string()).unwrap();

        sync.sync_mailbox(&tenant().alias, &user_id).await.unwrap();

        assert_eq!(store.saved_token_calls.load(Ordering::SeqCst), 1);
        let persisted = store.get_delta_token(&tenant().tenant_id, &user_id).await.unwrap().unwrap();
        assert_eq!(persisted.as_str(), "tok-next");
        assert_eq!(sync.cache.get(&tenant().alias, &user_id).unwrap().as_str(), "tok-next");
    }

    #[tokio::test]
    async fn expired_token_triggers_a_fresh_initial_sync() {
        let publisher = Arc::new(FakePublisher::default());
        let store = Arc::new(FakeStore::default());
        let user_id = MailboxUserId::new("u-1".to_string()).unwrap();
        store
            .save_delta_token(&tenant().tenant_id, &user_id, &DeltaToken::new("stale".to_string()).unwrap())
            .await
            .unwrap();
        let sync = synchroniser(FakeProvider::gone_then_ok(), store, publisher.clone());

        sync.sync_mailbox(&tenant().alias, &user_id).await.unwrap();

        assert_eq!(publisher.published.load(Ordering::SeqCst), 0);
        assert_eq!(sync.cache.get(&tenant().alias, &user_id).unwrap().as_str(), "tok-next");
    }

    #[tokio::test]
    async fn unknown_tenant_alias_is_an_error() {
        let sync = synchroniser(FakeProvider::new(), Arc::new(FakeStore::default()), Arc::new(FakePublisher::default()));
        let other = TenantAlias::new("other".to_string()).unwrap();
        let result = sync.sync_mailbox(&other, &MailboxUserId::new("u-1".to_string()).unwrap()).await;
        assert!(result.is_err());
    }
}
