//! Notification/lifecycle dispatch

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use ingest_core::domain::newtypes::{Fingerprint, MailboxUserId, SubscriptionId, TenantAlias};
use ingest_core::domain::notification::parse_message_resource;
use ingest_core::domain::tenant::Tenant;
use ingest_core::ports::{DedupFilter, GraphProvider, LifecycleEventSink, Publisher, SubscriptionStore};

use crate::wire::{LifecycleEnvelope, NotificationEnvelope, RawChangeNotification, RawLifecycleNotification};

/// Dispatches parsed webhook payloads to the store/dedup/fetch/publish chain.
///
/// Holds every per-tenant [`Tenant`] keyed by its webhook alias, plus the
/// shared adapters every mailbox's notifications flow through.
pub struct Dispatcher {
    tenants: HashMap<TenantAlias, Tenant>,
    store: Arc<dyn SubscriptionStore>,
    dedup: Arc<dyn DedupFilter>,
    provider: Arc<dyn GraphProvider>,
    publisher: Arc<dyn Publisher>,
    lifecycle: Arc<dyn LifecycleEventSink>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        tenants: HashMap<TenantAlias, Tenant>,
        store: Arc<dyn SubscriptionStore>,
        dedup: Arc<dyn DedupFilter>,
        provider: Arc<dyn GraphProvider>,
        publisher: Arc<dyn Publisher>,
        lifecycle: Arc<dyn LifecycleEventSink>,
    ) -> Self {
        Self {
            tenants,
            store,
            dedup,
            provider,
            publisher,
            lifecycle,
        }
    }

    /// Dispatches every notification in a parsed batch. Failures are
    /// per-notification; one bad entry never affects the others.
    pub async fn handle_notification_batch(&self, alias: &TenantAlias, envelope: NotificationEnvelope) {
        for raw in envelope.value {
            self.handle_one(alias, raw).await;
        }
    }

    async fn handle_one(&self, alias: &TenantAlias, raw: RawChangeNotification) {
        // Step 1: only "created" changes carry a fetchable message.
        if raw.change_type != "created" {
            debug!(change_type = %raw.change_type, "skipping non-created notification");
            return;
        }

        // Step 2: parse the resource path.
        let resource = match parse_message_resource(&raw.resource) {
            Ok(r) => r,
            Err(e) => {
                warn!(resource = %raw.resource, error = %e, "rejecting malformed resource path");
                return;
            }
        };

        let tenant = match self.tenants.get(alias) {
            Some(t) => t,
            None => {
                warn!(alias = %alias, "notification for unknown tenant alias");
                return;
            }
        };

        // Step 3: look up the subscription record and check the echoed secret.
        match self.store.get(&tenant.tenant_id, &resource.user_id).await {
            Ok(Some(record)) => {
                if !raw.client_state.is_empty() && raw.client_state != record.client_state.as_str() {
                    warn!(
                        subscription_id = %record.subscription_id,
                        "dropping notification with mismatched client state"
                    );
                    return;
                }

                // Step 4: record that a push was observed.
                if let Err(e) = self.store.touch_push_observed(&record.subscription_id, Utc::now()).await {
                    warn!(error = %e, "failed to record push observation");
                }
            }
            Ok(None) => {
                // Race with subscription creation; proceed rather than lose data.
                debug!(
                    user = resource.user_id.as_str(),
                    "no subscription record yet for this mailbox, proceeding anyway"
                );
            }
            Err(e) => {
                warn!(error = %e, "subscription store lookup failed, proceeding anyway");
            }
        }

        // Step 5: dedup against the default (unprefixed) push namespace.
        let fingerprint = match Fingerprint::push(&resource.message_id) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "failed to build dedup fingerprint");
                return;
            }
        };

        match self.dedup.is_new(&fingerprint).await {
            Ok(false) => {
                debug!(message_id = %resource.message_id, "duplicate notification, skipping");
                return;
            }
            Ok(true) => {}
            Err(e) => {
                warn!(error = %e, "dedup store unreachable, proceeding (may duplicate)");
            }
        }

        // Step 6: fetch and publish.
        self.fetch_and_publish(tenant, &resource.user_id, &resource.message_id).await;
    }

    async fn fetch_and_publish(&self, tenant: &Tenant, user_id: &MailboxUserId, message_id: &str) {
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

    /// Dispatches every lifecycle event in a parsed batch.
    pub async fn handle_lifecycle_batch(&self, envelope: LifecycleEnvelope) {
        for raw in envelope.value {
            self.handle_lifecycle_one(raw).await;
        }
    }

    async fn handle_lifecycle_one(&self, raw: RawLifecycleNotification) {
        let subscription_id = match SubscriptionId::new(raw.subscription_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "rejecting lifecycle event with malformed subscription id");
                return;
            }
        };

        match raw.lifecycle_event.as_str() {
            "subscriptionRemoved" => self.lifecycle.subscription_removed(&subscription_id).await,
            "reauthorizationRequired" => self.lifecycle.reauthorization_required(&subscription_id).await,
            "missed" => self.lifecycle.missed(&subscription_id).await,
            other => warn!(event = other, "ignoring unknown lifecycle event"),
        }
    }
}
