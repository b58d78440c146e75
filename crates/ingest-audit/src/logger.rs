//! `AuditLogger` - a typed entry point per auditable action.
//!
//! This ingestion subsystem has no durable audit ledger of its own (the
//! subscription store owns subscriptions and delta tokens only). Every
//! action instead emits a structured `tracing` event under a fixed `target`
//! so an operator can route audit events to their own sink (a log index, a
//! SIEM) independently of regular operational logs, without this crate
//! knowing what that sink is.

use chrono::{DateTime, Utc};
use ingest_core::domain::newtypes::{MailboxUserId, SubscriptionId, TenantAlias};
use serde_json::Value;
use tracing::info;

const TARGET: &str = "ingest_audit";

/// Emits structured audit events. Holds no state; exists so call sites read
/// as `logger.log_whatever(...)` rather than bare `info!` calls scattered
/// through the use cases.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuditLogger;

impl AuditLogger {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn log_subscription_created(&self, tenant: &TenantAlias, user_id: &MailboxUserId, subscription_id: &SubscriptionId, expires_at: DateTime<Utc>) {
        info!(
            target: TARGET,
            audit_action = "subscription_created",
            tenant = %tenant,
            user = user_id.as_str(),
            subscription_id = %subscription_id,
            expires_at = %expires_at.to_rfc3339(),
        );
    }

    pub fn log_subscription_renewed(&self, subscription_id: &SubscriptionId, expires_at: DateTime<Utc>) {
        info!(
            target: TARGET,
            audit_action = "subscription_renewed",
            subscription_id = %subscription_id,
            expires_at = %expires_at.to_rfc3339(),
        );
    }

    pub fn log_subscription_removed(&self, subscription_id: &SubscriptionId, reason: &str) {
        info!(
            target: TARGET,
            audit_action = "subscription_removed",
            subscription_id = %subscription_id,
            reason,
        );
    }

    pub fn log_message_published(&self, tenant: &TenantAlias, user_id: &MailboxUserId, message_id: &str, origin: &str) {
        info!(
            target: TARGET,
            audit_action = "message_published",
            tenant = %tenant,
            user = user_id.as_str(),
            message_id,
            origin,
        );
    }

    pub fn log_message_deduped(&self, message_id: &str, origin: &str) {
        info!(
            target: TARGET,
            audit_action = "message_deduped",
            message_id,
            origin,
        );
    }

    pub fn log_sync_round_complete(&self, tenant: &TenantAlias, user_id: &MailboxUserId, items_seen: usize, duration_ms: u64) {
        info!(
            target: TARGET,
            audit_action = "sync_round_complete",
            tenant = %tenant,
            user = user_id.as_str(),
            items_seen,
            duration_ms,
        );
    }

    pub fn log_webhook_validation(&self, tenant: &TenantAlias) {
        info!(
            target: TARGET,
            audit_action = "webhook_validation_handshake",
            tenant = %tenant,
        );
    }

    /// For cases that don't warrant a dedicated method (lifecycle events
    /// routed by type, say); `details` should be a `serde_json::json!{}`
    /// object so the event's fields stay queryable.
    pub fn log_event(&self, action: &str, details: Value) {
        info!(target: TARGET, audit_action = action, details = %details);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracing_test::traced_test;

    fn tenant_alias() -> TenantAlias {
        TenantAlias::new("acme".to_string()).unwrap()
    }

    fn user_id() -> MailboxUserId {
        MailboxUserId::new("u-1".to_string()).unwrap()
    }

    #[traced_test]
    #[test]
    fn subscription_created_logs_the_action_and_tenant() {
        let logger = AuditLogger::new();
        let subscription_id = SubscriptionId::new("sub-1".to_string()).unwrap();
        logger.log_subscription_created(&tenant_alias(), &user_id(), &subscription_id, Utc::now());
        assert!(logs_contain("subscription_created"));
        assert!(logs_contain("acme"));
    }

    #[traced_test]
    #[test]
    fn message_published_logs_the_origin() {
        let logger = AuditLogger::new();
        logger.log_message_published(&tenant_alias(), &user_id(), "m-1", "push");
        assert!(logs_contain("message_published"));
        assert!(logs_contain("push"));
    }

    #[traced_test]
    #[test]
    fn log_event_carries_through_arbitrary_details() {
        let logger = AuditLogger::new();
        logger.log_event("custom_action", json!({"foo": "bar"}));
        assert!(logs_contain("custom_action"));
    }
}
