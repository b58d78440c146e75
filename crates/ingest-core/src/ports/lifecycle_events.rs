//! The lifecycle-notification sink port.
//!
//! The ingress adapter receives `subscriptionRemoved`/`reauthorizationRequired`/
//! `missed` events on `/lifecycle/{alias}` but has no business logic of its
//! own for them; it hands each off to whichever component owns
//! subscription state. Kept as its own small port (rather than folding into
//! [`crate::ports::subscription_store::SubscriptionStore`]) because the
//! Lifecycle Manager's reaction is behavioral, not a data read/write.

use async_trait::async_trait;

use crate::domain::newtypes::SubscriptionId;

#[async_trait]
pub trait LifecycleEventSink: Send + Sync {
    /// The provider garbage-collected the subscription; the manager should
    /// mark it removed and let the next renewal tick recreate it.
    async fn subscription_removed(&self, subscription_id: &SubscriptionId);

    /// The provider's ability to validate the subscription has been revoked;
    /// the manager should attempt an immediate renewal.
    async fn reauthorization_required(&self, subscription_id: &SubscriptionId);

    /// The provider may have missed delivering notifications; the manager
    /// should trigger a gap-recovery delta sync for the affected mailbox.
    async fn missed(&self, subscription_id: &SubscriptionId);
}
