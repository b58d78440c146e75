//! Subscription lifecycle entity

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ClientState, MailboxUserId, SubscriptionId, TenantId};

/// The lifecycle state of a subscription, as tracked by the
/// Subscription Lifecycle Manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is registered with the provider and not known to be stale.
    Active,
    /// Subscription's expiry has passed without a successful renewal.
    Expired,
    /// Provider sent a `subscriptionRemoved` lifecycle event, or the manager
    /// tore the subscription down deliberately (mailbox left scope).
    Removed,
}

impl Display for SubscriptionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Removed => "removed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SubscriptionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "removed" => Ok(Self::Removed),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

/// A durable record of a change-notification subscription for one mailbox.
///
/// Uniqueness invariants (enforced by the store):
/// - `(tenant_id, user_id)` is unique: at most one live subscription per mailbox.
/// - `subscription_id` is unique across all tenants.
#[derive(Debug, Clone)]
pub struct SubscriptionRecord {
    pub tenant_id: TenantId,
    pub user_id: MailboxUserId,
    pub subscription_id: SubscriptionId,
    pub client_state: ClientState,
    pub expires_at: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub last_push_observed_at: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        user_id: MailboxUserId,
        subscription_id: SubscriptionId,
        client_state: ClientState,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            user_id,
            subscription_id,
            client_state,
            expires_at,
            status: SubscriptionStatus::Active,
            last_push_observed_at: None,
        }
    }

    /// True when `now` is within `buffer` of `expires_at` and the
    /// subscription is still [`SubscriptionStatus::Active`] — the condition
    /// the renewal sweep uses to decide whether to renew.
    #[must_use]
    pub fn needs_renewal(&self, now: DateTime<Utc>, buffer: chrono::Duration) -> bool {
        self.status == SubscriptionStatus::Active && self.expires_at - now <= buffer
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
