//! Mailbox user discovery

use ingest_core::domain::newtypes::MailboxAddress;
use ingest_core::domain::tenant::Tenant;
use ingest_core::ports::GraphProvider;

/// A mailbox to watch, resolved from either the tenant's include list or a
/// directory listing.
///
/// When resolved from an include list, `user_id` is the mailbox's address
/// itself — the provider's user-addressing accepts a userPrincipalName
/// wherever an object id is expected, so no extra directory lookup is
/// needed just to get a subscribable identifier.
#[derive(Debug, Clone)]
pub struct DiscoveredMailbox {
    pub user_id: ingest_core::domain::newtypes::MailboxUserId,
    pub address: MailboxAddress,
}

/// Resolves the set of mailboxes to subscribe for a tenant.
///
/// If `tenant.include` is non-empty, returns exactly those addresses without
/// a provider call (still applying case-insensitive exclusions). Otherwise
/// enumerates every licensed user via the provider, following continuation
/// links to completion, skipping users with no mail attribute.
pub async fn discover_mailboxes(
    tenant: &Tenant,
    provider: &dyn GraphProvider,
) -> anyhow::Result<Vec<DiscoveredMailbox>> {
    if !tenant.include.is_empty() {
        return tenant
            .include
            .iter()
            .filter(|addr| tenant.in_scope(addr))
            .map(|addr| {
                Ok(DiscoveredMailbox {
                    user_id: ingest_core::domain::newtypes::MailboxUserId::new(addr.clone())?,
                    address: MailboxAddress::new(addr.clone())?,
                })
            })
            .collect();
    }

    let users = provider.list_licensed_users(tenant).await?;
    Ok(users
        .into_iter()
        .filter(|u| tenant.in_scope(u.address.as_str()))
        .map(|u| DiscoveredMailbox {
            user_id: u.user_id,
            address: u.address,
        })
        .collect())
}
