//! The authenticated transport port.

use async_trait::async_trait;

use crate::domain::tenant::Tenant;

/// Supplies bearer tokens for a tenant's application credentials.
///
/// Application-only (client-credentials) auth needs no per-mailbox token;
/// one implementation backs every tenant, caching and refreshing tokens as
/// their lifetime runs out.
#[async_trait]
pub trait AuthenticatedTransport: Send + Sync {
    /// A bearer token scoped for mail read access (message/delta/user calls).
    async fn mailbox_scope_token(&self, tenant: &Tenant) -> anyhow::Result<String>;

    /// A bearer token scoped for subscription management calls.
    async fn management_scope_token(&self, tenant: &Tenant) -> anyhow::Result<String>;
}
