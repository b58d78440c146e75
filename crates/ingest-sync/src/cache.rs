//! In-memory front for the durable delta-token store.
//!
//! Every sync round consults the store first on process startup, then keeps
//! its result here to avoid a round trip on every sweep tick. The store
//! remains the source of truth: a cache miss always falls through to it,
//! and a cache write only happens after the corresponding store write
//! succeeds.

use std::collections::HashMap;
use std::sync::RwLock;

use ingest_core::domain::newtypes::{DeltaToken, MailboxUserId, TenantAlias};

#[derive(Default)]
pub struct DeltaTokenCache {
    tokens: RwLock<HashMap<(TenantAlias, MailboxUserId), DeltaToken>>,
}

impl DeltaTokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, tenant: &TenantAlias, user_id: &MailboxUserId) -> Option<DeltaToken> {
        self.tokens
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&(tenant.clone(), user_id.clone()))
            .cloned()
    }

    pub fn set(&self, tenant: &TenantAlias, user_id: &MailboxUserId, token: DeltaToken) {
        self.tokens
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert((tenant.clone(), user_id.clone()), token);
    }

    pub fn clear(&self, tenant: &TenantAlias, user_id: &MailboxUserId) {
        self.tokens
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&(tenant.clone(), user_id.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias() -> TenantAlias {
        TenantAlias::new("acme".to_string()).unwrap()
    }

    fn user() -> MailboxUserId {
        MailboxUserId::new("u-1".to_string()).unwrap()
    }

    #[test]
    fn miss_on_empty_cache() {
        let cache = DeltaTokenCache::new();
        assert!(cache.get(&alias(), &user()).is_none());
    }

    #[test]
    fn set_then_get_round_trips() {
        let cache = DeltaTokenCache::new();
        let token = DeltaToken::new("tok-1".to_string()).unwrap();
        cache.set(&alias(), &user(), token.clone());
        assert_eq!(cache.get(&alias(), &user()).unwrap(), token);
    }

    #[test]
    fn clear_removes_entry() {
        let cache = DeltaTokenCache::new();
        cache.set(&alias(), &user(), DeltaToken::new("tok-1".to_string()).unwrap());
        cache.clear(&alias(), &user());
        assert!(cache.get(&alias(), &user()).is_none());
    }
}
