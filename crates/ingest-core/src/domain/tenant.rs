//! Tenant configuration entity

use super::newtypes::{TenantAlias, TenantId};

/// A configured tenant: credentials and scope for the mailboxes to watch.
///
/// `include`/`exclude` hold raw mailbox address strings rather than
/// [`super::newtypes::MailboxAddress`] because operators may list wildcards
/// or partial domains in configuration; matching is done case-insensitively
/// by the user discovery component.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub alias: TenantAlias,
    pub tenant_id: TenantId,
    pub client_id: String,
    pub client_secret: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Tenant {
    /// Returns true if `address` should be watched under this tenant's scope.
    ///
    /// An empty `include` list means "all mailboxes"; `exclude` always wins.
    #[must_use]
    pub fn in_scope(&self, address: &str) -> bool {
        let address = address.to_ascii_lowercase();
        let excluded = self
            .exclude
            .iter()
            .any(|pattern| pattern.to_ascii_lowercase() == address);
        if excluded {
            return false;
        }
        self.include.is_empty()
            || self
                .include
                .iter()
                .any(|pattern| pattern.to_ascii_lowercase() == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(include: Vec<&str>, exclude: Vec<&str>) -> Tenant {
        Tenant {
            alias: TenantAlias::new("acme".to_string()).unwrap(),
            tenant_id: TenantId::new("tid-1".to_string()).unwrap(),
            client_id: "client-1".to_string(),
            client_secret: "secret".to_string(),
            include: include.into_iter().map(str::to_string).collect(),
            exclude: exclude.into_iter().map(str::to_string).collect(),
        }
    }

    #[test]
    fn empty_include_means_all_mailboxes() {
        let t = tenant(vec![], vec![]);
        assert!(t.in_scope("anyone@acme.com"));
    }

    #[test]
    fn exclude_wins_over_include() {
        let t = tenant(vec!["alice@acme.com"], vec!["alice@acme.com"]);
        assert!(!t.in_scope("alice@acme.com"));
    }

    #[test]
    fn include_restricts_scope() {
        let t = tenant(vec!["alice@acme.com"], vec![]);
        assert!(t.in_scope("alice@acme.com"));
        assert!(!t.in_scope("bob@acme.com"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let t = tenant(vec!["Alice@Acme.com"], vec![]);
        assert!(t.in_scope("alice@acme.com"));
    }
}
