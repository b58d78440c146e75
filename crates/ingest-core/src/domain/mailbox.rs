//! Mailbox user entity

use super::newtypes::{MailboxAddress, MailboxUserId};

/// A mailbox discovered under a tenant's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxUser {
    pub user_id: MailboxUserId,
    pub address: MailboxAddress,
    pub display_name: Option<String>,
}

impl MailboxUser {
    #[must_use]
    pub fn new(
        user_id: MailboxUserId,
        address: MailboxAddress,
        display_name: Option<String>,
    ) -> Self {
        Self {
            user_id,
            address,
            display_name,
        }
    }
}
