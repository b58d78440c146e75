//! Domain entities, newtypes, and pure logic — no I/O.

pub mod envelope;
pub mod errors;
pub mod mailbox;
pub mod newtypes;
pub mod notification;
pub mod subscription;
pub mod tenant;

pub use envelope::{Attachment, Body, EmailEnvelope, Participant};
pub use errors::DomainError;
pub use mailbox::MailboxUser;
pub use newtypes::{
    ClientState, DeltaToken, Fingerprint, MailboxAddress, MailboxUserId, SubscriptionId,
    TenantAlias, TenantId,
};
pub use notification::{parse_message_resource, ChangeNotification, ChangeType, MessageResource};
pub use subscription::{SubscriptionRecord, SubscriptionStatus};
pub use tenant::Tenant;
