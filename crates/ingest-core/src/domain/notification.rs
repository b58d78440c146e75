//! Change notification parsing
//!
//! Transient types for the push path: a raw notification delivered to the
//! webhook, and the resource-path parser that extracts the tenant/user/item
//! triple it names.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ClientState, MailboxUserId, SubscriptionId};

/// The kind of change a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

/// One entry of a change-notification payload, after provider JSON has been
/// deserialized by the adapter and converted into this transport-agnostic
/// shape.
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    pub subscription_id: SubscriptionId,
    pub client_state: ClientState,
    pub change_type: ChangeType,
    pub resource: String,
}

/// The parsed identity a notification's `resource` field names.
///
/// The provider's resource path for a mail-change notification has the
/// shape `Users/{user-id}/Messages/{message-id}`: exactly four segments,
/// case-insensitively matching `Users` and `Messages`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageResource {
    pub user_id: MailboxUserId,
    pub message_id: String,
}

/// Parses a notification's `resource` field into a [`MessageResource`].
///
/// Returns [`DomainError::InvalidResourcePath`] unless the path has exactly
/// four `/`-separated segments shaped `Users/{id}/Messages/{id}` (segment
/// names matched case-insensitively).
pub fn parse_message_resource(resource: &str) -> Result<MessageResource, DomainError> {
    let segments: Vec<&str> = resource.split('/').collect();
    if segments.len() != 4 {
        return Err(DomainError::InvalidResourcePath(resource.to_string()));
    }
    if !segments[0].eq_ignore_ascii_case("users") || !segments[2].eq_ignore_ascii_case("messages")
    {
        return Err(DomainError::InvalidResourcePath(resource.to_string()));
    }
    let user_id = MailboxUserId::new(segments[1].to_string())
        .map_err(|_| DomainError::InvalidResourcePath(resource.to_string()))?;
    if segments[3].is_empty() {
        return Err(DomainError::InvalidResourcePath(resource.to_string()));
    }
    Ok(MessageResource {
        user_id,
        message_id: segments[3].to_string(),
    })
}
