//! Published message envelope
//!
//! The wire contract delivered to the downstream queue. Field names are
//! part of that contract and must not be renamed without a corresponding
//! change on the consumer side.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One participant in a message (`from`/`to`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub address: String,
    pub name: Option<String>,
}

/// The message body, tagged with its content type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    pub content_type: String,
    pub content: String,
}

/// A single attachment's metadata, and its bytes when small enough to
/// inline (a size threshold decides whether `content_bytes` is populated
/// or omitted in favor of a later fetch).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_bytes: Option<String>,
}

/// A fully fetched email, ready for publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailEnvelope {
    pub message_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub tenant_alias: String,
    pub received_at: DateTime<Utc>,
    pub from: Participant,
    pub to: Vec<Participant>,
    pub subject: String,
    pub body: Body,
    /// Header name to value. A JSON object, not an array of pairs — the
    /// provider can deliver a header more than once (rare, but seen with
    /// `Received`-style headers rewritten by intermediate relays); the map
    /// keeps only the last value seen per name.
    pub headers: BTreeMap<String, String>,
    pub attachments: Vec<Attachment>,
}
