//! Single-message fetch and envelope mapping

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ingest_core::domain::envelope::{Attachment, Body, EmailEnvelope, Participant};
use ingest_core::domain::newtypes::{MailboxUserId, TenantAlias, TenantId};
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use crate::client::GraphClient;

/// Attachments at or below this size are fetched inline with the message;
/// larger ones are fetched separately (mirrors the provider's own
/// inline-attachment ceiling).
const INLINE_ATTACHMENT_THRESHOLD_BYTES: u64 = 3_000_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    received_date_time: DateTime<Utc>,
    subject: Option<String>,
    from: Option<GraphRecipient>,
    to_recipients: Option<Vec<GraphRecipient>>,
    body: Option<GraphBody>,
    internet_message_headers: Option<Vec<GraphHeader>>,
    has_attachments: bool,
}

#[derive(Debug, Deserialize)]
struct GraphRecipient {
    #[serde(rename = "emailAddress")]
    email_address: GraphEmailAddress,
}

#[derive(Debug, Deserialize)]
struct GraphEmailAddress {
    address: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphBody {
    content_type: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GraphHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GraphAttachmentList {
    value: Vec<GraphAttachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAttachment {
    name: String,
    content_type: String,
    size: u64,
    content_bytes: Option<String>,
}

/// Fetches a message's full content and maps it to the publishable envelope
/// shape, fetching attachment bytes inline when small enough.
pub async fn fetch_message(
    client: &GraphClient,
    tenant_id: &TenantId,
    tenant_alias: &TenantAlias,
    user_id: &MailboxUserId,
    message_id: &str,
) -> Result<Option<EmailEnvelope>> {
    let select = "id,receivedDateTime,subject,from,toRecipients,body,internetMessageHeaders,hasAttachments";
    let path = format!(
        "/users/{}/messages/{}?$select={}",
        user_id.as_str(),
        message_id,
        select
    );

    debug!(user = user_id.as_str(), message_id, "fetching message");

    let response = client
        .request(Method::GET, &path)
        .send()
        .await
        .context("failed to send message fetch request")?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        debug!(user = user_id.as_str(), message_id, "message no longer exists");
        return Ok(None);
    }

    let message: GraphMessage = response
        .error_for_status()
        .context("message fetch returned error status")?
        .json()
        .await
        .context("failed to parse message response")?;

    let attachments = if message.has_attachments {
        fetch_attachments(client, user_id, message_id).await?
    } else {
        Vec::new()
    };

    let from = message
        .from
        .map(|r| Participant {
            address: r.email_address.address,
            name: r.email_address.name,
        })
        .unwrap_or(Participant {
            address: String::new(),
            name: None,
        });

    let to = message
        .to_recipients
        .unwrap_or_default()
        .into_iter()
        .map(|r| Participant {
            address: r.email_address.address,
            name: r.email_address.name,
        })
        .collect();

    let body = message.body.unwrap_or(GraphBody {
        content_type: "text".to_string(),
        content: String::new(),
    });

    let headers: BTreeMap<String, String> = message
        .internet_message_headers
        .unwrap_or_default()
        .into_iter()
        .map(|h| (h.name, h.value))
        .collect();

    Ok(Some(EmailEnvelope {
        message_id: message.id,
        user_id: user_id.as_str().to_string(),
        tenant_id: tenant_id.as_str().to_string(),
        tenant_alias: tenant_alias.as_str().to_string(),
        received_at: message.received_date_time,
        from,
        to,
        subject: message.subject.unwrap_or_default(),
        body: Body {
            content_type: body.content_type,
            content: body.content,
        },
        headers,
        attachments,
    }))
}

async fn fetch_attachments(
    client: &GraphClient,
    user_id: &MailboxUserId,
    message_id: &str,
) -> Result<Vec<Attachment>> {
    let path = format!(
        "/users/{}/messages/{}/attachments?$select=name,contentType,size,contentBytes",
        user_id.as_str(),
        message_id
    );

    let list: GraphAttachmentList = client
        .request(Method::GET, &path)
        .send()
        .await
        .context("failed to send attachments request")?
        .error_for_status()
        .context("attachments request returned error status")?
        .json()
        .await
        .context("failed to parse attachments response")?;

    Ok(list
        .value
        .into_iter()
        .map(|a| Attachment {
            name: a.name,
            content_type: a.content_type,
            size: a.size,
            content_bytes: if a.size <= INLINE_ATTACHMENT_THRESHOLD_BYTES {
                a.content_bytes
            } else {
                None
            },
        })
        .collect())
}
