//! Delta query support for incremental mailbox synchronization
//!
//! Implements the delta query pattern for mail messages, mirroring the
//! provider's general delta-query contract: an initial request (optionally
//! resuming from a saved token) returns a page of changed/removed messages
//! plus either a `@odata.nextLink` (more pages to fetch) or a
//! `@odata.deltaLink` (this round is done; extract the token for next time).
//!
//! ## Delta Query Flow
//!
//! 1. **Initial sync**: call [`get_delta`] with `token = None`
//! 2. **Follow pages**: [`get_delta`] automatically follows `@odata.nextLink`
//!    pages until a `@odata.deltaLink` is reached
//! 3. **Save token**: persist the returned [`DeltaToken`] for the next sync
//! 4. **Incremental sync**: call [`get_delta`] again with the saved token

use anyhow::{Context, Result};
use ingest_core::domain::newtypes::{DeltaToken, MailboxUserId};
use ingest_core::ports::graph_provider::{DeltaCursor, DeltaMessageItem, DeltaPage};
use reqwest::{Client, Method};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::client::GraphClient;

fn delta_path(user_id: &MailboxUserId) -> String {
    format!("/users/{}/messages/delta", user_id.as_str())
}

/// Raw response from the provider's message delta endpoint.
#[derive(Debug, Deserialize)]
struct GraphDeltaResponse {
    #[serde(default)]
    value: Vec<GraphMessageItem>,

    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,

    #[serde(rename = "@odata.deltaLink")]
    delta_link: Option<String>,
}

/// One message entry in a delta page.
///
/// A removed message carries an `@removed` annotation instead of the usual
/// message fields; we only need the `id` either way.
#[derive(Debug, Deserialize)]
struct GraphMessageItem {
    id: String,
    #[serde(rename = "@removed")]
    removed: Option<GraphRemoved>,
}

#[derive(Debug, Deserialize)]
struct GraphRemoved {
    #[allow(dead_code)]
    reason: Option<String>,
}

fn parse_item(item: GraphMessageItem) -> DeltaMessageItem {
    DeltaMessageItem {
        message_id: item.id,
        deleted: item.removed.is_some(),
    }
}

/// Extracts the delta token from a `@odata.deltaLink` URL's `token` query
/// parameter.
pub fn extract_delta_token(delta_link: &str) -> Option<String> {
    url::Url::parse(delta_link).ok().and_then(|u| {
        u.query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
    })
}

/// Runs a full delta round for one mailbox, following pagination until a
/// `@odata.deltaLink` is reached.
///
/// `token` is `None` for an initial (full) sync, or the last saved cursor
/// for an incremental one.
pub async fn get_delta(
    client: &GraphClient,
    user_id: &MailboxUserId,
    token: Option<&DeltaToken>,
) -> Result<DeltaPage> {
    let base_path = delta_path(user_id);
    let path = match token {
        Some(t) => format!("{base_path}?token={}", t.as_str()),
        None => base_path,
    };

    debug!(user = user_id.as_str(), has_token = token.is_some(), "starting delta query");

    let http_response = client
        .request(Method::GET, &path)
        .send()
        .await
        .context("failed to send delta request")?;

    if http_response.status() == reqwest::StatusCode::GONE {
        anyhow::bail!("delta token expired (410 Gone)");
    }

    let raw: GraphDeltaResponse = http_response
        .error_for_status()
        .context("delta request returned error status")?
        .json()
        .await
        .context("failed to parse delta response JSON")?;

    let mut items: Vec<DeltaMessageItem> = raw.value.into_iter().map(parse_item).collect();
    let mut next_link = raw.next_link;
    let mut delta_link = raw.delta_link;

    let mut page_count: u32 = 1;
    while let Some(link) = next_link.take() {
        page_count += 1;
        debug!(page = page_count, "following delta nextLink");

        let page = get_delta_page(client, &link).await?;
        items.extend(page.items);
        match page.cursor {
            DeltaCursor::NextPage(link) => next_link = Some(link),
            DeltaCursor::Complete(token) => delta_link = Some(token.as_str().to_string()),
        }
    }

    debug!(
        total_items = items.len(),
        total_pages = page_count,
        "delta query complete"
    );

    let cursor = match delta_link {
        Some(link) => {
            let token = extract_delta_token(&link).unwrap_or(link);
            DeltaCursor::Complete(DeltaToken::new(token)?)
        }
        None => {
            warn!("delta traversal completed without a deltaLink");
            anyhow::bail!("delta traversal completed without a deltaLink");
        }
    };

    Ok(DeltaPage { items, cursor })
}

/// Fetches a single page from an absolute `@odata.nextLink`/`@odata.deltaLink`
/// URL. These are absolute URLs, so this bypasses [`GraphClient::request`]'s
/// base-URL prefixing and issues a direct bearer-authed request.
pub async fn get_delta_page(client: &GraphClient, link: &str) -> Result<DeltaPage> {
    let http_client = Client::new();

    let raw: GraphDeltaResponse = http_client
        .get(link)
        .bearer_auth(client.access_token())
        .send()
        .await
        .context("failed to send delta page request")?
        .error_for_status()
        .context("delta page request returned error status")?
        .json()
        .await
        .context("failed to parse delta page response JSON")?;

    let items = raw.value.into_iter().map(parse_item).collect();

    let cursor = if let Some(link) = raw.next_link {
        DeltaCursor::NextPage(link)
    } else if let Some(link) = raw.delta_link {
        let token = extract_delta_token(&link).unwrap_or(link);
        DeltaCursor::Complete(DeltaToken::new(token)?)
    } else {
        anyhow::bail!("delta traversal completed without a deltaLink");
    };

    Ok(DeltaPage { items, cursor })
}
