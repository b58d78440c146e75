//! Licensed mailbox user discovery

use anyhow::{Context, Result};
use ingest_core::domain::newtypes::{MailboxAddress, MailboxUserId};
use ingest_core::ports::graph_provider::DiscoveredUser;
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use crate::client::GraphClient;

#[derive(Debug, Deserialize)]
struct ListUsersResponse {
    value: Vec<GraphUser>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphUser {
    id: String,
    mail: Option<String>,
    #[serde(rename = "userPrincipalName")]
    user_principal_name: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "assignedLicenses", default)]
    assigned_licenses: Vec<serde_json::Value>,
}

/// Lists every mailbox-enabled (licensed) user visible to this tenant's
/// application credentials, following `@odata.nextLink` pagination.
pub async fn list_licensed_users(client: &GraphClient) -> Result<Vec<DiscoveredUser>> {
    let mut users = Vec::new();
    let mut path = Some(
        "/users?$select=id,mail,userPrincipalName,displayName,assignedLicenses".to_string(),
    );
    let mut absolute = false;

    while let Some(p) = path.take() {
        debug!(absolute, "listing users page");

        let response: ListUsersResponse = if absolute {
            client
                .client()
                .get(&p)
                .bearer_auth(client.access_token())
                .send()
                .await
                .context("failed to send paginated users request")?
                .error_for_status()
                .context("paginated users request returned error status")?
                .json()
                .await
                .context("failed to parse paginated users response")?
        } else {
            client
                .request(Method::GET, &p)
                .send()
                .await
                .context("failed to send users request")?
                .error_for_status()
                .context("users request returned error status")?
                .json()
                .await
                .context("failed to parse users response")?
        };

        for user in response.value {
            if user.assigned_licenses.is_empty() {
                continue;
            }
            let Some(address) = user.mail.or(user.user_principal_name) else {
                continue;
            };
            let Ok(address) = MailboxAddress::new(address) else {
                continue;
            };
            users.push(DiscoveredUser {
                user_id: MailboxUserId::new(user.id)?,
                address,
                display_name: user.display_name,
            });
        }

        if let Some(next) = response.next_link {
            path = Some(next);
            absolute = true;
        }
    }

    Ok(users)
}
