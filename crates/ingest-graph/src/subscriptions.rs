//! Change-notification subscription create/renew calls

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ingest_core::domain::newtypes::{ClientState, MailboxUserId, SubscriptionId};
use ingest_core::ports::graph_provider::NewSubscription;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::GraphClient;

const CHANGE_TYPE: &str = "created,updated,deleted";

#[derive(Debug, Serialize)]
struct CreateSubscriptionRequest {
    #[serde(rename = "changeType")]
    change_type: String,
    #[serde(rename = "notificationUrl")]
    notification_url: String,
    resource: String,
    #[serde(rename = "expirationDateTime")]
    expiration_date_time: DateTime<Utc>,
    #[serde(rename = "clientState")]
    client_state: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionResponse {
    id: String,
    #[serde(rename = "expirationDateTime")]
    expiration_date_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct RenewSubscriptionRequest {
    #[serde(rename = "expirationDateTime")]
    expiration_date_time: DateTime<Utc>,
}

/// Registers a new subscription against a mailbox's inbox messages.
pub async fn create_subscription(
    client: &GraphClient,
    user_id: &MailboxUserId,
    client_state: &ClientState,
    notification_url: &str,
    expiration: DateTime<Utc>,
) -> Result<NewSubscription> {
    let body = CreateSubscriptionRequest {
        change_type: CHANGE_TYPE.to_string(),
        notification_url: notification_url.to_string(),
        resource: format!("/users/{}/mailFolders('inbox')/messages", user_id.as_str()),
        expiration_date_time: expiration,
        client_state: client_state.as_str().to_string(),
    };

    debug!(user = user_id.as_str(), "creating subscription");

    let response: SubscriptionResponse = client
        .request(Method::POST, "/subscriptions")
        .json(&body)
        .send()
        .await
        .context("failed to send create-subscription request")?
        .error_for_status()
        .context("create-subscription request returned error status")?
        .json()
        .await
        .context("failed to parse create-subscription response")?;

    Ok(NewSubscription {
        subscription_id: SubscriptionId::new(response.id)?,
        expires_at: response.expiration_date_time,
    })
}

/// Extends an existing subscription's expiry.
pub async fn renew_subscription(
    client: &GraphClient,
    subscription_id: &SubscriptionId,
    expiration: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let path = format!("/subscriptions/{}", subscription_id.as_str());
    let body = RenewSubscriptionRequest {
        expiration_date_time: expiration,
    };

    debug!(subscription_id = subscription_id.as_str(), "renewing subscription");

    let response: SubscriptionResponse = client
        .request(Method::PATCH, &path)
        .json(&body)
        .send()
        .await
        .context("failed to send renew-subscription request")?
        .error_for_status()
        .context("renew-subscription request returned error status")?
        .json()
        .await
        .context("failed to parse renew-subscription response")?;

    Ok(response.expiration_date_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn create_subscription_parses_response() {
        let server = MockServer::start().await;
        let expires = Utc::now() + chrono::Duration::hours(1);

        Mock::given(method("POST"))
            .and(path("/subscriptions"))
            .and(body_partial_json(serde_json::json!({"changeType": CHANGE_TYPE})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "sub-1",
                "expirationDateTime": expires,
            })))
            .mount(&server)
            .await;

        let client = GraphClient::with_base_url("token", server.uri());
        let user_id = MailboxUserId::new("u-1".to_string()).unwrap();
        let client_state = ClientState::generate();

        let result = create_subscription(
            &client,
            &user_id,
            &client_state,
            "https://ingest.example.com/webhook/acme/u-1",
            expires,
        )
        .await
        .unwrap();

        assert_eq!(result.subscription_id.as_str(), "sub-1");
    }

    #[tokio::test]
    async fn renew_subscription_returns_new_expiry() {
        let server = MockServer::start().await;
        let expires = Utc::now() + chrono::Duration::hours(2);

        Mock::given(method("PATCH"))
            .and(path("/subscriptions/sub-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "sub-1",
                "expirationDateTime": expires,
            })))
            .mount(&server)
            .await;

        let client = GraphClient::with_base_url("token", server.uri());
        let subscription_id = SubscriptionId::new("sub-1".to_string()).unwrap();

        let new_expiry = renew_subscription(&client, &subscription_id, expires)
            .await
            .unwrap();
        assert_eq!(new_expiry, expires);
    }
}
