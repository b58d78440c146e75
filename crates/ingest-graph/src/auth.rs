//! Client-credentials token acquisition
//!
//! The ingestion daemon never acts on behalf of an interactive user — every
//! call is application-only, authenticated via the OAuth2 client-credentials
//! flow against each tenant's directory. Tokens are cached per
//! `(tenant_id, scope)` and refreshed a little before they expire.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingest_core::domain::tenant::Tenant;
use ingest_core::ports::transport::AuthenticatedTransport;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

const MAIL_SCOPE: &str = "https://graph.microsoft.com/.default";
const MANAGEMENT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Tokens are refreshed once fewer than this much of their lifetime remains.
const REFRESH_SKEW: chrono::Duration = chrono::Duration::seconds(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > REFRESH_SKEW
    }
}

/// Caches and refreshes per-tenant application access tokens.
pub struct ClientCredentialsTransport {
    http: Client,
    authority_base: String,
    cache: Arc<RwLock<HashMap<(String, &'static str), CachedToken>>>,
}

impl ClientCredentialsTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            authority_base: "https://login.microsoftonline.com".to_string(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Overrides the token authority base URL, for tests.
    #[must_use]
    pub fn with_authority_base(mut self, base: impl Into<String>) -> Self {
        self.authority_base = base.into();
        self
    }

    async fn token_for_scope(&self, tenant: &Tenant, scope: &'static str) -> Result<String> {
        let key = (tenant.tenant_id.as_str().to_string(), scope);

        if let Some(cached) = self.cache.read().await.get(&key) {
            if cached.is_fresh(Utc::now()) {
                return Ok(cached.access_token.clone());
            }
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_base,
            tenant.tenant_id.as_str()
        );

        debug!(tenant = tenant.alias.as_str(), scope, "requesting new access token");

        let response: TokenResponse = self
            .http
            .post(&url)
            .form(&[
                ("client_id", tenant.client_id.as_str()),
                ("client_secret", tenant.client_secret.as_str()),
                ("scope", scope),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .context("failed to send token request")?
            .error_for_status()
            .context("token request returned error status")?
            .json()
            .await
            .context("failed to parse token response")?;

        let cached = CachedToken {
            access_token: response.access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(response.expires_in),
        };
        self.cache.write().await.insert(key, cached);

        Ok(response.access_token)
    }
}

impl Default for ClientCredentialsTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthenticatedTransport for ClientCredentialsTransport {
    async fn mailbox_scope_token(&self, tenant: &Tenant) -> Result<String> {
        self.token_for_scope(tenant, MAIL_SCOPE).await
    }

    async fn management_scope_token(&self, tenant: &Tenant) -> Result<String> {
        self.token_for_scope(tenant, MANAGEMENT_SCOPE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::domain::newtypes::{TenantAlias, TenantId};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tenant(tenant_id: &str) -> Tenant {
        Tenant {
            alias: TenantAlias::new("acme".to_string()).unwrap(),
            tenant_id: TenantId::new(tenant_id.to_string()).unwrap(),
            client_id: "client-1".to_string(),
            client_secret: "secret".to_string(),
            include: vec![],
            exclude: vec![],
        }
    }

    #[tokio::test]
    async fn fetches_and_caches_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tid-1/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "tok-1", "expires_in": 3600})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = ClientCredentialsTransport::new().with_authority_base(server.uri());
        let t = tenant("tid-1");

        let token1 = transport.mailbox_scope_token(&t).await.unwrap();
        assert_eq!(token1, "tok-1");

        // Second call within the token's lifetime must not hit the server again.
        let token2 = transport.mailbox_scope_token(&t).await.unwrap();
        assert_eq!(token2, "tok-1");
    }

    #[tokio::test]
    async fn refreshes_expired_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tid-2/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "tok-a", "expires_in": 1})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tid-2/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "tok-b", "expires_in": 3600})),
            )
            .mount(&server)
            .await;

        let transport = ClientCredentialsTransport::new().with_authority_base(server.uri());
        let t = tenant("tid-2");

        let first = transport.mailbox_scope_token(&t).await.unwrap();
        assert_eq!(first, "tok-a");

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let second = transport.mailbox_scope_token(&t).await.unwrap();
        assert_eq!(second, "tok-b");
    }
}
