//! Graph provider adapter
//!
//! Implements `ingest_core::ports::graph_provider::GraphProvider` and
//! `ingest_core::ports::transport::AuthenticatedTransport` against the mail
//! provider's Graph API: user discovery, subscription management, delta
//! sync, and message fetch.
//!
//! ## Modules
//!
//! - [`auth`] - client-credentials token acquisition and caching
//! - [`client`] - the bearer-authed HTTP client with adaptive rate limiting
//! - [`delta`] - message delta queries for incremental synchronization
//! - [`messages`] - single-message fetch and envelope mapping
//! - [`provider`] - the `GraphProvider` trait implementation tying it together
//! - [`rate_limit`] - token-bucket rate limiting
//! - [`subscriptions`] - subscription create/renew
//! - [`users`] - licensed user discovery

pub mod auth;
pub mod client;
pub mod delta;
pub mod messages;
pub mod provider;
pub mod rate_limit;
pub mod subscriptions;
pub mod users;

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by calls against the mail provider's Graph API.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("too many requests, retry after {retry_after:?}")]
    TooManyRequests { retry_after: Duration },

    #[error("server error: {0}")]
    ServerError(String),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("token expired")]
    TokenExpired,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The delta token has expired server-side (HTTP 410 Gone); the caller
    /// must discard its cursor and restart with an initial sync.
    #[error("delta token expired (410 Gone)")]
    DeltaTokenExpired,
}
