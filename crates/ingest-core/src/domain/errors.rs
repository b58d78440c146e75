//! Domain error types
//!
//! Validation failures for domain newtypes. Distinct from adapter-level
//! errors (`ingest-graph::GraphError`, `ingest-store::StoreError`, ...),
//! which live in their own crates because they are adapter-specific.

use thiserror::Error;

/// Errors that can occur when constructing or validating domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Tenant alias is empty or contains characters unsafe for a URL path segment
    #[error("invalid tenant alias: {0}")]
    InvalidTenantAlias(String),

    /// Opaque provider tenant identifier is empty
    #[error("invalid tenant id: {0}")]
    InvalidTenantId(String),

    /// Opaque provider mailbox user identifier is empty
    #[error("invalid mailbox user id: {0}")]
    InvalidUserId(String),

    /// Invalid mailbox address format
    #[error("invalid mailbox address: {0}")]
    InvalidAddress(String),

    /// Provider-assigned subscription identifier is empty
    #[error("invalid subscription id: {0}")]
    InvalidSubscriptionId(String),

    /// Client state (shared secret) is not 32 hex characters
    #[error("invalid client state: {0}")]
    InvalidClientState(String),

    /// Delta token is empty
    #[error("invalid delta token: {0}")]
    InvalidDeltaToken(String),

    /// Fingerprint is empty
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Resource path from a change notification does not match the expected shape
    #[error("unrecognized resource path: {0}")]
    InvalidResourcePath(String),

    /// Invalid subscription status transition or string representation
    #[error("invalid subscription status: {0}")]
    InvalidStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DomainError::InvalidTenantAlias("".to_string());
        assert_eq!(err.to_string(), "invalid tenant alias: ");
    }

    #[test]
    fn error_equality() {
        let a = DomainError::InvalidDeltaToken("x".to_string());
        let b = DomainError::InvalidDeltaToken("x".to_string());
        assert_eq!(a, b);
    }
}
