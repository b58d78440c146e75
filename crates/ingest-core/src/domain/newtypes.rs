//! Validated domain newtypes
//!
//! Strongly-typed wrappers for the identifiers and opaque values that flow
//! through the ingestion pipeline. Each newtype validates its invariants at
//! construction time so that downstream code never has to re-check them.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// TenantAlias
// ============================================================================

/// A short, stable, operator-chosen name for a tenant.
///
/// Used to build webhook paths (`/webhook/{alias}/{user}`), so it is
/// restricted to characters safe in a URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantAlias(String);

impl TenantAlias {
    pub fn new(alias: String) -> Result<Self, DomainError> {
        if alias.is_empty() {
            return Err(DomainError::InvalidTenantAlias(
                "alias cannot be empty".to_string(),
            ));
        }
        if !alias
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::InvalidTenantAlias(format!(
                "alias contains characters unsafe for a URL path segment: {alias}"
            )));
        }
        Ok(Self(alias))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TenantAlias {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantAlias {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for TenantAlias {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TenantAlias> for String {
    fn from(alias: TenantAlias) -> Self {
        alias.0
    }
}

// ============================================================================
// TenantId
// ============================================================================

/// The opaque tenant identifier issued by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidTenantId(
                "tenant id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TenantId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for TenantId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

// ============================================================================
// MailboxUserId
// ============================================================================

/// The opaque provider user identifier for a mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MailboxUserId(String);

impl MailboxUserId {
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidUserId(
                "mailbox user id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MailboxUserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MailboxUserId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for MailboxUserId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<MailboxUserId> for String {
    fn from(id: MailboxUserId) -> Self {
        id.0
    }
}

// ============================================================================
// MailboxAddress
// ============================================================================

/// A validated mailbox (email) address.
///
/// Performs basic structural validation: contains exactly one `@`, has a
/// non-empty local part, and a non-empty domain with at least one dot.
/// Comparisons are case-insensitive, matching the provider's own treatment
/// of mail attributes and include/exclude list matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MailboxAddress(String);

impl MailboxAddress {
    pub fn new(address: String) -> Result<Self, DomainError> {
        let parts: Vec<&str> = address.split('@').collect();
        if parts.len() != 2 {
            return Err(DomainError::InvalidAddress(format!(
                "expected exactly one '@': {address}"
            )));
        }
        let (local, domain) = (parts[0], parts[1]);
        if local.is_empty() {
            return Err(DomainError::InvalidAddress(format!(
                "empty local part: {address}"
            )));
        }
        if domain.is_empty() || !domain.contains('.') {
            return Err(DomainError::InvalidAddress(format!(
                "invalid domain: {address}"
            )));
        }
        Ok(Self(address))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for MailboxAddress {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for MailboxAddress {}

impl std::hash::Hash for MailboxAddress {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

impl Display for MailboxAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MailboxAddress {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for MailboxAddress {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<MailboxAddress> for String {
    fn from(addr: MailboxAddress) -> Self {
        addr.0
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// The provider-assigned subscription identifier (opaque, globally unique).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidSubscriptionId(
                "subscription id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriptionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for SubscriptionId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<SubscriptionId> for String {
    fn from(id: SubscriptionId) -> Self {
        id.0
    }
}

// ============================================================================
// ClientState (shared secret)
// ============================================================================

/// The "client state" shared secret echoed by the provider on every
/// notification: 16 random bytes, hex-encoded.
///
/// Never logged, never transmitted except in the notification-echo
/// comparison — implementations of `Debug`/`Display` are intentionally not
/// derived for the secret value; use [`ClientState::as_str`] only at the
/// point of comparison.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientState(String);

impl ClientState {
    const BYTE_LEN: usize = 16;

    /// Generates a fresh random client state: a new 16-byte random secret
    /// is minted per subscription creation.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::BYTE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn new(value: String) -> Result<Self, DomainError> {
        if value.len() != Self::BYTE_LEN * 2 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidClientState(
                "client state must be 32 hex characters".to_string(),
            ));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClientState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ClientState(<redacted>)")
    }
}

impl FromStr for ClientState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ClientState {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ClientState> for String {
    fn from(state: ClientState) -> Self {
        state.0
    }
}

// ============================================================================
// DeltaToken
// ============================================================================

/// An opaque, provider-issued delta cursor.
///
/// We don't validate its contents beyond non-emptiness, since it is treated
/// as opaque by every caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeltaToken(String);

impl DeltaToken {
    pub fn new(token: String) -> Result<Self, DomainError> {
        if token.is_empty() {
            return Err(DomainError::InvalidDeltaToken(
                "delta token cannot be empty".to_string(),
            ));
        }
        Ok(Self(token))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeltaToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeltaToken {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for DeltaToken {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DeltaToken> for String {
    fn from(token: DeltaToken) -> Self {
        token.0
    }
}

// ============================================================================
// Fingerprint
// ============================================================================

/// A dedup key: the provider's message id, optionally namespaced by origin
/// (`"delta:<id>"`, `"backfill:<id>"`, or the raw id for push).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: String) -> Result<Self, DomainError> {
        if value.is_empty() {
            return Err(DomainError::InvalidFingerprint(
                "fingerprint cannot be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Fingerprint for a push-path notification: the raw message id.
    pub fn push(message_id: &str) -> Result<Self, DomainError> {
        Self::new(message_id.to_string())
    }

    /// Fingerprint for the delta sweep pipeline: `delta:<id>`.
    pub fn delta(message_id: &str) -> Result<Self, DomainError> {
        Self::new(format!("delta:{message_id}"))
    }

    /// Fingerprint for the backfill pipeline: `backfill:<id>`.
    pub fn backfill(message_id: &str) -> Result<Self, DomainError> {
        Self::new(format!("backfill:{message_id}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_alias_rejects_empty() {
        assert!(TenantAlias::new(String::new()).is_err());
    }

    #[test]
    fn tenant_alias_rejects_path_unsafe_chars() {
        assert!(TenantAlias::new("a/b".to_string()).is_err());
        assert!(TenantAlias::new("a b".to_string()).is_err());
    }

    #[test]
    fn tenant_alias_accepts_alphanumeric_dash_underscore() {
        assert!(TenantAlias::new("acme-corp_1".to_string()).is_ok());
    }

    #[test]
    fn mailbox_address_case_insensitive_equality() {
        let a = MailboxAddress::new("Alice@Example.com".to_string()).unwrap();
        let b = MailboxAddress::new("alice@example.com".to_string()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn mailbox_address_rejects_missing_at() {
        assert!(MailboxAddress::new("not-an-email".to_string()).is_err());
    }

    #[test]
    fn mailbox_address_rejects_domain_without_dot() {
        assert!(MailboxAddress::new("user@localhost".to_string()).is_err());
    }

    #[test]
    fn client_state_generate_is_32_hex_chars() {
        let state = ClientState::generate();
        assert_eq!(state.as_str().len(), 32);
        assert!(state.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn client_state_generate_is_random() {
        let a = ClientState::generate();
        let b = ClientState::generate();
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn client_state_rejects_wrong_length() {
        assert!(ClientState::new("abc".to_string()).is_err());
    }

    #[test]
    fn client_state_debug_is_redacted() {
        let state = ClientState::generate();
        assert_eq!(format!("{state:?}"), "ClientState(<redacted>)");
    }

    #[test]
    fn fingerprint_namespacing() {
        assert_eq!(Fingerprint::push("m1").unwrap().as_str(), "m1");
        assert_eq!(Fingerprint::delta("m1").unwrap().as_str(), "delta:m1");
        assert_eq!(Fingerprint::backfill("m1").unwrap().as_str(), "backfill:m1");
    }

    #[test]
    fn delta_token_rejects_empty() {
        assert!(DeltaToken::new(String::new()).is_err());
    }
}
