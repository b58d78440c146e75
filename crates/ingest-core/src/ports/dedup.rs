//! The dedup filter port.

use async_trait::async_trait;

use crate::domain::newtypes::Fingerprint;

/// A set-membership test with expiry, used to suppress republishing a
/// message seen via more than one path (push, delta sweep, backfill).
#[async_trait]
pub trait DedupFilter: Send + Sync {
    /// Atomically checks whether `fingerprint` has been seen before and, if
    /// not, records it. Returns `true` the first time a fingerprint is seen,
    /// `false` on every subsequent call within the retention window.
    async fn is_new(&self, fingerprint: &Fingerprint) -> anyhow::Result<bool>;
}
