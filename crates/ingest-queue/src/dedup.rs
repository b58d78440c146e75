//! Redis-backed deduplication filter
//!
//! Implements `SET key value NX EX ttl` semantics: the first caller for a
//! given fingerprint within the TTL window wins.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use ingest_core::domain::newtypes::Fingerprint;
use ingest_core::ports::dedup::DedupFilter;

const KEY_PREFIX: &str = "seen:";

/// Deduplicates fingerprints against a Redis keyspace.
///
/// `ConnectionManager` multiplexes over a single connection and
/// reconnects transparently, so one instance is shared (cloned cheaply)
/// across every caller.
pub struct RedisDedupFilter {
    conn: ConnectionManager,
    ttl_seconds: u64,
}

impl RedisDedupFilter {
    /// Connects to `redis_url` and returns a filter that marks fingerprints
    /// seen for `ttl`.
    pub async fn connect(redis_url: &str, ttl: std::time::Duration) -> Result<Self, crate::QueueError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            ttl_seconds: ttl.as_secs(),
        })
    }
}

#[async_trait]
impl DedupFilter for RedisDedupFilter {
    async fn is_new(&self, fingerprint: &Fingerprint) -> anyhow::Result<bool> {
        let key = format!("{KEY_PREFIX}{}", fingerprint.as_str());
        let mut conn = self.conn.clone();

        let set: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(set.is_some())
    }
}
