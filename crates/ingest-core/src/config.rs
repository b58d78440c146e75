//! Typed configuration surface
//!
//! Loaded from a YAML file at startup: one entry per tenant, plus the
//! process-wide ingress/store/queue settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the ingestion daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub tenants: Vec<TenantConfig>,
    #[serde(default)]
    pub ingress: IngressConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub store: StoreConfig,
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

/// Per-tenant credentials and mailbox scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub alias: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Webhook ingress server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IngressConfig {
    pub bind_addr: String,
    pub public_base_url: String,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            public_base_url: "https://localhost:8080".to_string(),
        }
    }
}

/// Subscription Lifecycle Manager tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LifecycleConfig {
    #[serde(with = "humantime_duration")]
    pub renewal_buffer: Duration,
    #[serde(with = "humantime_duration")]
    pub user_discovery_interval: Duration,
    pub subscription_ttl_hours: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            renewal_buffer: Duration::from_secs(600),
            user_discovery_interval: Duration::from_secs(3600),
            subscription_ttl_hours: 70,
        }
    }
}

/// Delta Synchroniser tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    #[serde(with = "humantime_duration")]
    pub sweep_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(900),
        }
    }
}

/// Durable subscription/delta-token store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Dedup filter + downstream publish queue connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QueueConfig {
    pub redis_url: String,
    pub queue_name: String,
    #[serde(with = "humantime_duration")]
    pub dedup_ttl: Duration,
}

/// Structured logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Health/metrics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthConfig {
    pub bind_addr: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9090".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from a YAML file on disk.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// The conventional config path, `$XDG_CONFIG_HOME/ingestd/config.yaml`
    /// (or the platform equivalent).
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ingestd").join("config.yaml"))
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer).map_err(D::Error::custom)?;
        Ok(Duration::from_secs(secs))
    }
}
