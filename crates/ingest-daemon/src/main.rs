//! Email ingestion daemon
//!
//! Wires up the webhook ingress server, the Subscription Lifecycle Manager,
//! the Delta Synchroniser, and the metrics/health endpoint behind a single
//! root cancellation token, and coordinates graceful shutdown on
//! SIGINT/SIGTERM.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ingest_audit::AuditLogger;
use ingest_core::config::Config;
use ingest_core::domain::newtypes::{TenantAlias, TenantId};
use ingest_core::domain::tenant::Tenant;
use ingest_core::ports::AuthenticatedTransport;
use ingest_graph::auth::ClientCredentialsTransport;
use ingest_graph::provider::GraphProviderImpl;
use ingest_ingress::{Dispatcher, IngressServer};
use ingest_lifecycle::{GapCallback, LifecycleManager};
use ingest_queue::{RedisDedupFilter, RedisPublisher};
use ingest_store::{DatabasePool, PostgresSubscriptionStore};
use ingest_sync::DeltaSynchroniser;
use ingest_telemetry::{HealthCheckFn, MetricsRegistry, TelemetryServer};

#[derive(Debug, Parser)]
#[command(name = "ingestd", version, about = "Email ingestion daemon")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long)]
    config: Option<String>,
}

fn tenants_from_config(config: &Config) -> Result<Vec<Tenant>> {
    config
        .tenants
        .iter()
        .map(|t| {
            Ok(Tenant {
                alias: TenantAlias::new(t.alias.clone())?,
                tenant_id: TenantId::new(t.tenant_id.clone())?,
                client_id: t.client_id.clone(),
                client_secret: t.client_secret.clone(),
                include: t.include.clone(),
                exclude: t.exclude.clone(),
            })
        })
        .collect()
}

async fn wait_for_shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .or_else(Config::default_path)
        .context("no configuration path given and no default config directory available")?;

    let config = Config::load(&config_path).with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(config_path = %config_path.display(), tenants = config.tenants.len(), "configuration loaded");

    let tenants = tenants_from_config(&config)?;

    let pool = DatabasePool::new(&config.store.database_url, config.store.max_connections)
        .await
        .context("failed to initialize the subscription store")?;
    let store: Arc<dyn ingest_core::ports::SubscriptionStore> =
        Arc::new(PostgresSubscriptionStore::new(pool.pool().clone()));

    let dedup: Arc<dyn ingest_core::ports::DedupFilter> =
        Arc::new(RedisDedupFilter::connect(&config.queue.redis_url, config.queue.dedup_ttl).await.context("failed to connect dedup filter")?);
    let publisher: Arc<dyn ingest_core::ports::Publisher> = Arc::new(
        RedisPublisher::connect(&config.queue.redis_url, config.queue.queue_name.clone())
            .await
            .context("failed to connect publisher")?,
    );

    let transport: Arc<dyn AuthenticatedTransport> = Arc::new(ClientCredentialsTransport::new());
    let provider: Arc<dyn ingest_core::ports::GraphProvider> = Arc::new(GraphProviderImpl::new(transport));

    let audit = AuditLogger::new();

    let synchroniser = Arc::new(DeltaSynchroniser::new(
        tenants.iter().map(|t| (t.alias.clone(), t.clone())).collect(),
        Arc::clone(&store),
        Arc::clone(&provider),
        Arc::clone(&dedup),
        Arc::clone(&publisher),
        config.sync.clone(),
    ));

    let gap_sync = Arc::clone(&synchroniser);
    let on_gap: GapCallback = Arc::new(move |alias, user_id| {
        let synchroniser = Arc::clone(&gap_sync);
        Box::pin(async move {
            if let Err(e) = synchroniser.sync_mailbox(&alias, &user_id).await {
                error!(tenant = %alias, user = user_id.as_str(), error = %e, "gap-recovery sync failed");
            }
        })
    });

    let lifecycle_manager = Arc::new(LifecycleManager::new(
        tenants.clone(),
        Arc::clone(&store),
        Arc::clone(&provider),
        config.lifecycle.clone(),
        config.ingress.public_base_url.clone(),
        on_gap,
    ));

    let tenant_map: HashMap<TenantAlias, Tenant> = tenants.iter().map(|t| (t.alias.clone(), t.clone())).collect();
    let dispatcher = Arc::new(Dispatcher::new(
        tenant_map,
        Arc::clone(&store),
        Arc::clone(&dedup),
        Arc::clone(&provider),
        Arc::clone(&publisher),
        lifecycle_manager.clone() as Arc<dyn ingest_core::ports::LifecycleEventSink>,
    ));

    let ingress_server = Arc::new(IngressServer::new(dispatcher, &config.ingress.bind_addr)?);

    let metrics = Arc::new(MetricsRegistry::new()?);
    let health_store = Arc::clone(&store);
    let health_check: HealthCheckFn = Arc::new(move || {
        let store = Arc::clone(&health_store);
        Box::pin(async move {
            store
                .list_expiring_soon(chrono::Utc::now(), chrono::Duration::seconds(0))
                .await
                .is_ok()
        })
    });
    let telemetry_server = Arc::new(TelemetryServer::new(metrics, health_check, &config.health.bind_addr)?);

    let shutdown = CancellationToken::new();

    let ingress_task = {
        let ingress_server = Arc::clone(&ingress_server);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = ingress_server.run(shutdown).await {
                error!(error = %e, "ingress server exited with an error");
            }
        })
    };
    ingress_server.ready_signal().notified().await;

    let telemetry_task = {
        let telemetry_server = Arc::clone(&telemetry_server);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = telemetry_server.run(shutdown).await {
                error!(error = %e, "telemetry server exited with an error");
            }
        })
    };

    lifecycle_manager.start().await;

    let sync_task = {
        let synchroniser = Arc::clone(&synchroniser);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            synchroniser.run(shutdown).await;
        })
    };

    audit.log_event("daemon_started", serde_json::json!({"tenants": tenants.len()}));
    info!("ingestion daemon started");
    wait_for_shutdown_signal().await;

    info!("shutting down");
    shutdown.cancel();
    lifecycle_manager.stop().await;

    let _ = tokio::join!(ingress_task, telemetry_task, sync_task);

    audit.log_event("daemon_stopped", serde_json::json!({}));
    info!("shutdown complete");
    Ok(())
}
