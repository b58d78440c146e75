//! Backfill command - walk a mailbox's full history into the downstream queue
//!
//! Unlike the push and delta-sweep paths, a backfill run never touches the
//! persisted delta cursor: it always starts an initial (`token = None`)
//! delta query and walks every page to completion, publishing under the
//! `backfill:` fingerprint namespace so it can run safely alongside a live
//! subscription without colliding with its dedup keys.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use tracing::info;

use ingest_core::config::Config;
use ingest_core::domain::newtypes::{Fingerprint, MailboxUserId, TenantAlias, TenantId};
use ingest_core::domain::tenant::Tenant;
use ingest_core::ports::graph_provider::DeltaCursor;
use ingest_core::ports::{AuthenticatedTransport, DedupFilter, GraphProvider, Publisher};
use ingest_graph::auth::ClientCredentialsTransport;
use ingest_graph::provider::GraphProviderImpl;
use ingest_queue::{RedisDedupFilter, RedisPublisher};

use crate::output::{get_formatter, OutputFormat};

/// Walk a mailbox's full message history and publish it for downstream analysis.
#[derive(Debug, Args)]
pub struct BackfillCommand {
    /// Tenant alias as configured in the daemon's config file.
    #[arg(long)]
    pub tenant: String,

    /// The mailbox user id (or UPN) to backfill.
    #[arg(long)]
    pub mailbox: String,

    /// Only publish messages received at or after this RFC-3339 timestamp.
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    /// Path to the daemon's YAML configuration file.
    #[arg(long)]
    pub config: Option<String>,
}

impl BackfillCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));

        let config_path = self
            .config
            .clone()
            .map(std::path::PathBuf::from)
            .or_else(Config::default_path)
            .context("no configuration path given and no default config directory available")?;
        let config = Config::load(&config_path).with_context(|| format!("failed to load config from {}", config_path.display()))?;

        let tenant_alias = TenantAlias::new(self.tenant.clone())?;
        let tenant_config = config
            .tenants
            .iter()
            .find(|t| t.alias == self.tenant)
            .with_context(|| format!("tenant '{}' not found in configuration", self.tenant))?;

        let tenant = Tenant {
            alias: tenant_alias,
            tenant_id: TenantId::new(tenant_config.tenant_id.clone())?,
            client_id: tenant_config.client_id.clone(),
            client_secret: tenant_config.client_secret.clone(),
            include: tenant_config.include.clone(),
            exclude: tenant_config.exclude.clone(),
        };
        let user_id = MailboxUserId::new(self.mailbox.clone())?;

        let transport: Arc<dyn AuthenticatedTransport> = Arc::new(ClientCredentialsTransport::new());
        let provider: Arc<dyn GraphProvider> = Arc::new(GraphProviderImpl::new(transport));
        let dedup: Arc<dyn DedupFilter> = Arc::new(
            RedisDedupFilter::connect(&config.queue.redis_url, config.queue.dedup_ttl)
                .await
                .context("failed to connect dedup filter")?,
        );
        let publisher: Arc<dyn Publisher> = Arc::new(
            RedisPublisher::connect(&config.queue.redis_url, config.queue.queue_name.clone())
                .await
                .context("failed to connect publisher")?,
        );

        formatter.info(&format!("Starting backfill for {}/{}", self.tenant, self.mailbox));
        info!(tenant = %self.tenant, mailbox = %self.mailbox, since = ?self.since, "backfill started");

        let mut published = 0u64;
        let mut skipped = 0u64;
        let mut deduped = 0u64;

        let mut page = provider.get_delta(&tenant, &user_id, None).await.context("initial delta query failed")?;
        loop {
            for item in &page.items {
                if item.deleted {
                    continue;
                }

                let fingerprint = Fingerprint::backfill(&item.message_id)?;
                match dedup.is_new(&fingerprint).await {
                    Ok(false) => {
                        deduped += 1;
                        continue;
                    }
                    Ok(true) => {}
                    Err(e) => {
                        formatter.error(&format!("dedup check failed for {}: {e}", item.message_id));
                        continue;
                    }
                }

                let envelope = match provider.fetch_message(&tenant, &user_id, &item.message_id).await {
                    Ok(Some(e)) => e,
                    Ok(None) => {
                        skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        formatter.error(&format!("failed to fetch {}: {e}", item.message_id));
                        continue;
                    }
                };

                if let Some(since) = self.since {
                    if envelope.received_at < since {
                        skipped += 1;
                        continue;
                    }
                }

                if let Err(e) = publisher.publish(&envelope).await {
                    formatter.error(&format!("failed to publish {}: {e}", item.message_id));
                    continue;
                }
                published += 1;
            }

            let next_page_token = match &page.cursor {
                DeltaCursor::NextPage(token) => Some(token.clone()),
                DeltaCursor::Complete(_) => None,
            };
            match next_page_token {
                Some(token) => {
                    page = provider.get_delta_page(&tenant, &token).await.context("delta page fetch failed")?;
                }
                None => break,
            }
        }

        if matches!(format, OutputFormat::Json) {
            formatter.print_json(&serde_json::json!({
                "tenant": self.tenant,
                "mailbox": self.mailbox,
                "published": published,
                "skipped": skipped,
                "deduped": deduped,
            }));
        } else {
            formatter.success(&format!(
                "Backfill complete: {published} published, {skipped} skipped, {deduped} deduped"
            ));
        }

        Ok(())
    }
}
