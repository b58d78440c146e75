//! Prometheus metrics registry for the ingestion subsystem
//!
//! A registry namespaced with a common prefix, typed counters/gauges/
//! histograms registered up front, with recording helpers rather than
//! exposing the raw Prometheus handles to call sites.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Central metrics registry for webhook ingress, delta sync, and subscription lifecycle.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: change notifications handled by (tenant, outcome).
    pub notifications_total: IntCounterVec,
    /// Counter: messages handed to the downstream queue by (tenant, origin).
    pub messages_published_total: IntCounterVec,
    /// Counter: messages suppressed as duplicates by origin.
    pub messages_deduped_total: IntCounterVec,
    /// Gauge: currently active subscriptions by tenant.
    pub subscriptions_active: IntGaugeVec,
    /// Counter: subscription renewal attempts by (tenant, outcome).
    pub subscription_renewals_total: IntCounterVec,
    /// Counter: provider HTTP requests by (endpoint, status).
    pub graph_requests_total: IntCounterVec,
    /// Histogram: delta sync round duration in seconds by tenant.
    pub delta_sync_duration_seconds: HistogramVec,
}

impl MetricsRegistry {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("ingest".to_string()), None)?;

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Total change notifications handled"),
            &["tenant", "outcome"],
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        let messages_published_total = IntCounterVec::new(
            Opts::new("messages_published_total", "Total messages handed to the downstream queue"),
            &["tenant", "origin"],
        )?;
        registry.register(Box::new(messages_published_total.clone()))?;

        let messages_deduped_total = IntCounterVec::new(
            Opts::new("messages_deduped_total", "Total messages suppressed as duplicates"),
            &["origin"],
        )?;
        registry.register(Box::new(messages_deduped_total.clone()))?;

        let subscriptions_active = IntGaugeVec::new(
            Opts::new("subscriptions_active", "Currently active subscriptions"),
            &["tenant"],
        )?;
        registry.register(Box::new(subscriptions_active.clone()))?;

        let subscription_renewals_total = IntCounterVec::new(
            Opts::new("subscription_renewals_total", "Total subscription renewal attempts"),
            &["tenant", "outcome"],
        )?;
        registry.register(Box::new(subscription_renewals_total.clone()))?;

        let graph_requests_total = IntCounterVec::new(
            Opts::new("graph_requests_total", "Total Microsoft Graph API requests"),
            &["endpoint", "status"],
        )?;
        registry.register(Box::new(graph_requests_total.clone()))?;

        let delta_sync_duration_seconds = HistogramVec::new(
            HistogramOpts::new("delta_sync_duration_seconds", "Delta sync round duration in seconds")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 30.0, f64::INFINITY]),
            &["tenant"],
        )?;
        registry.register(Box::new(delta_sync_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            notifications_total,
            messages_published_total,
            messages_deduped_total,
            subscriptions_active,
            subscription_renewals_total,
            graph_requests_total,
            delta_sync_duration_seconds,
        })
    }

    pub fn record_notification(&self, tenant: &str, outcome: &str) {
        self.notifications_total.with_label_values(&[tenant, outcome]).inc();
    }

    pub fn record_message_published(&self, tenant: &str, origin: &str) {
        self.messages_published_total.with_label_values(&[tenant, origin]).inc();
    }

    pub fn record_message_deduped(&self, origin: &str) {
        self.messages_deduped_total.with_label_values(&[origin]).inc();
    }

    pub fn set_subscriptions_active(&self, tenant: &str, count: i64) {
        self.subscriptions_active.with_label_values(&[tenant]).set(count);
    }

    pub fn record_subscription_renewal(&self, tenant: &str, outcome: &str) {
        self.subscription_renewals_total.with_label_values(&[tenant, outcome]).inc();
    }

    pub fn record_graph_request(&self, endpoint: &str, status: &str) {
        self.graph_requests_total.with_label_values(&[endpoint, status]).inc();
    }

    pub fn observe_delta_sync_duration(&self, tenant: &str, duration_secs: f64) {
        self.delta_sync_duration_seconds.with_label_values(&[tenant]).observe(duration_secs);
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
