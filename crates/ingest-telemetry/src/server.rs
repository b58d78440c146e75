//! Metrics and health HTTP server
//!
//! Same accept-loop shape as `ingest-ingress::server::IngressServer`: a raw
//! `hyper::server::conn::http1` service over a `TcpListener`, selected
//! against a cancellation token. No web framework.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::metrics::MetricsRegistry;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

type HealthFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// A boxed async probe of downstream dependencies (store connectivity, queue
/// reachability). Shaped like `ingest_lifecycle::GapCallback`: owned
/// components stay ignorant of this crate, `ingest-daemon` closes over them.
pub type HealthCheckFn = Arc<dyn Fn() -> HealthFuture + Send + Sync>;

/// HTTP server exposing `/metrics` and `/health`.
pub struct TelemetryServer {
    metrics: Arc<MetricsRegistry>,
    health_check: HealthCheckFn,
    addr: SocketAddr,
    ready: Arc<Notify>,
}

impl TelemetryServer {
    pub fn new(metrics: Arc<MetricsRegistry>, health_check: HealthCheckFn, bind_addr: &str) -> anyhow::Result<Self> {
        let addr: SocketAddr = bind_addr.parse()?;
        Ok(Self {
            metrics,
            health_check,
            addr,
            ready: Arc::new(Notify::new()),
        })
    }

    #[must_use]
    pub fn ready_signal(&self) -> Arc<Notify> {
        self.ready.clone()
    }

    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "telemetry listening");
        self.ready.notify_waiters();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, _) = result?;
                    let io = TokioIo::new(stream);
                    let metrics = Arc::clone(&self.metrics);
                    let health_check = Arc::clone(&self.health_check);

                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let metrics = Arc::clone(&metrics);
                            let health_check = Arc::clone(&health_check);
                            async move { handle(req, metrics, health_check).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            error!(error = %e, "telemetry connection error");
                        }
                    });
                }
                () = shutdown.cancelled() => {
                    info!("telemetry shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

fn text_response(status: StatusCode, content_type: &str, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .body(Full::new(Bytes::from(body)))
        .expect("static response is well-formed")
}

async fn handle(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
    health_check: HealthCheckFn,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    if req.method() != Method::GET {
        return Ok(text_response(StatusCode::METHOD_NOT_ALLOWED, "text/plain", String::new()));
    }

    match req.uri().path() {
        "/metrics" => match metrics.encode() {
            Ok(body) => Ok(text_response(StatusCode::OK, "text/plain; version=0.0.4", body)),
            Err(e) => {
                error!(error = %e, "failed to encode metrics");
                Ok(text_response(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", String::new()))
            }
        },
        "/health" => {
            let healthy = match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, health_check()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("health check timed out after {HEALTH_CHECK_TIMEOUT:?}");
                    false
                }
            };
            let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
            let body = if healthy { "ok" } else { "unhealthy" };
            Ok(text_response(status, "text/plain", body.to_string()))
        }
        _ => Ok(text_response(StatusCode::NOT_FOUND, "text/plain", String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_bind_addr_is_rejected() {
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let health_check: HealthCheckFn = Arc::new(|| Box::pin(async { true }));
        let result = TelemetryServer::new(metrics, health_check, "not-an-address");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn healthy_check_resolves_true() {
        let health_check: HealthCheckFn = Arc::new(|| Box::pin(async { true }));
        assert!(health_check().await);
    }

    #[tokio::test]
    async fn timeout_is_treated_as_unhealthy() {
        let health_check: HealthCheckFn = Arc::new(|| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                true
            })
        });

        let result = tokio::time::timeout(Duration::from_millis(50), health_check()).await;
        assert!(result.is_err());
    }
}
