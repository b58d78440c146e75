//! Webhook HTTP server
//!
//! A raw `hyper::server::conn::http1` service over a `TcpListener`, selected
//! against a cancellation token. No web framework.

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ingest_core::domain::newtypes::TenantAlias;

use crate::dispatch::Dispatcher;
use crate::error::IngressError;
use crate::wire::{LifecycleEnvelope, NotificationEnvelope};

enum Route {
    Webhook(TenantAlias),
    Lifecycle(TenantAlias),
}

/// HTTP server accepting change-notification and lifecycle webhooks.
pub struct IngressServer {
    dispatcher: Arc<Dispatcher>,
    addr: SocketAddr,
    /// Fires once the listener is bound, so the supervisor can hold off
    /// starting the Lifecycle Manager until the push endpoint can answer a
    /// validation probe.
    ready: Arc<Notify>,
}

impl IngressServer {
    pub fn new(dispatcher: Arc<Dispatcher>, bind_addr: &str) -> Result<Self, IngressError> {
        let addr: SocketAddr = bind_addr.parse()?;
        Ok(Self {
            dispatcher,
            addr,
            ready: Arc::new(Notify::new()),
        })
    }

    /// A handle callers can await to learn when the listener is bound.
    #[must_use]
    pub fn ready_signal(&self) -> Arc<Notify> {
        self.ready.clone()
    }

    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await.map_err(IngressError::BindFailed)?;
        info!(addr = %self.addr, "ingress listening");
        self.ready.notify_waiters();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, _) = result?;
                    let io = TokioIo::new(stream);
                    let dispatcher = Arc::clone(&self.dispatcher);

                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let dispatcher = Arc::clone(&dispatcher);
                            async move { handle(req, dispatcher).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            error!(error = %e, "ingress connection error");
                        }
                    });
                }
                () = shutdown.cancelled() => {
                    info!("ingress shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

fn parse_route(path: &str) -> Option<Route> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match segments.as_slice() {
        ["webhook", alias, _user] => TenantAlias::new((*alias).to_string()).ok().map(Route::Webhook),
        ["lifecycle", alias] => TenantAlias::new((*alias).to_string()).ok().map(Route::Lifecycle),
        _ => None,
    }
}

fn validation_token(uri: &hyper::Uri) -> Option<String> {
    let query = uri.query()?;
    let base = url::Url::parse("http://ingress.local/").ok()?;
    let url = base.join(&format!("?{query}")).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "validationToken")
        .map(|(_, v)| v.into_owned())
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from(body)))
        .expect("static response is well-formed")
}

async fn handle(
    req: Request<Incoming>,
    dispatcher: Arc<Dispatcher>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    // Non-POST requests respond 200.
    if req.method() != Method::POST {
        return Ok(text_response(StatusCode::OK, String::new()));
    }

    // Validation-probe handshake: echo the token verbatim, no body read needed.
    if let Some(token) = validation_token(req.uri()) {
        return Ok(text_response(StatusCode::OK, token));
    }

    let path = req.uri().path().to_string();
    let route = parse_route(&path);

    let body = req.collect().await?.to_bytes();

    // Always 202, even on parse failure — the provider's retries on a
    // persistently-malformed payload would just repeat the same bug.
    match route {
        Some(Route::Webhook(alias)) => match serde_json::from_slice::<NotificationEnvelope>(&body) {
            Ok(envelope) => {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    dispatcher.handle_notification_batch(&alias, envelope).await;
                });
            }
            Err(e) => warn!(path, error = %e, "malformed notification body, acking anyway"),
        },
        Some(Route::Lifecycle(_alias)) => match serde_json::from_slice::<LifecycleEnvelope>(&body) {
            Ok(envelope) => {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    dispatcher.handle_lifecycle_batch(envelope).await;
                });
            }
            Err(e) => warn!(path, error = %e, "malformed lifecycle body, acking anyway"),
        },
        None => warn!(path, "unrecognized webhook path, acking anyway"),
    }

    Ok(text_response(StatusCode::ACCEPTED, String::new()))
}
