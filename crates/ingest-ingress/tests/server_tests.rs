//! HTTP-contract tests for `IngressServer`: bind the real accept loop on a
//! loopback port and drive it with raw requests rather than only
//! unit-testing the route parser.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use ingest_core::domain::envelope::{Body, EmailEnvelope, Participant};
use ingest_core::domain::newtypes::{ClientState, DeltaToken, Fingerprint, MailboxUserId, SubscriptionId, TenantAlias, TenantId};
use ingest_core::domain::subscription::{SubscriptionRecord, SubscriptionStatus};
use ingest_core::domain::tenant::Tenant;
use ingest_core::ports::graph_provider::DeltaPage;
use ingest_core::ports::{DedupFilter, DiscoveredUser, GraphProvider, LifecycleEventSink, Publisher, SubscriptionStore};
use ingest_ingress::dispatch::Dispatcher;
use ingest_ingress::server::IngressServer;

#[derive(Default)]
struct FakeStore;

#[async_trait::async_trait]
impl SubscriptionStore for FakeStore {
    async fn upsert(&self, _record: &SubscriptionRecord) -> anyhow::Result<()> {
        Ok(())
    }
    async fn get(&self, _tenant_id: &TenantId, _user_id: &MailboxUserId) -> anyhow::Result<Option<SubscriptionRecord>> {
        Ok(None)
    }
    async fn get_by_subscription_id(&self, _subscription_id: &SubscriptionId) -> anyhow::Result<Option<SubscriptionRecord>> {
        Ok(None)
    }
    async fn list_by_tenant(&self, _tenant_id: &TenantId) -> anyhow::Result<Vec<SubscriptionRecord>> {
        Ok(vec![])
    }
    async fn list_expiring_soon(&self, _now: chrono::DateTime<Utc>, _buffer: chrono::Duration) -> anyhow::Result<Vec<SubscriptionRecord>> {
        Ok(vec![])
    }
    async fn update_expiry(&self, _subscription_id: &SubscriptionId, _expires_at: chrono::DateTime<Utc>) -> anyhow::Result<()> {
        Ok(())
    }
    async fn mark_status(&self, _subscription_id: &SubscriptionId, _status: SubscriptionStatus) -> anyhow::Result<()> {
        Ok(())
    }
    async fn touch_push_observed(&self, _subscription_id: &SubscriptionId, _observed_at: chrono::DateTime<Utc>) -> anyhow::Result<()> {
        Ok(())
    }
    async fn save_delta_token(&self, _tenant_id: &TenantId, _user_id: &MailboxUserId, _token: &DeltaToken) -> anyhow::Result<()> {
        Ok(())
    }
    async fn get_delta_token(&self, _tenant_id: &TenantId, _user_id: &MailboxUserId) -> anyhow::Result<Option<DeltaToken>> {
        Ok(None)
    }
}

#[derive(Default)]
struct FakeDedup {
    seen: Mutex<std::collections::HashSet<String>>,
}

#[async_trait::async_trait]
impl DedupFilter for FakeDedup {
    async fn is_new(&self, fingerprint: &Fingerprint) -> anyhow::Result<bool> {
        Ok(self.seen.lock().unwrap().insert(fingerprint.as_str().to_string()))
    }
}

#[derive(Default)]
struct FakePublisher {
    published: AtomicUsize,
}

#[async_trait::async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, _envelope: &EmailEnvelope) -> anyhow::Result<()> {
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeLifecycle;

#[async_trait::async_trait]
impl LifecycleEventSink for FakeLifecycle {
    async fn subscription_removed(&self, _subscription_id: &SubscriptionId) {}
    async fn reauthorization_required(&self, _subscription_id: &SubscriptionId) {}
    async fn missed(&self, _subscription_id: &SubscriptionId) {}
}

struct FakeProvider;

#[async_trait::async_trait]
impl GraphProvider for FakeProvider {
    async fn list_licensed_users(&self, _tenant: &Tenant) -> anyhow::Result<Vec<DiscoveredUser>> {
        Ok(vec![])
    }
    async fn create_subscription(
        &self,
        _tenant: &Tenant,
        _user_id: &MailboxUserId,
        _client_state: &ClientState,
        _notification_url: &str,
        _expiration: chrono::DateTime<Utc>,
    ) -> anyhow::Result<ingest_core::ports::NewSubscription> {
        unreachable!()
    }
    async fn renew_subscription(
        &self,
        _tenant: &Tenant,
        _subscription_id: &SubscriptionId,
        _expiration: chrono::DateTime<Utc>,
    ) -> anyhow::Result<chrono::DateTime<Utc>> {
        unreachable!()
    }
    async fn get_delta(&self, _tenant: &Tenant, _user_id: &MailboxUserId, _token: Option<&DeltaToken>) -> anyhow::Result<DeltaPage> {
        unreachable!()
    }
    async fn get_delta_page(&self, _tenant: &Tenant, _page_token: &str) -> anyhow::Result<DeltaPage> {
        unreachable!()
    }
    async fn fetch_message(&self, tenant: &Tenant, user_id: &MailboxUserId, message_id: &str) -> anyhow::Result<Option<EmailEnvelope>> {
        Ok(Some(EmailEnvelope {
            message_id: message_id.to_string(),
            user_id: user_id.as_str().to_string(),
            tenant_id: tenant.tenant_id.as_str().to_string(),
            tenant_alias: tenant.alias.as_str().to_string(),
            received_at: Utc::now(),
            from: Participant { address: "a@example.com".to_string(), name: None },
            to: vec![],
            subject: "hi".to_string(),
            body: Body { content_type: "text".to_string(), content: "hi".to_string() },
            headers: std::collections::BTreeMap::new(),
            attachments: vec![],
        }))
    }
}

fn acme_tenant() -> Tenant {
    Tenant {
        alias: TenantAlias::new("acme".to_string()).unwrap(),
        tenant_id: TenantId::new("tid-1".to_string()).unwrap(),
        client_id: "client-1".to_string(),
        client_secret: "secret".to_string(),
        include: vec![],
        exclude: vec![],
    }
}

/// Picks a free loopback port by binding and immediately releasing it.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn send(addr: &str, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect to ingress server");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match tokio::time::timeout(Duration::from_millis(500), stream.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => response.extend_from_slice(&buf[..n]),
            Ok(Err(_)) => break,
        }
    }
    String::from_utf8_lossy(&response).into_owned()
}

struct Harness {
    addr: String,
    publisher: Arc<FakePublisher>,
    shutdown: CancellationToken,
    _task: tokio::task::JoinHandle<()>,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start_server() -> Harness {
    let port = free_port().await;
    let addr = format!("127.0.0.1:{port}");

    let mut tenants = HashMap::new();
    let tenant = acme_tenant();
    tenants.insert(tenant.alias.clone(), tenant);

    let publisher = Arc::new(FakePublisher::default());
    let dispatcher = Arc::new(Dispatcher::new(
        tenants,
        Arc::new(FakeStore),
        Arc::new(FakeDedup::default()),
        Arc::new(FakeProvider),
        publisher.clone(),
        Arc::new(FakeLifecycle),
    ));

    let server = Arc::new(IngressServer::new(dispatcher, &addr).unwrap());
    let ready = server.ready_signal();
    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();
    let task = tokio::spawn(async move {
        server.run(shutdown_clone).await.unwrap();
    });
    ready.notified().await;

    Harness { addr, publisher, shutdown, _task: task }
}

#[tokio::test]
async fn validation_probe_echoes_token_without_touching_the_body() {
    let harness = start_server().await;
    let response = send(
        &harness.addr,
        "POST /webhook/acme/u-1?validationToken=abc123 HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("abc123"));
}

#[tokio::test]
async fn valid_notification_body_is_accepted_and_published() {
    let harness = start_server().await;
    let body = serde_json::json!({
        "value": [{
            "subscriptionId": "sub-1",
            "clientState": "",
            "changeType": "created",
            "resource": "Users/u-1/Messages/m-1",
        }]
    })
    .to_string();
    let request = format!(
        "POST /webhook/acme/u-1 HTTP/1.1\r\nHost: x\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );

    let response = send(&harness.addr, &request).await;
    assert!(response.starts_with("HTTP/1.1 202"));

    // dispatch happens on a spawned task; give it a moment to complete.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.publisher.published.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_body_still_gets_acked() {
    let harness = start_server().await;
    let body = "not json";
    let request = format!("POST /webhook/acme/u-1 HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{body}", body.len());

    let response = send(&harness.addr, &request).await;
    assert!(response.starts_with("HTTP/1.1 202"));
}

#[tokio::test]
async fn unrecognized_path_is_still_acked_with_202() {
    let harness = start_server().await;
    let request = "POST /nonsense HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n";

    let response = send(&harness.addr, request).await;
    assert!(response.starts_with("HTTP/1.1 202"));
}

#[tokio::test]
async fn get_request_is_answered_with_200_and_empty_body() {
    let harness = start_server().await;
    let request = "GET /webhook/acme/u-1 HTTP/1.1\r\nHost: x\r\n\r\n";

    let response = send(&harness.addr, request).await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("\r\n\r\n"));
}
