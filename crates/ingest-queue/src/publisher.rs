//! Redis-backed downstream publisher
//!
//! Wire format: a task record wrapped in a transport envelope, left-pushed
//! onto a list keyed by the queue name. This exact shape is load-bearing —
//! the analysis service on the other end expects it
//! verbatim.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use serde_json::json;

use ingest_core::domain::envelope::EmailEnvelope;
use ingest_core::ports::publisher::Publisher;

const TASK_NAME: &str = "analysis.tasks.analyze_email";

#[derive(Debug, Serialize)]
struct TaskRecord {
    id: String,
    task: &'static str,
    args: (String,),
    kwargs: serde_json::Value,
    retries: u32,
    eta: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueueMessage {
    body: String,
    #[serde(rename = "content-encoding")]
    content_encoding: &'static str,
    #[serde(rename = "content-type")]
    content_type: &'static str,
    headers: serde_json::Value,
    properties: serde_json::Value,
}

/// Enqueues canonical envelopes onto a Redis list for downstream analysis.
pub struct RedisPublisher {
    conn: ConnectionManager,
    queue_name: String,
}

impl RedisPublisher {
    /// Connects to `redis_url` and returns a publisher targeting `queue_name`.
    pub async fn connect(redis_url: &str, queue_name: String) -> Result<Self, crate::QueueError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, queue_name })
    }

    fn wire_message(&self, envelope: &EmailEnvelope) -> Result<String, crate::QueueError> {
        wire_message(envelope, &self.queue_name)
    }
}

fn wire_message(envelope: &EmailEnvelope, queue_name: &str) -> Result<String, crate::QueueError> {
    let envelope_json = serde_json::to_string(envelope)?;

    let record = TaskRecord {
        id: uuid::Uuid::new_v4().to_string(),
        task: TASK_NAME,
        args: (envelope_json,),
        kwargs: json!({}),
        retries: 0,
        eta: None,
    };

    let message = QueueMessage {
        body: serde_json::to_string(&record)?,
        content_encoding: "utf-8",
        content_type: "application/json",
        headers: json!({}),
        properties: json!({ "delivery_info": { "routing_key": queue_name } }),
    };

    Ok(serde_json::to_string(&message)?)
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, envelope: &EmailEnvelope) -> anyhow::Result<()> {
        let payload = self.wire_message(envelope)?;
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(&self.queue_name, payload).await?;
        Ok(())
    }
}
