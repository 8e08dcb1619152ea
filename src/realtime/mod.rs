//! Table change notifications over Supabase Realtime

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::config::Config;
use crate::error::GatewayError;

/// Realtime event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change pushed by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct TableChange {
    pub table: String,
    pub kind: ChangeKind,
    /// New row for inserts/updates, old row for deletes
    pub record: Value,
}

/// Receiver of change notifications; drop it to unsubscribe
pub type ChangeStream = broadcast::Receiver<TableChange>;

/// Source of "table changed" notifications.
///
/// Delivery is at-least-once with no ordering promise relative to when the
/// change becomes visible to reads.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to inserts, updates and deletes on any row of `table`
    async fn subscribe(&self, table: &str) -> Result<ChangeStream, GatewayError>;
}

/// Client for Supabase Realtime
#[derive(Debug, Clone)]
pub struct RealtimeFeed {
    /// The base URL for the Supabase project
    url: String,

    /// The anonymous API key for the Supabase project
    key: String,

    /// Heartbeat interval for the Phoenix socket
    heartbeat_interval: Duration,
}

impl RealtimeFeed {
    pub fn new(config: &Config) -> Self {
        Self {
            url: config.supabase_url.clone(),
            key: config.supabase_anon_key.clone(),
            heartbeat_interval: config.heartbeat_interval,
        }
    }

    /// Get the WebSocket URL for the Realtime API
    pub fn socket_url(&self) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.url)?.join("/realtime/v1/websocket")?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(GatewayError::realtime(format!("unsupported URL scheme: {}", other))),
        };
        url.set_scheme(scheme)
            .map_err(|_| GatewayError::realtime("cannot switch URL to a websocket scheme"))?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }
}

/// Phoenix join message for all change events on a public table
fn join_message(topic: &str, table: &str) -> Value {
    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": {
            "config": {
                "postgres_changes": [
                    { "event": "*", "schema": "public", "table": table }
                ]
            }
        },
        "ref": "1",
    })
}

fn heartbeat_message(message_ref: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": message_ref.to_string(),
    })
}

/// Decode a `postgres_changes` frame; anything else yields `None`
fn parse_change(text: &str, table: &str) -> Option<TableChange> {
    let message: Value = serde_json::from_str(text).ok()?;
    if message.get("event").and_then(Value::as_str) != Some("postgres_changes") {
        return None;
    }

    let data = message.get("payload")?.get("data")?;
    let kind: ChangeKind = serde_json::from_value(data.get("type")?.clone()).ok()?;
    let record = match kind {
        ChangeKind::Delete => data.get("old_record"),
        _ => data.get("record"),
    }
    .cloned()
    .unwrap_or(Value::Null);

    Some(TableChange {
        table: data
            .get("table")
            .and_then(Value::as_str)
            .unwrap_or(table)
            .to_string(),
        kind,
        record,
    })
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(&self, table: &str) -> Result<ChangeStream, GatewayError> {
        let url = self.socket_url()?;
        debug!("connecting realtime socket for {}", table);

        let (stream, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = stream.split();

        let topic = format!("realtime:public:{}", table);
        write
            .send(Message::Text(join_message(&topic, table).to_string()))
            .await?;

        let (tx, rx) = broadcast::channel(64);
        let table = table.to_string();
        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);

        tokio::spawn(async move {
            let mut next_ref: u64 = 2;
            loop {
                tokio::select! {
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            trace!("realtime frame on {}: {}", topic, text);
                            if let Some(change) = parse_change(&text, &table) {
                                // No receivers left means everyone unsubscribed.
                                if tx.send(change).is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!("realtime socket for {} closed: {:?}", topic, frame);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("realtime socket for {} failed: {}", topic, e);
                            break;
                        }
                        None => break,
                    },
                    _ = heartbeat.tick() => {
                        if tx.receiver_count() == 0 {
                            break;
                        }
                        let beat = Message::Text(heartbeat_message(next_ref).to_string());
                        next_ref += 1;
                        if let Err(e) = write.send(beat).await {
                            warn!("realtime heartbeat for {} failed: {}", topic, e);
                            break;
                        }
                    }
                }
            }
            // Best effort; the peer may already be gone.
            let _ = write.close().await;
            debug!("realtime subscription for {} ended", topic);
        });

        Ok(rx)
    }
}
