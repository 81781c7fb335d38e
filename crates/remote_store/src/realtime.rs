//! Phoenix-channel client for the store's realtime `postgres_changes` feed.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::protocol::ChangeEvent;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::{ChangeFeed, ProviderError};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const FEED_BUFFER: usize = 256;
const PROTOCOL_VSN: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

/// `https://x` → `wss://x/realtime/v1/websocket?apikey=..&vsn=1.0.0`.
pub fn websocket_url(base_url: &str, api_key: &str) -> Result<String, ProviderError> {
    let mut url = Url::parse(base_url)
        .map_err(|err| ProviderError::new(format!("invalid store url {base_url}: {err}")))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(ProviderError::new(format!(
                "store url must start with http:// or https://, got {other}://"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ProviderError::new(format!("cannot derive websocket url from {base_url}")))?;
    let path = format!("{}/realtime/v1/websocket", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", api_key)
        .append_pair("vsn", PROTOCOL_VSN);
    Ok(url.to_string())
}

pub fn topic(channel: &str) -> String {
    format!("realtime:{channel}")
}

pub fn join_message(channel: &str, table: &str, api_key: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic(channel),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "*", "schema": "public", "table": table }
                ]
            },
            "access_token": api_key
        }),
        reference: Some("1".to_string()),
    }
}

fn heartbeat_message(reference: u64) -> PhoenixMessage {
    PhoenixMessage {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

/// Change carried by a `postgres_changes` message; `None` for every other event.
pub fn decode_change(message: &PhoenixMessage) -> Option<ChangeEvent> {
    if message.event != "postgres_changes" {
        return None;
    }
    let data = message.payload.get("data")?;
    match serde_json::from_value::<ChangeEvent>(data.clone()) {
        Ok(change) => Some(change),
        Err(err) => {
            warn!(topic = %message.topic, %err, "realtime: undecodable change payload");
            None
        }
    }
}

fn encode(message: &PhoenixMessage) -> Result<Message, ProviderError> {
    serde_json::to_string(message)
        .map(Message::Text)
        .map_err(|err| ProviderError::new(format!("failed to encode realtime message: {err}")))
}

pub async fn connect(
    base_url: &str,
    api_key: &str,
    channel: &str,
    table: &str,
) -> Result<ChangeFeed, ProviderError> {
    let ws_url = websocket_url(base_url, api_key)?;
    let (ws_stream, _) = connect_async(ws_url.as_str())
        .await
        .map_err(|err| ProviderError::new(format!("failed to connect realtime websocket: {err}")))?;
    let (mut ws_writer, mut ws_reader) = ws_stream.split();

    ws_writer
        .send(encode(&join_message(channel, table, api_key))?)
        .await
        .map_err(|err| ProviderError::new(format!("failed to join realtime channel: {err}")))?;
    info!(channel, table, "realtime: joined channel");

    let (tx, rx) = mpsc::channel(FEED_BUFFER);
    let channel = channel.to_string();
    tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut next_ref: u64 = 2;

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = heartbeat.tick() => {
                    let sent = match encode(&heartbeat_message(next_ref)) {
                        Ok(frame) => ws_writer.send(frame).await.is_ok(),
                        Err(_) => false,
                    };
                    if !sent {
                        warn!(channel = %channel, "realtime: heartbeat failed");
                        break;
                    }
                    next_ref += 1;
                }
                frame = ws_reader.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<PhoenixMessage>(&text) {
                            Ok(message) => {
                                if message.event == "phx_reply"
                                    && message.payload.get("status").and_then(Value::as_str) == Some("error")
                                {
                                    warn!(channel = %channel, payload = %message.payload, "realtime: channel rejected request");
                                }
                                if let Some(change) = decode_change(&message) {
                                    debug!(channel = %channel, kind = ?change.kind, "realtime: change received");
                                    if tx.send(change).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(err) => warn!(channel = %channel, %err, "realtime: invalid message"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(channel = %channel, %err, "realtime: websocket receive failed");
                        break;
                    }
                }
            }
        }

        let _ = ws_writer.close().await;
        info!(channel = %channel, "realtime: feed closed");
    });

    Ok(ReceiverStream::new(rx).boxed())
}

#[cfg(test)]
#[path = "tests/realtime_tests.rs"]
mod tests;
