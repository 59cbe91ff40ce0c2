//! Low-level transport client for the remote debugging channel.
//!
//! Opens one WebSocket to a page target and provides command/reply
//! correlation with support for asynchronous push events. Commands carry
//! monotonically increasing ids that are never reused within a session; one
//! background reader task demultiplexes incoming frames:
//!
//! - frames with an `id` resolve the matching pending waiter,
//! - frames without an `id` are events, forwarded to the event channel (or
//!   dropped when nobody listens),
//! - a frame whose `id` matches no pending or abandoned command poisons the
//!   client: the channel is no longer trustworthy and every subsequent send
//!   fails with the protocol diagnostic.
//!
//! Replies are matched strictly by id, not send order, so out-of-order
//! replies are handled correctly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::BrowserError;

/// Default per-command reply timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Pending waiters keyed by command id. `None` marks a command whose caller
/// timed out: its reply, should it still arrive, is dropped without being
/// treated as a correlation violation.
type PendingMap = HashMap<u64, Option<oneshot::Sender<CommandReply>>>;

/// A push event received from the page (no correlation id).
#[derive(Debug, Clone)]
pub struct CdpEvent {
    /// The event method name (e.g. "Page.loadEventFired").
    pub method: String,
    pub params: Value,
}

/// An outbound command frame.
#[derive(Debug, Clone, serde::Serialize)]
struct CommandFrame {
    id: u64,
    method: String,
    params: Value,
}

/// A correlated reply to one command.
#[derive(Debug, Clone)]
pub struct CommandReply {
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<RemoteErrorBody>,
}

/// Error object carried in a reply.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RemoteErrorBody {
    pub code: i64,
    pub message: String,
    pub data: Option<String>,
}

/// Transport client owning the WebSocket channel to one page target.
///
/// All mutable counters (the correlation id above all) are fields of this
/// instance, so independent sessions never interfere.
pub struct CdpTransport {
    /// Endpoint the channel was opened against, kept for diagnostics.
    endpoint: String,
    next_id: AtomicU64,
    pending: Arc<Mutex<PendingMap>>,
    /// Set by the reader task on a correlation violation. Once set, the
    /// session is unusable and every send fails with this detail.
    poison: Arc<StdMutex<Option<String>>>,
    writer: Mutex<WsSink>,
    event_rx: mpsc::UnboundedReceiver<CdpEvent>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl CdpTransport {
    /// Open the WebSocket channel to a page target.
    ///
    /// The `ws_url` is the target's debugger URL as reported by the
    /// discovery endpoint (`ws://host:port/devtools/page/{target_id}`).
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        tracing::info!(url = ws_url, "opening remote debugging channel");

        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| BrowserError::ConnectionFailed {
                url: ws_url.to_string(),
                reason: e.to_string(),
            })?;

        let (writer, reader) = ws_stream.split();

        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));
        let poison: Arc<StdMutex<Option<String>>> = Arc::new(StdMutex::new(None));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let reader_handle = tokio::spawn(Self::read_loop(
            reader,
            Arc::clone(&pending),
            Arc::clone(&poison),
            event_tx,
        ));

        Ok(Self {
            endpoint: ws_url.to_string(),
            next_id: AtomicU64::new(1),
            pending,
            poison,
            writer: Mutex::new(writer),
            event_rx,
            reader_handle,
        })
    }

    /// Send a command and wait for its reply with the default timeout.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        self.send_with_timeout(method, params, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Send a command and wait for its reply.
    ///
    /// Allocates the next correlation id, registers the pending waiter
    /// before writing the frame (no race with a fast reply), then suspends
    /// until the reply arrives or `timeout` elapses. A reply carrying an
    /// error object is surfaced as [`BrowserError::Remote`].
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, BrowserError> {
        self.check_poison()?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = serde_json::to_string(&CommandFrame {
            id,
            method: method.to_string(),
            params,
        })
        .map_err(|e| BrowserError::Protocol {
            detail: format!("failed to serialize command: {e}"),
        })?;

        tracing::debug!(id, method, "sending command");

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, Some(tx));
        }

        if let Err(e) = self
            .writer
            .lock()
            .await
            .send(Message::Text(frame))
            .await
        {
            self.pending.lock().await.remove(&id);
            return Err(BrowserError::ConnectionFailed {
                url: self.endpoint.clone(),
                reason: format!("failed to write frame: {e}"),
            });
        }

        let reply = match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                // Abandon the waiter but keep the id registered: a late
                // reply must be dropped quietly, not treated as unmatched.
                // (If the reply raced in already, the entry is gone and
                // there is nothing to abandon.)
                let mut pending = self.pending.lock().await;
                if let Some(waiter) = pending.get_mut(&id) {
                    *waiter = None;
                }
                drop(pending);
                return Err(BrowserError::Timeout {
                    method: method.to_string(),
                    duration: timeout,
                });
            }
            Ok(Err(_)) => return Err(self.disconnect_error()),
            Ok(Ok(reply)) => reply,
        };

        if let Some(err) = reply.error {
            return Err(BrowserError::Remote {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }

        Ok(reply.result.unwrap_or(Value::Null))
    }

    /// Receive the next push event. Returns `None` once the channel is
    /// closed.
    pub async fn next_event(&mut self) -> Option<CdpEvent> {
        self.event_rx.recv().await
    }

    /// Enable a remote domain (e.g. "Page", "DOM", "Runtime"). Domains must
    /// be enabled before their commands and events are available.
    pub async fn enable_domain(&self, domain: &str) -> Result<(), BrowserError> {
        let method = format!("{domain}.enable");
        self.send(&method, serde_json::json!({})).await?;
        Ok(())
    }

    /// Close the channel. Pending waiters fail once the reader observes the
    /// closed socket.
    pub async fn close(self) {
        let _ = self.writer.lock().await.send(Message::Close(None)).await;
        self.reader_handle.abort();
        tracing::info!(url = %self.endpoint, "remote debugging channel closed");
    }

    fn check_poison(&self) -> Result<(), BrowserError> {
        let guard = self.poison.lock().unwrap_or_else(|p| p.into_inner());
        match guard.as_ref() {
            Some(detail) => Err(BrowserError::Protocol {
                detail: detail.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Classify a dead waiter channel: protocol poisoning if the reader
    /// flagged a violation, otherwise a dropped connection.
    fn disconnect_error(&self) -> BrowserError {
        match self.check_poison() {
            Err(e) => e,
            Ok(()) => BrowserError::ConnectionFailed {
                url: self.endpoint.clone(),
                reason: "channel closed before a reply arrived".to_string(),
            },
        }
    }

    /// Background task: read frames and dispatch them.
    async fn read_loop(
        mut reader: WsSource,
        pending: Arc<Mutex<PendingMap>>,
        poison: Arc<StdMutex<Option<String>>>,
        event_tx: mpsc::UnboundedSender<CdpEvent>,
    ) {
        while let Some(msg_result) = reader.next().await {
            let msg = match msg_result {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(error = %e, "channel read error, stopping reader");
                    break;
                }
            };

            let text = match msg {
                Message::Text(t) => t,
                Message::Binary(b) => match String::from_utf8(b) {
                    Ok(s) => s,
                    Err(_) => continue,
                },
                Message::Close(_) => {
                    tracing::info!("channel closed by remote");
                    break;
                }
                _ => continue,
            };

            let json: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "discarding unparseable frame");
                    continue;
                }
            };

            if let Some(reply) = parse_reply(&json) {
                let mut guard = pending.lock().await;
                match guard.remove(&reply.id) {
                    Some(Some(tx)) => {
                        let _ = tx.send(reply);
                    }
                    Some(None) => {
                        tracing::debug!(id = reply.id, "dropping reply for timed-out command");
                    }
                    None => {
                        // A reply we never asked for: correlation bug on our
                        // side or a misbehaving remote. Either way the
                        // channel can no longer be trusted.
                        let detail =
                            format!("received reply for unknown command id {}", reply.id);
                        tracing::error!(id = reply.id, "{detail}; poisoning session");
                        *poison.lock().unwrap_or_else(|p| p.into_inner()) =
                            Some(detail);
                        guard.clear();
                        break;
                    }
                }
            } else if let Some(event) = parse_event(&json) {
                // Nobody listening is fine; the event is dropped.
                let _ = event_tx.send(event);
            } else {
                tracing::warn!("frame is neither a reply nor an event");
            }
        }

        // Fail anything still waiting when the reader stops.
        pending.lock().await.clear();
    }
}

// ---------------------------------------------------------------------------
// Frame helpers
// ---------------------------------------------------------------------------

/// Build a command frame (used by tests to validate the wire shape).
pub fn build_command(id: u64, method: &str, params: Value) -> Value {
    serde_json::json!({
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Parse a frame as a command reply. Replies carry an `id`.
pub fn parse_reply(json: &Value) -> Option<CommandReply> {
    let id = json.get("id")?.as_u64()?;
    Some(CommandReply {
        id,
        result: json.get("result").cloned(),
        error: json
            .get("error")
            .and_then(|e| serde_json::from_value(e.clone()).ok()),
    })
}

/// Parse a frame as a push event. Events carry a `method` and no `id`.
pub fn parse_event(json: &Value) -> Option<CdpEvent> {
    if json.get("id").is_some() {
        return None;
    }
    let method = json.get("method")?.as_str()?.to_string();
    let params = json.get("params").cloned().unwrap_or(Value::Null);
    Some(CdpEvent { method, params })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command_shape() {
        let frame = build_command(
            7,
            "Runtime.evaluate",
            serde_json::json!({"expression": "1 + 1", "returnByValue": true}),
        );
        assert_eq!(frame["id"], 7);
        assert_eq!(frame["method"], "Runtime.evaluate");
        assert_eq!(frame["params"]["expression"], "1 + 1");
    }

    #[test]
    fn test_parse_reply_success() {
        let json = serde_json::json!({
            "id": 3,
            "result": { "result": { "type": "number", "value": 2 } }
        });
        let reply = parse_reply(&json).unwrap();
        assert_eq!(reply.id, 3);
        assert!(reply.result.is_some());
        assert!(reply.error.is_none());
    }

    #[test]
    fn test_parse_reply_error() {
        let json = serde_json::json!({
            "id": 4,
            "error": { "code": -32601, "message": "Method not found" }
        });
        let reply = parse_reply(&json).unwrap();
        let err = reply.error.unwrap();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "Method not found");
        assert!(err.data.is_none());
    }

    #[test]
    fn test_parse_reply_requires_id() {
        let json = serde_json::json!({ "method": "Page.loadEventFired", "params": {} });
        assert!(parse_reply(&json).is_none());
    }

    #[test]
    fn test_parse_event_basic() {
        let json = serde_json::json!({
            "method": "Page.frameStoppedLoading",
            "params": { "frameId": "F1" }
        });
        let event = parse_event(&json).unwrap();
        assert_eq!(event.method, "Page.frameStoppedLoading");
        assert_eq!(event.params["frameId"], "F1");
    }

    #[test]
    fn test_parse_event_rejects_frames_with_id() {
        // A frame with an id is a reply even if it also carries a method.
        let json = serde_json::json!({ "id": 1, "method": "Page.navigate", "result": {} });
        assert!(parse_event(&json).is_none());
    }

    #[test]
    fn test_parse_event_defaults_missing_params() {
        let json = serde_json::json!({ "method": "Page.domContentEventFired" });
        let event = parse_event(&json).unwrap();
        assert_eq!(event.params, Value::Null);
    }

    #[test]
    fn test_command_frame_serialization() {
        let frame = CommandFrame {
            id: 12,
            method: "Page.enable".to_string(),
            params: serde_json::json!({}),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["id"], 12);
        assert_eq!(json["method"], "Page.enable");
        assert_eq!(json["params"], serde_json::json!({}));
    }

    #[test]
    fn test_remote_error_body_deserialization() {
        let err: RemoteErrorBody = serde_json::from_str(
            r#"{"code": -32000, "message": "Target closed", "data": "detached"}"#,
        )
        .unwrap();
        assert_eq!(err.code, -32000);
        assert_eq!(err.data.as_deref(), Some("detached"));
    }
}
