//! Integration tests for the transport client against an in-process
//! scripted WebSocket server.
//!
//! Each test spins up a local server that plays one side of the remote
//! debugging channel, exercising correlation semantics end to end:
//! out-of-order replies, events interleaving with command traffic, reply
//! timeouts, and poisoning on correlation violations.

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use gleaner_browser::cdp::CdpTransport;
use gleaner_browser::session::PageSession;
use gleaner_browser::BrowserError;

type ServerSocket = WebSocketStream<TcpStream>;

/// Start a one-connection server running `script`, returning its ws URL.
async fn start_server<F, Fut>(script: F) -> String
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let socket = accept_async(stream).await.expect("websocket handshake");
            script(socket).await;
        }
    });

    format!("ws://{addr}")
}

/// Read the next text frame as JSON, skipping control frames.
async fn next_frame(socket: &mut ServerSocket) -> Value {
    while let Some(msg) = socket.next().await {
        if let Ok(Message::Text(text)) = msg {
            return serde_json::from_str(&text).expect("client frame is JSON");
        }
    }
    panic!("connection closed while awaiting a frame");
}

async fn send_json(socket: &mut ServerSocket, value: Value) {
    socket
        .send(Message::Text(value.to_string()))
        .await
        .expect("server send");
}

#[tokio::test]
async fn out_of_order_replies_resolve_by_id() {
    let url = start_server(|mut socket| async move {
        let first = next_frame(&mut socket).await;
        let second = next_frame(&mut socket).await;
        // Answer the second command first; correlation is by id, not by
        // send order.
        send_json(
            &mut socket,
            json!({ "id": second["id"], "result": { "echo": second["method"] } }),
        )
        .await;
        send_json(
            &mut socket,
            json!({ "id": first["id"], "result": { "echo": first["method"] } }),
        )
        .await;
    })
    .await;

    let transport = CdpTransport::connect(&url).await.expect("connect");

    let (first, second) = tokio::join!(
        transport.send("First.command", json!({})),
        transport.send("Second.command", json!({})),
    );

    assert_eq!(first.expect("first reply")["echo"], "First.command");
    assert_eq!(second.expect("second reply")["echo"], "Second.command");
}

#[tokio::test]
async fn event_frames_never_resolve_waiters() {
    let url = start_server(|mut socket| async move {
        let frame = next_frame(&mut socket).await;
        // Interleave an event before the reply; the waiter must see the
        // reply, and the event must come out of the event channel.
        send_json(
            &mut socket,
            json!({ "method": "Feed.updated", "params": { "count": 3 } }),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        send_json(
            &mut socket,
            json!({ "id": frame["id"], "result": { "ok": true } }),
        )
        .await;
    })
    .await;

    let mut transport = CdpTransport::connect(&url).await.expect("connect");

    let result = transport
        .send("Runtime.evaluate", json!({ "expression": "1" }))
        .await
        .expect("command resolves with its reply, not the event");
    assert_eq!(result["ok"], true);

    let event = transport.next_event().await.expect("event delivered");
    assert_eq!(event.method, "Feed.updated");
    assert_eq!(event.params["count"], 3);
}

#[tokio::test]
async fn reply_for_unknown_id_poisons_session() {
    let url = start_server(|mut socket| async move {
        let _ = next_frame(&mut socket).await;
        // Reply with an id we were never sent: a correlation violation.
        send_json(&mut socket, json!({ "id": 777, "result": {} })).await;
        // Keep the socket open so the failure is attributable to the
        // violation, not a dropped connection.
        tokio::time::sleep(Duration::from_secs(2)).await;
    })
    .await;

    let transport = CdpTransport::connect(&url).await.expect("connect");

    let err = transport
        .send("Page.enable", json!({}))
        .await
        .expect_err("pending command fails on poisoning");
    assert!(
        matches!(err, BrowserError::Protocol { .. }),
        "expected Protocol error, got: {err:?}"
    );

    // The session stays poisoned for every subsequent send.
    let err = transport
        .send("Page.enable", json!({}))
        .await
        .expect_err("poisoned session rejects new commands");
    assert!(matches!(err, BrowserError::Protocol { .. }));
}

#[tokio::test]
async fn timed_out_command_late_reply_is_dropped_quietly() {
    let url = start_server(|mut socket| async move {
        let first = next_frame(&mut socket).await;
        // Withhold the reply past the client timeout, then deliver it late.
        tokio::time::sleep(Duration::from_millis(150)).await;
        send_json(
            &mut socket,
            json!({ "id": first["id"], "result": { "late": true } }),
        )
        .await;
        // The session must still be healthy afterwards.
        let second = next_frame(&mut socket).await;
        send_json(
            &mut socket,
            json!({ "id": second["id"], "result": { "ok": true } }),
        )
        .await;
    })
    .await;

    let transport = CdpTransport::connect(&url).await.expect("connect");

    let err = transport
        .send_with_timeout("Slow.command", json!({}), Duration::from_millis(50))
        .await
        .expect_err("command times out");
    assert!(
        matches!(err, BrowserError::Timeout { .. }),
        "expected Timeout, got: {err:?}"
    );

    // The late reply for the abandoned id is not a correlation violation.
    let result = transport
        .send("Next.command", json!({}))
        .await
        .expect("session survives a late reply");
    assert_eq!(result["ok"], true);
}

#[tokio::test]
async fn remote_error_reply_maps_to_remote_variant() {
    let url = start_server(|mut socket| async move {
        let frame = next_frame(&mut socket).await;
        send_json(
            &mut socket,
            json!({
                "id": frame["id"],
                "error": { "code": -32000, "message": "Target crashed" }
            }),
        )
        .await;
    })
    .await;

    let transport = CdpTransport::connect(&url).await.expect("connect");

    let err = transport
        .send("Page.navigate", json!({ "url": "https://wx.example" }))
        .await
        .expect_err("error reply surfaces");
    match err {
        BrowserError::Remote { code, message, .. } => {
            assert_eq!(code, -32000);
            assert_eq!(message, "Target crashed");
        }
        other => panic!("expected Remote error, got: {other:?}"),
    }
}

/// Reply OK to the three domain enables `PageSession::attach` issues.
async fn ack_domain_enables(socket: &mut ServerSocket) {
    for _ in 0..3 {
        let frame = next_frame(socket).await;
        let method = frame["method"].as_str().unwrap_or_default().to_string();
        assert!(
            method.ends_with(".enable"),
            "expected a domain enable, got: {method}"
        );
        send_json(socket, json!({ "id": frame["id"], "result": {} })).await;
    }
}

#[tokio::test]
async fn session_attach_enables_required_domains() {
    let url = start_server(|mut socket| async move {
        ack_domain_enables(&mut socket).await;
    })
    .await;

    PageSession::attach(&url).await.expect("attach succeeds");
}

#[tokio::test]
async fn session_attach_fails_when_domain_enable_fails() {
    let url = start_server(|mut socket| async move {
        let frame = next_frame(&mut socket).await;
        send_json(&mut socket, json!({ "id": frame["id"], "result": {} })).await;
        let frame = next_frame(&mut socket).await;
        send_json(
            &mut socket,
            json!({
                "id": frame["id"],
                "error": { "code": -32601, "message": "'DOM.enable' wasn't found" }
            }),
        )
        .await;
    })
    .await;

    let err = PageSession::attach(&url)
        .await
        .expect_err("attach aborts when an enable fails");
    assert!(
        matches!(err, BrowserError::ConnectionFailed { .. }),
        "enable failure is a fatal connection error, got: {err:?}"
    );
    assert!(err.is_fatal());
}

#[tokio::test]
async fn session_evaluate_returns_value_and_maps_exceptions() {
    let url = start_server(|mut socket| async move {
        ack_domain_enables(&mut socket).await;

        // First evaluate: a clean numeric result.
        let frame = next_frame(&mut socket).await;
        assert_eq!(frame["method"], "Runtime.evaluate");
        assert_eq!(frame["params"]["awaitPromise"], true);
        send_json(
            &mut socket,
            json!({
                "id": frame["id"],
                "result": { "result": { "type": "number", "value": 42 } }
            }),
        )
        .await;

        // Second evaluate: the script threw.
        let frame = next_frame(&mut socket).await;
        send_json(
            &mut socket,
            json!({
                "id": frame["id"],
                "result": {
                    "result": { "type": "object", "subtype": "error" },
                    "exceptionDetails": {
                        "text": "Uncaught",
                        "exception": {
                            "description": "ReferenceError: feed is not defined"
                        }
                    }
                }
            }),
        )
        .await;
    })
    .await;

    let session = PageSession::attach(&url).await.expect("attach");

    let value = session
        .evaluate("(function(){ return 42; })();")
        .await
        .expect("evaluate returns the value");
    assert_eq!(value, 42);

    let err = session
        .evaluate("(function(){ return feed; })();")
        .await
        .expect_err("exception becomes a script error");
    match &err {
        BrowserError::Script { message } => {
            assert!(message.contains("ReferenceError"), "message: {message}");
        }
        other => panic!("expected Script error, got: {other:?}"),
    }
    // Script errors are recoverable, not fatal.
    assert!(!err.is_fatal());
}
