//! Page session: the script bridge and interaction primitives on top of the
//! transport client.
//!
//! A [`PageSession`] owns one [`CdpTransport`] and exposes:
//!
//! - `evaluate` -- the script bridge: run a self-contained page-context
//!   script and return its (possibly promise) value, surfacing page errors
//!   as the recoverable [`BrowserError::Script`] kind,
//! - DOM helpers (selector query, file-input population),
//! - raw input dispatch (mouse move/press/release, wheel, per-character
//!   keys) for callers that compose their own interaction timing,
//! - region-clipped screenshots.
//!
//! One session drives one page; sessions are never shared across extraction
//! runs.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde_json::Value;

use gleaner_types::Region;

use crate::cdp::CdpTransport;
use crate::discovery::{discover_targets, select_target};
use crate::error::BrowserError;

/// Opaque handle to a DOM node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub i64);

/// Bounding box of a DOM element in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Domains this client depends on; each is enabled at connect time and any
/// failure to enable is fatal.
const REQUIRED_DOMAINS: [&str; 3] = ["Page", "DOM", "Runtime"];

/// A connected page session.
pub struct PageSession {
    transport: CdpTransport,
}

impl std::fmt::Debug for PageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSession").finish_non_exhaustive()
    }
}

impl PageSession {
    /// Discover targets on `host:port`, pick one by `keyword`, and attach.
    ///
    /// Target selection prefers a case-insensitive substring match on title
    /// or URL, falling back to the first available target. An empty target
    /// list is [`BrowserError::NoTarget`].
    pub async fn connect(
        host: &str,
        port: u16,
        keyword: Option<&str>,
    ) -> Result<Self, BrowserError> {
        let targets = discover_targets(host, port).await?;
        let target = select_target(&targets, keyword).ok_or(BrowserError::NoTarget)?;
        tracing::info!(
            title = %target.title,
            url = %target.url,
            "attaching to page target"
        );

        let ws_url = target.web_socket_debugger_url.clone().ok_or_else(|| {
            BrowserError::Discovery {
                endpoint: format!("http://{host}:{port}/json"),
                reason: format!(
                    "selected target '{}' exposes no debugger URL (another client attached?)",
                    target.title
                ),
            }
        })?;

        Self::attach(&ws_url).await
    }

    /// Attach directly to a known debugger URL and enable the required
    /// domains. Failing to enable any domain is a fatal connection error.
    pub async fn attach(ws_url: &str) -> Result<Self, BrowserError> {
        let transport = CdpTransport::connect(ws_url).await?;

        for domain in REQUIRED_DOMAINS {
            transport
                .enable_domain(domain)
                .await
                .map_err(|e| BrowserError::ConnectionFailed {
                    url: ws_url.to_string(),
                    reason: format!("failed to enable {domain} domain: {e}"),
                })?;
        }

        Ok(Self { transport })
    }

    pub fn transport(&self) -> &CdpTransport {
        &self.transport
    }

    /// Mutable access to the transport, e.g. to drain push events with
    /// [`CdpTransport::next_event`].
    pub fn transport_mut(&mut self) -> &mut CdpTransport {
        &mut self.transport
    }

    /// Close the underlying channel.
    pub async fn close(self) {
        self.transport.close().await;
    }

    // -----------------------------------------------------------------------
    // Script bridge
    // -----------------------------------------------------------------------

    /// Evaluate a self-contained script in the page context and return its
    /// value.
    ///
    /// Promises are awaited and results returned by value, so scripts must
    /// be immediately-invoked expressions with no external closures (they
    /// run in an isolated page realm). Page-side failures -- a remote error
    /// on the evaluate command or an exception inside the script -- become
    /// [`BrowserError::Script`], a recoverable kind distinct from transport
    /// failures.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = match self
            .transport
            .send("Runtime.evaluate", build_evaluate_params(expression))
            .await
        {
            Ok(value) => value,
            Err(BrowserError::Remote { message, .. }) => {
                return Err(BrowserError::Script { message })
            }
            Err(other) => return Err(other),
        };

        if let Some(message) = exception_message(&result) {
            return Err(BrowserError::Script { message });
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    // -----------------------------------------------------------------------
    // DOM helpers
    // -----------------------------------------------------------------------

    async fn document_root(&self) -> Result<NodeId, BrowserError> {
        let result = self
            .transport
            .send("DOM.getDocument", serde_json::json!({}))
            .await?;
        result
            .get("root")
            .and_then(|r| r.get("nodeId"))
            .and_then(|n| n.as_i64())
            .map(NodeId)
            .ok_or_else(|| BrowserError::Protocol {
                detail: "DOM.getDocument returned no root nodeId".to_string(),
            })
    }

    /// Find the first element matching a CSS selector. `Ok(None)` when no
    /// element matches.
    pub async fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, BrowserError> {
        let root = self.document_root().await?;
        let result = self
            .transport
            .send(
                "DOM.querySelector",
                serde_json::json!({ "nodeId": root.0, "selector": selector }),
            )
            .await?;

        // The remote reports "no match" as nodeId 0.
        let node_id = result.get("nodeId").and_then(|n| n.as_i64()).unwrap_or(0);
        Ok((node_id != 0).then_some(NodeId(node_id)))
    }

    /// Populate a file input element with local paths. This is how file
    /// payloads enter the page: the OS file chooser never opens.
    pub async fn set_file_input(
        &self,
        selector: &str,
        files: &[String],
    ) -> Result<(), BrowserError> {
        let node = self
            .query_selector(selector)
            .await?
            .ok_or_else(|| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })?;
        self.transport
            .send(
                "DOM.setFileInputFiles",
                serde_json::json!({ "files": files, "nodeId": node.0 }),
            )
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Input dispatch
    // -----------------------------------------------------------------------

    /// Dispatch a mouse movement to (x, y).
    pub async fn mouse_move(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.transport
            .send(
                "Input.dispatchMouseEvent",
                build_mouse_params("mouseMoved", x, y),
            )
            .await?;
        Ok(())
    }

    /// Dispatch a left-button press at (x, y).
    pub async fn mouse_press(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.transport
            .send(
                "Input.dispatchMouseEvent",
                build_mouse_params("mousePressed", x, y),
            )
            .await?;
        Ok(())
    }

    /// Dispatch a left-button release at (x, y).
    pub async fn mouse_release(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.transport
            .send(
                "Input.dispatchMouseEvent",
                build_mouse_params("mouseReleased", x, y),
            )
            .await?;
        Ok(())
    }

    /// Dispatch a wheel scroll at (x, y). Positive `delta_y` scrolls down.
    pub async fn wheel(&self, x: f64, y: f64, delta_y: f64) -> Result<(), BrowserError> {
        self.transport
            .send(
                "Input.dispatchMouseEvent",
                build_wheel_params(x, y, delta_y),
            )
            .await?;
        Ok(())
    }

    /// Dispatch one typed character (keyDown + keyUp).
    pub async fn key_char(&self, ch: char) -> Result<(), BrowserError> {
        let text = ch.to_string();
        self.transport
            .send("Input.dispatchKeyEvent", build_key_params("keyDown", &text))
            .await?;
        self.transport
            .send("Input.dispatchKeyEvent", build_key_params("keyUp", &text))
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Screenshots
    // -----------------------------------------------------------------------

    /// Capture the page (or a clipped region of it) as PNG bytes.
    pub async fn screenshot_region(
        &self,
        region: Option<&Region>,
    ) -> Result<Vec<u8>, BrowserError> {
        let result = self
            .transport
            .send("Page.captureScreenshot", build_screenshot_params(region))
            .await?;

        let data = result
            .get("data")
            .and_then(|d| d.as_str())
            .ok_or_else(|| BrowserError::Protocol {
                detail: "Page.captureScreenshot returned no data field".to_string(),
            })?;

        B64.decode(data).map_err(|e| BrowserError::Protocol {
            detail: format!("failed to decode screenshot base64: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Parameter builders and pure helpers
// ---------------------------------------------------------------------------

/// Build `Runtime.evaluate` parameters. Promises are awaited so the bridge
/// can run asynchronous page work in one round trip.
pub fn build_evaluate_params(expression: &str) -> Value {
    serde_json::json!({
        "expression": expression,
        "returnByValue": true,
        "awaitPromise": true,
    })
}

/// Build `Input.dispatchMouseEvent` parameters for a left-button event.
pub fn build_mouse_params(event_type: &str, x: f64, y: f64) -> Value {
    serde_json::json!({
        "type": event_type,
        "x": x,
        "y": y,
        "button": "left",
        "clickCount": 1,
    })
}

/// Build `Input.dispatchMouseEvent` parameters for a wheel scroll.
pub fn build_wheel_params(x: f64, y: f64, delta_y: f64) -> Value {
    serde_json::json!({
        "type": "mouseWheel",
        "x": x,
        "y": y,
        "deltaX": 0.0,
        "deltaY": delta_y,
    })
}

/// Build `Input.dispatchKeyEvent` parameters for one character.
pub fn build_key_params(event_type: &str, text: &str) -> Value {
    serde_json::json!({
        "type": event_type,
        "text": text,
        "unmodifiedText": text,
        "key": text,
    })
}

/// Build `Page.captureScreenshot` parameters, clipped when a region is
/// given.
pub fn build_screenshot_params(region: Option<&Region>) -> Value {
    match region {
        Some(r) => serde_json::json!({
            "format": "png",
            "clip": {
                "x": r.x,
                "y": r.y,
                "width": r.width,
                "height": r.height,
                "scale": 1.0,
            },
        }),
        None => serde_json::json!({ "format": "png" }),
    }
}

/// Extract the exception message from a `Runtime.evaluate` result, if the
/// script threw.
pub fn exception_message(result: &Value) -> Option<String> {
    let details = result.get("exceptionDetails")?;
    let message = details
        .get("exception")
        .and_then(|e| e.get("description"))
        .and_then(|d| d.as_str())
        .or_else(|| details.get("text").and_then(|t| t.as_str()))
        .unwrap_or("unknown page exception");
    Some(message.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
