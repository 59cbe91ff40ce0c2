//! Error types for the gleaner-browser crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while driving the remote page.
///
/// The taxonomy separates fatal session errors (discovery, connection,
/// protocol violations) from per-action errors callers may recover from
/// (timeouts, remote command errors, script evaluation errors).
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The discovery endpoint returned an empty target list.
    #[error("no debuggable page targets available")]
    NoTarget,

    /// Querying the discovery endpoint failed.
    #[error("target discovery at {endpoint} failed: {reason}")]
    Discovery { endpoint: String, reason: String },

    /// Failed to establish or keep the WebSocket channel to the page.
    #[error("failed to connect to remote debugging channel at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// A correlation or framing violation on the channel. Indicates a
    /// client bug or remote incompatibility; the session is unusable.
    #[error("protocol violation: {detail}")]
    Protocol { detail: String },

    /// A command did not receive its reply within the allotted time.
    #[error("command '{method}' timed out after {duration:?}")]
    Timeout { method: String, duration: Duration },

    /// The remote side answered a command with an error object.
    #[error("remote error {code}: {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<String>,
    },

    /// Page-context evaluation reported an error. Distinct from transport
    /// failures: callers may degrade to partial results instead of
    /// aborting.
    #[error("page script error: {message}")]
    Script { message: String },

    /// A DOM element the caller named does not exist.
    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },
}

impl BrowserError {
    /// Whether this error makes the whole session unusable. Fatal errors
    /// abort the run; the rest are per-action and may be degraded around.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BrowserError::NoTarget
                | BrowserError::Discovery { .. }
                | BrowserError::ConnectionFailed { .. }
                | BrowserError::Protocol { .. }
        )
    }
}
