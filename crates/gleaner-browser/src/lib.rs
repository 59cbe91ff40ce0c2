//! Remote-page driving layer for gleaner.
//!
//! Connects to an externally-launched browser exposing a remote debugging
//! port and drives one page target over its WebSocket channel:
//!
//! - **`discovery`**: queries the debugging HTTP endpoint for connectable
//!   targets and picks one by keyword.
//! - **`cdp`**: the transport client -- command/reply correlation with
//!   monotonic ids, event demultiplexing, per-command timeouts, and
//!   poisoning on correlation violations.
//! - **`session`**: the page session -- script bridge (`Runtime.evaluate`
//!   with promise await), DOM queries, raw input dispatch, and clipped
//!   screenshots.
//!
//! The browser itself is launched by an external collaborator with
//! `--remote-debugging-port`; this crate only connects:
//!
//! ```sh
//! google-chrome --remote-debugging-port=9222
//! ```
//!
//! # Example (conceptual)
//!
//! ```ignore
//! use gleaner_browser::PageSession;
//!
//! let session = PageSession::connect("localhost", 9222, Some("wx")).await?;
//! let title = session.evaluate("document.title").await?;
//! let png = session.screenshot_region(None).await?;
//! session.close().await;
//! ```

pub mod cdp;
pub mod discovery;
pub mod error;
pub mod session;

pub use cdp::{CdpEvent, CdpTransport};
pub use discovery::{discover_targets, select_target, TargetInfo};
pub use error::BrowserError;
pub use session::{ElementBox, NodeId, PageSession};
