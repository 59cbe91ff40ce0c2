//! The engine's seam to the page: everything the loops and the resolver
//! need from a connected session.
//!
//! [`PageSurface`] keeps the engine testable with a scripted mock and keeps
//! interaction *timing* (human-like pacing, budgets, retries) out of the
//! browser layer, which only dispatches protocol-faithful primitives.

use async_trait::async_trait;
use serde_json::Value;

use gleaner_browser::{BrowserError, PageSession};
use gleaner_types::Region;

/// Page operations the engine drives.
#[async_trait]
pub trait PageSurface: Send + Sync {
    /// Evaluate a self-contained script in the page context.
    async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError>;

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), BrowserError>;
    async fn mouse_press(&self, x: f64, y: f64) -> Result<(), BrowserError>;
    async fn mouse_release(&self, x: f64, y: f64) -> Result<(), BrowserError>;
    async fn wheel(&self, x: f64, y: f64, delta_y: f64) -> Result<(), BrowserError>;
    async fn key_char(&self, ch: char) -> Result<(), BrowserError>;

    /// Populate a file input element with local paths.
    async fn set_file_input(&self, selector: &str, files: &[String])
        -> Result<(), BrowserError>;

    /// Capture the page (or a clipped region) as PNG bytes.
    async fn screenshot_region(&self, region: Option<&Region>)
        -> Result<Vec<u8>, BrowserError>;
}

#[async_trait]
impl PageSurface for PageSession {
    async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        PageSession::evaluate(self, expression).await
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        PageSession::mouse_move(self, x, y).await
    }

    async fn mouse_press(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        PageSession::mouse_press(self, x, y).await
    }

    async fn mouse_release(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        PageSession::mouse_release(self, x, y).await
    }

    async fn wheel(&self, x: f64, y: f64, delta_y: f64) -> Result<(), BrowserError> {
        PageSession::wheel(self, x, y, delta_y).await
    }

    async fn key_char(&self, ch: char) -> Result<(), BrowserError> {
        PageSession::key_char(self, ch).await
    }

    async fn set_file_input(
        &self,
        selector: &str,
        files: &[String],
    ) -> Result<(), BrowserError> {
        PageSession::set_file_input(self, selector, files).await
    }

    async fn screenshot_region(
        &self,
        region: Option<&Region>,
    ) -> Result<Vec<u8>, BrowserError> {
        PageSession::screenshot_region(self, region).await
    }
}
