//! Error types for the gleaner-engine crate.

use thiserror::Error;

use gleaner_browser::BrowserError;

/// Errors from the selector resolver, interaction loops, and injection
/// flow.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No candidate locator for the action resolved to a visible element
    /// within the budget. This is the dominant failure mode against UI
    /// drift; callers may skip the action, try an alternate path, or abort.
    #[error("no candidate locator resolved for action '{action}'")]
    NotFound {
        action: String,
        candidates_tried: Vec<String>,
    },

    /// The action name has no selector set configured -- a configuration
    /// bug, distinct from runtime UI drift.
    #[error("unknown UI action '{0}' (no selector set configured)")]
    UnknownAction(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    /// The external recognition function failed.
    #[error("recognition failed: {0}")]
    Recognition(String),

    /// Screen capture or region sampling failed.
    #[error("capture failed: {0}")]
    Capture(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the underlying session is unusable. Fatal errors abort the
    /// whole run; everything else is per-action and may be degraded around.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Browser(e) if e.is_fatal())
    }
}
