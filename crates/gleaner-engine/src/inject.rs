//! Content injection: drive the page's own add-content dialog.
//!
//! The write-side flow is structurally the read-side's twin -- every step
//! resolves a logical action through the selector book and interacts with
//! human pacing: open the dialog, pick the payload's sub-option, fill the
//! field, confirm. Error isolation is per item: a failed item is reported
//! and the batch continues; only session-fatal errors abort the batch.
//!
//! File payloads bypass the OS file chooser entirely -- the dialog's file
//! input element is populated directly over the protocol -- and are
//! validated against the supported extension set before any interaction.
//!
//! Confirmation is the one place with a bounded retry: after submitting, a
//! "source item" is polled for a fixed number of attempts with growing
//! delays. An item that was submitted but never confirmed is reported as
//! [`ItemOutcome::Unconfirmed`], distinct from both success and failure.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gleaner_types::{BatchReport, ItemOutcome, ItemReport, SelectorBook};

use crate::error::EngineError;
use crate::selector::{Pacing, Resolver};
use crate::surface::PageSurface;

/// File extensions the workspace accepts for upload.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "docx", "doc"];

/// One unit of content to inject.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A local file, populated into the dialog's file input.
    File(PathBuf),
    /// Website/video URLs, entered newline-separated into the URL field.
    Urls(Vec<String>),
    /// Pasted text content.
    Text(String),
}

impl Payload {
    /// Human-readable label for reports.
    pub fn label(&self) -> String {
        match self {
            Payload::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Payload::Urls(urls) => match urls.as_slice() {
                [only] => only.clone(),
                [first, rest @ ..] => format!("{first} (+{} more)", rest.len()),
                [] => "no URLs".to_string(),
            },
            Payload::Text(text) => format!("text ({} chars)", text.chars().count()),
        }
    }
}

/// Why a file payload is rejected before any page interaction, if it is.
fn file_rejection(path: &Path) -> Option<String> {
    if !path.exists() {
        return Some(format!("file not found: {}", path.display()));
    }
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
    {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => None,
        Some(ext) => Some(format!("unsupported extension .{ext}")),
        None => Some("file has no extension".to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct InjectOptions {
    /// Budget per logical action, divided across its candidate locators.
    pub action_budget: Duration,
    /// Short probe used to detect a dialog that is already open (new
    /// workspaces open it automatically).
    pub dialog_probe_budget: Duration,
    /// Confirmation poll: attempts and per-probe budget.
    pub confirm_attempts: u32,
    pub confirm_probe_budget: Duration,
    /// Delay before the first confirmation attempt; grows linearly with
    /// each subsequent attempt.
    pub confirm_initial_delay: Duration,
    /// Settle time after dialog transitions and submissions.
    pub settle_delay: Duration,
}

impl InjectOptions {
    pub fn from_config(config: &gleaner_types::InjectConfig) -> Self {
        Self {
            action_budget: Duration::from_millis(config.action_budget_ms),
            dialog_probe_budget: Duration::from_secs(3),
            confirm_attempts: config.confirm_attempts,
            confirm_probe_budget: Duration::from_secs(5),
            confirm_initial_delay: Duration::from_millis(config.confirm_initial_delay_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
        }
    }
}

/// Drives the injection flow against one page.
pub struct Injector<'a, S: PageSurface> {
    surface: &'a S,
    resolver: Resolver<'a, S>,
    options: InjectOptions,
}

impl<'a, S: PageSurface> Injector<'a, S> {
    pub fn new(
        surface: &'a S,
        book: &'a SelectorBook,
        pacing: Pacing,
        options: InjectOptions,
    ) -> Self {
        Self {
            surface,
            resolver: Resolver::new(surface, book, pacing),
            options,
        }
    }

    /// Inject a batch of payloads, isolating failures per item.
    ///
    /// Returns an error only for session-fatal conditions; everything else
    /// lands in the per-item outcomes, and the batch status distinguishes
    /// complete, partial, and failed explicitly.
    pub async fn inject_batch(&self, payloads: &[Payload]) -> Result<BatchReport, EngineError> {
        let mut items = Vec::with_capacity(payloads.len());

        for payload in payloads {
            let label = payload.label();
            tracing::info!(item = %label, "injecting item");
            match self.inject_one(payload).await {
                Ok(outcome) => {
                    tracing::info!(item = %label, ?outcome, "item done");
                    items.push(ItemReport { label, outcome });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(item = %label, error = %e, "item failed, continuing batch");
                    items.push(ItemReport {
                        label,
                        outcome: ItemOutcome::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(BatchReport::from_items(items))
    }

    /// Run the dialog flow for one payload.
    pub async fn inject_one(&self, payload: &Payload) -> Result<ItemOutcome, EngineError> {
        match payload {
            Payload::File(path) => {
                if let Some(reason) = file_rejection(path) {
                    return Ok(ItemOutcome::Skipped { reason });
                }
                self.ensure_dialog_open("pick-upload-file").await?;
                self.set_file_payload(path).await?;
            }
            Payload::Urls(urls) => {
                self.ensure_dialog_open("pick-website").await?;
                self.resolver
                    .click("pick-website", self.options.action_budget)
                    .await?;
                self.settle().await;
                self.resolver
                    .fill_fast("url-field", self.options.action_budget, &urls.join("\n"))
                    .await?;
                self.resolver
                    .click("confirm-insert", self.options.action_budget)
                    .await?;
            }
            Payload::Text(text) => {
                self.ensure_dialog_open("pick-paste-text").await?;
                self.resolver
                    .click("pick-paste-text", self.options.action_budget)
                    .await?;
                self.settle().await;
                self.resolver
                    .fill_fast("text-field", self.options.action_budget, text)
                    .await?;
                self.resolver
                    .click("confirm-insert", self.options.action_budget)
                    .await?;
            }
        }

        self.settle().await;
        if self.confirm_inserted().await? {
            Ok(ItemOutcome::Inserted)
        } else {
            Ok(ItemOutcome::Unconfirmed)
        }
    }

    /// Make sure the add-content dialog is open. New workspaces open it
    /// automatically, so the payload's sub-option is probed briefly first;
    /// only when it is absent is the dialog opened explicitly.
    async fn ensure_dialog_open(&self, probe_action: &str) -> Result<(), EngineError> {
        match self
            .resolver
            .resolve(probe_action, self.options.dialog_probe_budget)
            .await
        {
            Ok(_) => {
                tracing::debug!("dialog already open");
                return Ok(());
            }
            Err(EngineError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        self.resolver
            .click("open-add-dialog", self.options.action_budget)
            .await?;
        self.settle().await;
        Ok(())
    }

    /// Populate the dialog's file input. File inputs are typically hidden,
    /// so resolution is by presence, not visibility: candidates are tried
    /// in order until one exists.
    async fn set_file_payload(&self, path: &Path) -> Result<(), EngineError> {
        let file = path.to_string_lossy().into_owned();
        let candidates = self
            .resolver
            .book()
            .candidates("file-input")
            .ok_or_else(|| EngineError::UnknownAction("file-input".to_string()))?;

        for candidate in candidates {
            // Free-text locators cannot address an input element.
            if candidate.starts_with("text=") {
                continue;
            }
            match self
                .surface
                .set_file_input(candidate, std::slice::from_ref(&file))
                .await
            {
                Ok(()) => {
                    tracing::debug!(candidate = %candidate, file = %file, "file input populated");
                    return Ok(());
                }
                Err(gleaner_browser::BrowserError::ElementNotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::NotFound {
            action: "file-input".to_string(),
            candidates_tried: candidates.to_vec(),
        })
    }

    /// Poll for a source item confirming the payload landed: a fixed
    /// number of attempts with linearly growing delays, never unbounded.
    async fn confirm_inserted(&self) -> Result<bool, EngineError> {
        for attempt in 0..self.options.confirm_attempts {
            tokio::time::sleep(self.options.confirm_initial_delay * (attempt + 1)).await;
            match self
                .resolver
                .resolve("source-item", self.options.confirm_probe_budget)
                .await
            {
                Ok(_) => return Ok(true),
                Err(EngineError::NotFound { .. }) => {
                    tracing::debug!(attempt, "no source item yet");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    async fn settle(&self) {
        tokio::time::sleep(self.options.settle_delay).await;
    }
}
