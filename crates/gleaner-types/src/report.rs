//! Run reports returned to callers.
//!
//! Partial success is a first-class outcome: a run that degraded (some
//! cycles or items failed) is reported as [`RunStatus::Partial`], never
//! silently coerced to full success or full failure.

use serde::{Deserialize, Serialize};

use crate::unit::{ExtractedUnit, RawCapture};

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every cycle/item succeeded.
    Complete,
    /// Some cycles/items succeeded, some failed.
    Partial { completed: usize, failed: usize },
    /// Nothing succeeded.
    Failed,
}

impl RunStatus {
    /// Derive a status from success/failure counts.
    pub fn from_counts(completed: usize, failed: usize) -> Self {
        match (completed, failed) {
            (_, 0) => RunStatus::Complete,
            (0, _) => RunStatus::Failed,
            (c, f) => RunStatus::Partial {
                completed: c,
                failed: f,
            },
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, RunStatus::Complete)
    }
}

/// Result of a structural extraction run. Owned by the interaction loop
/// while running, handed to the caller when done; there is no long-lived
/// cache behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Harvest {
    /// Deduplicated units in first-seen (cycle) order.
    pub units: Vec<ExtractedUnit>,
    /// Reveal+extract cycles actually run (equals the configured maximum
    /// unless the run was cancelled).
    pub cycles_run: u32,
    #[serde(flatten)]
    pub status: RunStatus,
}

/// Result of a capture/recognition fallback run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRun {
    /// Every cycle, in order, including cycles whose recognized text matched
    /// the immediately preceding cycle.
    pub captures: Vec<RawCapture>,
    /// Cycles that produced text different from their immediate predecessor.
    pub new_content_cycles: usize,
    #[serde(flatten)]
    pub status: RunStatus,
}

/// Outcome of a single injected item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Confirmed present in the page after injection.
    Inserted,
    /// Submitted, but the confirmation poll timed out. The item may well
    /// have landed; the caller should verify manually.
    Unconfirmed,
    /// Rejected before any interaction (bad extension, missing file).
    Skipped { reason: String },
    /// The flow failed for this item.
    Failed { error: String },
}

/// Per-item record within a batch injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    /// Human-readable item label (file name, first URL, "text").
    pub label: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// Report for a whole injection batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
    #[serde(flatten)]
    pub status: RunStatus,
}

impl BatchReport {
    /// Build a report from item results. `Inserted` and `Unconfirmed` both
    /// count as completed (the latter is surfaced per-item, not as a batch
    /// failure).
    pub fn from_items(items: Vec<ItemReport>) -> Self {
        let completed = items
            .iter()
            .filter(|i| {
                matches!(
                    i.outcome,
                    ItemOutcome::Inserted | ItemOutcome::Unconfirmed
                )
            })
            .count();
        let failed = items.len() - completed;
        Self {
            status: RunStatus::from_counts(completed, failed),
            items,
        }
    }
}
