//! The interaction loop for structural extraction.
//!
//! Cycles through reveal -> wait -> extract -> merge a fixed number of
//! times. Each extraction returns everything currently rendered, so the
//! merge step deduplicates on the (author, publish time, content) identity
//! key; order of first appearance is preserved.
//!
//! Two deliberate behaviors, kept as designed rather than "fixed":
//!
//! - the inter-cycle delay is fixed, not adaptive -- lazy-loaded content is
//!   given a predictable window instead of a heuristic one;
//! - the loop always runs the configured number of cycles and does not
//!   stop early when no new content appears, trading latency for a
//!   predictable cost envelope.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gleaner_types::{ExtractedUnit, Harvest, RunStatus};

use crate::error::EngineError;
use crate::script;
use crate::surface::PageSurface;

/// Loop phases, in order. `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Revealing,
    Extracting,
    Merging,
    Done,
}

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    /// Reveal+extract cycles to run, unconditionally.
    pub max_cycles: u32,
    /// Fixed wait between reveal and extract.
    pub cycle_delay: Duration,
}

impl HarvestOptions {
    pub fn from_config(config: &gleaner_types::HarvestConfig) -> Self {
        Self {
            max_cycles: config.max_cycles,
            cycle_delay: Duration::from_millis(config.cycle_delay_ms),
        }
    }
}

/// Drives reveal+extract cycles against one page and accumulates the
/// result. The accumulation is created fresh per run and handed to the
/// caller; nothing is cached across runs.
pub struct HarvestLoop<'a, S: PageSurface> {
    surface: &'a S,
    options: HarvestOptions,
    stop: Arc<AtomicBool>,
}

impl<'a, S: PageSurface> HarvestLoop<'a, S> {
    pub fn new(surface: &'a S, options: HarvestOptions) -> Self {
        Self::with_stop(surface, options, Arc::new(AtomicBool::new(false)))
    }

    /// Build a loop wired to an external stop signal.
    pub fn with_stop(surface: &'a S, options: HarvestOptions, stop: Arc<AtomicBool>) -> Self {
        Self {
            surface,
            options,
            stop,
        }
    }

    /// Handle callers can use to request cancellation. The flag is checked
    /// at the top of each cycle only; an in-flight evaluation is never
    /// aborted mid-cycle.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run the loop to completion (or cancellation) and return the
    /// accumulated result.
    ///
    /// A script error in one cycle degrades that cycle to empty and the
    /// final status to partial; session-fatal errors abort the run.
    pub async fn run(&self) -> Result<Harvest, EngineError> {
        let mut units: Vec<ExtractedUnit> = Vec::new();
        let mut seen: HashSet<(String, String, String)> = HashSet::new();
        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut cycles_run = 0u32;

        self.trace_state(0, CycleState::Idle);

        for cycle in 0..self.options.max_cycles {
            if self.stop.load(Ordering::Relaxed) {
                tracing::info!(cycle, "stop requested, ending harvest");
                break;
            }

            self.trace_state(cycle, CycleState::Revealing);
            if let Err(e) = self.reveal().await {
                if e.is_fatal() {
                    return Err(e);
                }
                // Extraction can still see whatever is already rendered.
                tracing::warn!(cycle, error = %e, "reveal failed, extracting current state");
            }

            tokio::time::sleep(self.options.cycle_delay).await;

            self.trace_state(cycle, CycleState::Extracting);
            match self.extract().await {
                Ok(batch) => {
                    self.trace_state(cycle, CycleState::Merging);
                    let before = units.len();
                    for unit in batch {
                        if unit.is_empty() {
                            continue;
                        }
                        if seen.insert(unit.identity_key()) {
                            units.push(unit);
                        }
                    }
                    tracing::debug!(
                        cycle,
                        new_units = units.len() - before,
                        total = units.len(),
                        "cycle merged"
                    );
                    completed += 1;
                }
                Err(e) if !e.is_fatal() => {
                    tracing::warn!(cycle, error = %e, "extraction failed, continuing");
                    failed += 1;
                }
                Err(e) => return Err(e),
            }

            cycles_run += 1;
        }

        self.trace_state(cycles_run, CycleState::Done);
        let status = RunStatus::from_counts(completed, failed);
        tracing::info!(
            cycles = cycles_run,
            units = units.len(),
            ?status,
            "harvest finished"
        );

        Ok(Harvest {
            units,
            cycles_run,
            status,
        })
    }

    async fn reveal(&self) -> Result<(), EngineError> {
        self.surface
            .evaluate(&script::scroll_to_bottom())
            .await?;
        Ok(())
    }

    async fn extract(&self) -> Result<Vec<ExtractedUnit>, EngineError> {
        let value = self.surface.evaluate(&script::extract_units()).await?;
        // A malformed return value is a page-side problem: degrade like a
        // script error rather than aborting the run.
        serde_json::from_value(value).map_err(|e| {
            EngineError::Browser(gleaner_browser::BrowserError::Script {
                message: format!("extraction returned an unexpected shape: {e}"),
            })
        })
    }

    fn trace_state(&self, cycle: u32, state: CycleState) {
        tracing::trace!(cycle, ?state, "harvest state");
    }
}
