//! Multi-candidate selector resolution with timeout budgeting.
//!
//! Each logical action maps to an ordered fallback chain of candidate
//! locators (see [`SelectorBook`]). The resolver divides the caller's
//! timeout budget evenly across the candidates and tries them strictly in
//! listed order: the first candidate whose element becomes visible within
//! its slice wins immediately, and a candidate that would appear after its
//! slice expires loses even when the overall budget has time left. The
//! total wall time is therefore bounded by the budget regardless of how
//! many candidates an action has.
//!
//! Interactions are paced like a human operator: the pointer approaches the
//! target through intermediate movements with jittered delays, and typing
//! emits per-character keys. Instantaneous programmatic events trip
//! anti-automation heuristics on the pages this tool targets, so the pacing
//! is a behavioral requirement, not decoration.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use gleaner_browser::ElementBox;
use gleaner_types::SelectorBook;

use crate::error::EngineError;
use crate::script;
use crate::surface::PageSurface;

/// How often a candidate is re-probed while waiting for it to become
/// visible.
pub const VISIBILITY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timing profile for human-like interaction.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Intermediate pointer movements dispatched on the way to a target.
    pub move_steps: u32,
    /// Base delay between pointer movements.
    pub move_step_delay: Duration,
    /// Base delay between press and release.
    pub press_delay: Duration,
    /// Base delay between typed characters.
    pub key_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            move_steps: 8,
            move_step_delay: Duration::from_millis(25),
            press_delay: Duration::from_millis(60),
            key_delay: Duration::from_millis(35),
        }
    }
}

impl Pacing {
    /// No delays. For tests and for pages where pacing is irrelevant.
    pub fn immediate() -> Self {
        Self {
            move_steps: 4,
            move_step_delay: Duration::ZERO,
            press_delay: Duration::ZERO,
            key_delay: Duration::ZERO,
        }
    }
}

/// A locator that resolved to a visible element.
#[derive(Debug, Clone)]
pub struct ResolvedLocator {
    pub locator: String,
    pub rect: ElementBox,
}

/// Resolves logical actions against the live page.
pub struct Resolver<'a, S: PageSurface> {
    surface: &'a S,
    book: &'a SelectorBook,
    pacing: Pacing,
}

impl<'a, S: PageSurface> Resolver<'a, S> {
    pub fn new(surface: &'a S, book: &'a SelectorBook, pacing: Pacing) -> Self {
        Self {
            surface,
            book,
            pacing,
        }
    }

    pub fn book(&self) -> &SelectorBook {
        self.book
    }

    /// Resolve an action to the first visible candidate locator.
    ///
    /// The budget is divided evenly across the action's candidates; each
    /// candidate gets exactly its slice, no more. Candidates are tried in
    /// listed order and the first visible one short-circuits the rest --
    /// order priority, not speed priority.
    pub async fn resolve(
        &self,
        action: &str,
        budget: Duration,
    ) -> Result<ResolvedLocator, EngineError> {
        let candidates = self
            .book
            .candidates(action)
            .ok_or_else(|| EngineError::UnknownAction(action.to_string()))?;
        if candidates.is_empty() {
            return Err(EngineError::NotFound {
                action: action.to_string(),
                candidates_tried: Vec::new(),
            });
        }

        let slice = budget / candidates.len() as u32;
        for candidate in candidates {
            tracing::debug!(
                action,
                candidate = %candidate,
                slice_ms = slice.as_millis() as u64,
                "trying candidate"
            );
            if let Some(rect) = self.await_visible(candidate, slice).await? {
                tracing::debug!(action, candidate = %candidate, "candidate resolved");
                return Ok(ResolvedLocator {
                    locator: candidate.clone(),
                    rect,
                });
            }
        }

        Err(EngineError::NotFound {
            action: action.to_string(),
            candidates_tried: candidates.to_vec(),
        })
    }

    /// Resolve an action and click its element with human-like pacing.
    ///
    /// Visibility is re-verified immediately before dispatching: page work
    /// between resolution and action can hide or move the element.
    pub async fn click(&self, action: &str, budget: Duration) -> Result<(), EngineError> {
        let resolved = self.resolve(action, budget).await?;

        let rect = match self.probe(&resolved.locator).await? {
            Some(rect) => rect,
            None => {
                tracing::warn!(
                    action,
                    locator = %resolved.locator,
                    "element disappeared between resolution and click"
                );
                return Err(EngineError::NotFound {
                    action: action.to_string(),
                    candidates_tried: vec![resolved.locator],
                });
            }
        };

        self.human_click(&rect).await?;
        Ok(())
    }

    /// Resolve an input field, click it, and type `text` character by
    /// character with jittered inter-key delays.
    pub async fn fill(
        &self,
        action: &str,
        budget: Duration,
        text: &str,
    ) -> Result<(), EngineError> {
        self.click(action, budget).await?;
        for ch in text.chars() {
            self.surface.key_char(ch).await?;
            self.sleep_jittered(self.pacing.key_delay).await;
        }
        Ok(())
    }

    /// Resolve an input field and set its value in one script evaluation.
    /// For large payloads where per-key typing is impractical.
    pub async fn fill_fast(
        &self,
        action: &str,
        budget: Duration,
        text: &str,
    ) -> Result<(), EngineError> {
        let resolved = self.resolve(action, budget).await?;
        let filled = self
            .surface
            .evaluate(&script::fill_value(&resolved.locator, text))
            .await?;
        if filled.as_bool() != Some(true) {
            return Err(EngineError::NotFound {
                action: action.to_string(),
                candidates_tried: vec![resolved.locator],
            });
        }
        Ok(())
    }

    /// Wait up to `slice` for one candidate to become visible.
    async fn await_visible(
        &self,
        locator: &str,
        slice: Duration,
    ) -> Result<Option<ElementBox>, EngineError> {
        let deadline = Instant::now() + slice;
        loop {
            match self.probe(locator).await {
                Ok(Some(rect)) => return Ok(Some(rect)),
                Ok(None) => {}
                // A transient page error (mid-render, navigation churn) is
                // indistinguishable from "not there yet"; keep polling
                // within the slice. Session-fatal errors propagate.
                Err(e) if !e.is_fatal() => {
                    tracing::debug!(locator, error = %e, "probe failed, retrying");
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(VISIBILITY_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// One visibility probe. `Ok(None)` when the element is absent or
    /// hidden.
    async fn probe(&self, locator: &str) -> Result<Option<ElementBox>, EngineError> {
        let value = self
            .surface
            .evaluate(&script::probe_visible(locator))
            .await?;

        if value.get("visible").and_then(|v| v.as_bool()) != Some(true) {
            return Ok(None);
        }

        let coord = |key: &str| value.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0);
        Ok(Some(ElementBox {
            x: coord("x"),
            y: coord("y"),
            width: coord("width"),
            height: coord("height"),
        }))
    }

    /// Approach the element with intermediate pointer movements, then press
    /// and release at its center.
    async fn human_click(&self, rect: &ElementBox) -> Result<(), EngineError> {
        let (cx, cy) = rect.center();
        let (start_x, start_y) = {
            let mut rng = rand::thread_rng();
            (
                cx - rng.gen_range(80.0..160.0),
                cy + rng.gen_range(60.0..120.0),
            )
        };

        let steps = self.pacing.move_steps.max(1);
        for step in 1..=steps {
            let t = step as f64 / steps as f64;
            let x = start_x + (cx - start_x) * t;
            let y = start_y + (cy - start_y) * t;
            self.surface.mouse_move(x, y).await?;
            self.sleep_jittered(self.pacing.move_step_delay).await;
        }

        self.surface.mouse_press(cx, cy).await?;
        self.sleep_jittered(self.pacing.press_delay).await;
        self.surface.mouse_release(cx, cy).await?;
        Ok(())
    }

    async fn sleep_jittered(&self, base: Duration) {
        if base.is_zero() {
            return;
        }
        let factor = rand::thread_rng().gen_range(0.7..1.3);
        tokio::time::sleep(base.mul_f64(factor)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use gleaner_types::SelectorBook;

    use super::*;
    use crate::test_support::MockSurface;

    fn book_with(action: &str, candidates: &[&str]) -> SelectorBook {
        let mut book = SelectorBook::empty();
        book.set(action, candidates.iter().map(|c| c.to_string()).collect());
        book
    }

    fn visible_json(x: f64, y: f64) -> serde_json::Value {
        serde_json::json!({ "visible": true, "x": x, "y": y, "width": 100.0, "height": 40.0 })
    }

    fn hidden_json() -> serde_json::Value {
        serde_json::json!({ "visible": false })
    }

    #[tokio::test]
    async fn resolve_fails_within_budget_regardless_of_candidate_count() {
        // Four candidates, none ever visible: the budget is divided, not
        // summed, so the total wall time stays at ~budget.
        let book = book_with(
            "open-add-dialog",
            &["a.one", "a.two", "a.three", "a.four"],
        );
        let surface = MockSurface::new(|_script| Ok(hidden_json()));
        let resolver = Resolver::new(&surface, &book, Pacing::immediate());

        let budget = Duration::from_millis(400);
        let started = Instant::now();
        let err = resolver
            .resolve("open-add-dialog", budget)
            .await
            .expect_err("nothing is visible");
        let elapsed = started.elapsed();

        assert!(matches!(err, EngineError::NotFound { .. }));
        assert!(
            elapsed < Duration::from_millis(700),
            "took {elapsed:?}, budget was {budget:?}"
        );
        assert!(
            elapsed >= Duration::from_millis(350),
            "slices were not exhausted: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn resolve_prefers_list_order_over_speed() {
        // The second candidate is visible immediately, the first only
        // after 150 ms. Order priority: the first candidate wins and the
        // second is never probed.
        let start = Instant::now();
        let surface = MockSurface::new(move |script| {
            if script.contains("button.slow-but-first") {
                if start.elapsed() >= Duration::from_millis(150) {
                    Ok(visible_json(10.0, 10.0))
                } else {
                    Ok(hidden_json())
                }
            } else {
                Ok(visible_json(99.0, 99.0))
            }
        });
        let book = book_with("pick-website", &["button.slow-but-first", "button.fast"]);
        let resolver = Resolver::new(&surface, &book, Pacing::immediate());

        let resolved = resolver
            .resolve("pick-website", Duration::from_millis(1000))
            .await
            .expect("first candidate becomes visible inside its slice");

        assert_eq!(resolved.locator, "button.slow-but-first");
        let probed_second = surface
            .evaluations()
            .iter()
            .any(|s| s.contains("button.fast"));
        assert!(!probed_second, "second candidate must not be probed");
    }

    #[tokio::test]
    async fn candidate_slice_is_strict_even_when_budget_remains() {
        // Two candidates, 400 ms budget -> 200 ms slices. The second
        // candidate only appears 250 ms into its own slice, which misses
        // the slice even though the overall budget would have allowed it.
        let start = Instant::now();
        let surface = MockSurface::new(move |script| {
            if script.contains("button.late") && start.elapsed() >= Duration::from_millis(450) {
                Ok(visible_json(5.0, 5.0))
            } else {
                Ok(hidden_json())
            }
        });
        let book = book_with("confirm-insert", &["button.never", "button.late"]);
        let resolver = Resolver::new(&surface, &book, Pacing::immediate());

        let err = resolver
            .resolve("confirm-insert", Duration::from_millis(400))
            .await
            .expect_err("late candidate misses its slice");
        match err {
            EngineError::NotFound {
                action,
                candidates_tried,
            } => {
                assert_eq!(action, "confirm-insert");
                assert_eq!(candidates_tried, ["button.never", "button.late"]);
            }
            other => panic!("expected NotFound, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn resolve_picks_candidate_that_appears_inside_its_slice() {
        // The second candidate appears 50 ms into its own slice.
        let start = Instant::now();
        let surface = MockSurface::new(move |script| {
            if script.contains("button.late") && start.elapsed() >= Duration::from_millis(250) {
                Ok(visible_json(5.0, 5.0))
            } else {
                Ok(hidden_json())
            }
        });
        let book = book_with("confirm-insert", &["button.never", "button.late"]);
        let resolver = Resolver::new(&surface, &book, Pacing::immediate());

        let resolved = resolver
            .resolve("confirm-insert", Duration::from_millis(800))
            .await
            .expect("second candidate resolves inside its slice");
        assert_eq!(resolved.locator, "button.late");
    }

    #[tokio::test]
    async fn unknown_action_is_a_configuration_error() {
        let surface = MockSurface::new(|_| Ok(hidden_json()));
        let book = SelectorBook::empty();
        let resolver = Resolver::new(&surface, &book, Pacing::immediate());

        let err = resolver
            .resolve("no-such-action", Duration::from_millis(100))
            .await
            .expect_err("unknown action");
        assert!(matches!(err, EngineError::UnknownAction(_)));
    }

    #[tokio::test]
    async fn probe_script_errors_degrade_to_not_visible() {
        // A transient page error during probing must not abort resolution.
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_handler = Arc::clone(&calls);
        let surface = MockSurface::new(move |_script| {
            if calls_in_handler.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(gleaner_browser::BrowserError::Script {
                    message: "page mid-render".into(),
                })
            } else {
                Ok(visible_json(1.0, 1.0))
            }
        });
        let book = book_with("open-add-dialog", &["button.add"]);
        let resolver = Resolver::new(&surface, &book, Pacing::immediate());

        let resolved = resolver
            .resolve("open-add-dialog", Duration::from_millis(500))
            .await
            .expect("resolves after the transient error");
        assert_eq!(resolved.locator, "button.add");
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn click_approaches_then_presses_at_center() {
        let surface = MockSurface::new(|_| {
            Ok(serde_json::json!({
                "visible": true, "x": 100.0, "y": 200.0, "width": 80.0, "height": 40.0
            }))
        });
        let book = book_with("confirm-insert", &["button.ok"]);
        let resolver = Resolver::new(&surface, &book, Pacing::immediate());

        resolver
            .click("confirm-insert", Duration::from_millis(200))
            .await
            .expect("click succeeds");

        let mouse = surface.mouse_events();
        // Pointer approach: several movements before the press.
        let moves = mouse.iter().filter(|e| e.starts_with("move")).count();
        assert!(moves >= 4, "expected an approach path, got: {mouse:?}");
        // Press and release land at the element center.
        assert_eq!(mouse[mouse.len() - 2], "press 140 220");
        assert_eq!(mouse[mouse.len() - 1], "release 140 220");
        // The final movement ends on the center too.
        let last_move = mouse
            .iter()
            .rev()
            .find(|e| e.starts_with("move"))
            .unwrap();
        assert_eq!(*last_move, "move 140 220");
    }

    #[tokio::test]
    async fn click_reverifies_visibility_before_dispatch() {
        // Visible during resolution, gone at the re-check: the click fails
        // instead of pressing a stale coordinate.
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_handler = Arc::clone(&calls);
        let surface = MockSurface::new(move |_script| {
            if calls_in_handler.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(visible_json(50.0, 50.0))
            } else {
                Ok(hidden_json())
            }
        });
        let book = book_with("confirm-insert", &["button.ok"]);
        let resolver = Resolver::new(&surface, &book, Pacing::immediate());

        let err = resolver
            .click("confirm-insert", Duration::from_millis(200))
            .await
            .expect_err("vanished element cannot be clicked");
        assert!(matches!(err, EngineError::NotFound { .. }));
        assert!(surface.mouse_events().is_empty(), "nothing was dispatched");
    }

    #[tokio::test]
    async fn fill_types_per_character() {
        let surface = MockSurface::new(|_| Ok(visible_json(10.0, 10.0)));
        let book = book_with("text-field", &["textarea.input"]);
        let resolver = Resolver::new(&surface, &book, Pacing::immediate());

        resolver
            .fill("text-field", Duration::from_millis(200), "你好 hi")
            .await
            .expect("fill succeeds");
        assert_eq!(surface.typed(), "你好 hi");
    }

    #[tokio::test]
    async fn fill_fast_sets_value_in_one_evaluation() {
        let surface = MockSurface::new(|script| {
            if script.contains("dispatchEvent") {
                Ok(serde_json::json!(true))
            } else {
                Ok(visible_json(10.0, 10.0))
            }
        });
        let book = book_with("url-field", &["textarea.urls"]);
        let resolver = Resolver::new(&surface, &book, Pacing::immediate());

        resolver
            .fill_fast(
                "url-field",
                Duration::from_millis(200),
                "https://a.example\nhttps://b.example",
            )
            .await
            .expect("fill_fast succeeds");

        assert!(surface.typed().is_empty(), "no per-key typing");
        let filled = surface
            .evaluations()
            .iter()
            .any(|s| s.contains("https://a.example"));
        assert!(filled, "value script carries the payload");
    }
}
