//! Scripted [`PageSurface`] mock shared by the engine's unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use gleaner_browser::BrowserError;
use gleaner_types::Region;

use crate::surface::PageSurface;

type EvaluateHandler = Box<dyn Fn(&str) -> Result<Value, BrowserError> + Send + Sync>;

/// Records every interaction and answers `evaluate` through a scripted
/// handler.
pub struct MockSurface {
    handler: EvaluateHandler,
    evaluations: Mutex<Vec<String>>,
    mouse: Mutex<Vec<String>>,
    typed: Mutex<String>,
    file_inputs: Mutex<Vec<(String, Vec<String>)>>,
    /// Selectors for which `set_file_input` reports ElementNotFound.
    missing_file_inputs: Mutex<Vec<String>>,
    screenshot_count: AtomicU32,
    screenshot_regions: Mutex<Vec<Option<Region>>>,
}

impl MockSurface {
    pub fn new(
        handler: impl Fn(&str) -> Result<Value, BrowserError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            evaluations: Mutex::new(Vec::new()),
            mouse: Mutex::new(Vec::new()),
            typed: Mutex::new(String::new()),
            file_inputs: Mutex::new(Vec::new()),
            missing_file_inputs: Mutex::new(Vec::new()),
            screenshot_count: AtomicU32::new(0),
            screenshot_regions: Mutex::new(Vec::new()),
        }
    }

    pub fn evaluations(&self) -> Vec<String> {
        self.evaluations.lock().unwrap().clone()
    }

    pub fn mouse_events(&self) -> Vec<String> {
        self.mouse.lock().unwrap().clone()
    }

    pub fn typed(&self) -> String {
        self.typed.lock().unwrap().clone()
    }

    pub fn file_inputs(&self) -> Vec<(String, Vec<String>)> {
        self.file_inputs.lock().unwrap().clone()
    }

    pub fn screenshot_regions(&self) -> Vec<Option<Region>> {
        self.screenshot_regions.lock().unwrap().clone()
    }

    pub fn fail_file_input_for(&self, selector: &str) {
        self.missing_file_inputs
            .lock()
            .unwrap()
            .push(selector.to_string());
    }

    fn log_mouse(&self, kind: &str, x: f64, y: f64) {
        self.mouse.lock().unwrap().push(format!(
            "{kind} {} {}",
            x.round() as i64,
            y.round() as i64
        ));
    }
}

#[async_trait]
impl PageSurface for MockSurface {
    async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        self.evaluations
            .lock()
            .unwrap()
            .push(expression.to_string());
        (self.handler)(expression)
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.log_mouse("move", x, y);
        Ok(())
    }

    async fn mouse_press(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.log_mouse("press", x, y);
        Ok(())
    }

    async fn mouse_release(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.log_mouse("release", x, y);
        Ok(())
    }

    async fn wheel(&self, x: f64, y: f64, delta_y: f64) -> Result<(), BrowserError> {
        self.mouse.lock().unwrap().push(format!(
            "wheel {} {} {}",
            x.round() as i64,
            y.round() as i64,
            delta_y.round() as i64
        ));
        Ok(())
    }

    async fn key_char(&self, ch: char) -> Result<(), BrowserError> {
        self.typed.lock().unwrap().push(ch);
        Ok(())
    }

    async fn set_file_input(
        &self,
        selector: &str,
        files: &[String],
    ) -> Result<(), BrowserError> {
        if self
            .missing_file_inputs
            .lock()
            .unwrap()
            .iter()
            .any(|s| s == selector)
        {
            return Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        self.file_inputs
            .lock()
            .unwrap()
            .push((selector.to_string(), files.to_vec()));
        Ok(())
    }

    async fn screenshot_region(
        &self,
        region: Option<&Region>,
    ) -> Result<Vec<u8>, BrowserError> {
        let n = self.screenshot_count.fetch_add(1, Ordering::SeqCst);
        self.screenshot_regions.lock().unwrap().push(region.copied());
        Ok(format!("png-{n}").into_bytes())
    }
}
