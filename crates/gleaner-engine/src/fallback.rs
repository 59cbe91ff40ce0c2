//! Capture/recognition fallback for pages where structural extraction is
//! not viable.
//!
//! Each cycle captures a fixed screen region, writes the raw image (audit
//! trail), hands the bytes to the external recognition function, and
//! records the result. Recognized text is fingerprinted; a cycle whose
//! text matches the immediately preceding cycle is still recorded with a
//! fresh sequence index and timestamp, but does not count as new content --
//! the run report stays bounded when the page has stopped changing while
//! the audit trail stays complete.
//!
//! The region is chosen once before the loop (interactively, via two
//! clicks in the page) and never re-sampled.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use gleaner_types::{CaptureRun, RawCapture, Region, RunStatus};

use crate::error::EngineError;
use crate::script;
use crate::surface::PageSurface;

/// The external text-recognition function: PNG bytes in, text out. Best
/// effort; no latency or accuracy contract.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, png: &[u8]) -> Result<String, EngineError>;
}

/// Recognizer that pipes the image to an external command's stdin and
/// reads text from its stdout (e.g. `tesseract stdin stdout -l
/// chi_sim+eng`). The command is split on whitespace; no shell is
/// involved.
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
}

impl CommandRecognizer {
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(String::from);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl Recognizer for CommandRecognizer {
    async fn recognize(&self, png: &[u8]) -> Result<String, EngineError> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                EngineError::Recognition(format!("failed to spawn '{}': {e}", self.program))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Recognition("recognizer stdin unavailable".into()))?;
        stdin
            .write_all(png)
            .await
            .map_err(|e| EngineError::Recognition(format!("failed to feed image: {e}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| EngineError::Recognition(format!("recognizer failed: {e}")))?;
        if !output.status.success() {
            return Err(EngineError::Recognition(format!(
                "recognizer exited with {}",
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Recognizer for screenshots-only runs: recognition always yields empty
/// text, so the audit trail of images is still produced.
pub struct NullRecognizer;

#[async_trait]
impl Recognizer for NullRecognizer {
    async fn recognize(&self, _png: &[u8]) -> Result<String, EngineError> {
        Ok(String::new())
    }
}

/// Hex SHA-256 of recognized text, used to detect unchanged content
/// between consecutive cycles.
pub fn fingerprint(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub cycles: u32,
    /// Fixed wait after the scroll between captures.
    pub delay: Duration,
    /// Directory raw images are written into (created if absent).
    pub output_dir: std::path::PathBuf,
    /// Wheel scroll dispatched between captures, in CSS pixels.
    pub scroll_delta: f64,
}

impl CaptureOptions {
    pub fn from_config(config: &gleaner_types::CaptureConfig) -> Self {
        Self {
            cycles: config.cycles,
            delay: Duration::from_millis(config.delay_ms),
            output_dir: config.output_dir.clone(),
            scroll_delta: config.scroll_delta,
        }
    }
}

/// Sample the capture region interactively: the user clicks the top-left
/// and bottom-right corners in the page, and the awaited promise delivers
/// both points in one evaluation.
pub async fn sample_region<S: PageSurface>(surface: &S) -> Result<Region, EngineError> {
    tracing::info!("click the top-left, then the bottom-right corner of the capture region");
    let value = surface.evaluate(&script::sample_region()).await?;

    let coord = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| EngineError::Capture(format!("region sample returned no '{key}'")))
    };
    let region = Region::from_corners(coord("x1")?, coord("y1")?, coord("x2")?, coord("y2")?);
    tracing::info!(?region, "capture region sampled");
    Ok(region)
}

/// Runs capture/recognize cycles over a fixed region.
///
/// The sequence index is owned by this instance, so repeated `run_cycles`
/// calls on one component continue numbering and independent components
/// never interfere.
pub struct CaptureLoop<'a, S: PageSurface, R: Recognizer + ?Sized> {
    surface: &'a S,
    recognizer: &'a R,
    options: CaptureOptions,
    sequence: AtomicU64,
}

impl<'a, S: PageSurface, R: Recognizer + ?Sized> CaptureLoop<'a, S, R> {
    pub fn new(surface: &'a S, recognizer: &'a R, options: CaptureOptions) -> Self {
        Self {
            surface,
            recognizer,
            options,
            sequence: AtomicU64::new(0),
        }
    }

    /// Run the configured number of capture cycles over `region`.
    ///
    /// Recognition failures degrade the cycle (recorded with empty text)
    /// and the run to partial; capture failures are session problems and
    /// abort.
    pub async fn run_cycles(&self, region: &Region) -> Result<CaptureRun, EngineError> {
        tokio::fs::create_dir_all(&self.options.output_dir).await?;

        let mut captures: Vec<RawCapture> = Vec::new();
        let mut new_content = 0usize;
        let mut failed = 0usize;
        let mut last_fingerprint: Option<String> = None;
        let (cx, cy) = region.center();

        for cycle in 0..self.options.cycles {
            let png = self.surface.screenshot_region(Some(region)).await?;

            let sequence_index = self.sequence.fetch_add(1, Ordering::SeqCst);
            let path = self
                .options
                .output_dir
                .join(format!("capture_{sequence_index:04}.png"));
            tokio::fs::write(&path, &png).await?;

            let recognized_text = match self.recognizer.recognize(&png).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(cycle, error = %e, "recognition failed, recording empty text");
                    failed += 1;
                    String::new()
                }
            };

            let print = fingerprint(&recognized_text);
            let is_new = last_fingerprint.as_deref() != Some(print.as_str());

            // Record every cycle; only novel text counts toward new
            // content.
            captures.push(RawCapture {
                sequence_index,
                timestamp: Utc::now(),
                recognized_text,
                source_image: path,
            });
            if is_new {
                new_content += 1;
                last_fingerprint = Some(print);
            } else {
                tracing::debug!(cycle, "recognized text unchanged from previous cycle");
            }

            self.surface
                .wheel(cx, cy, self.options.scroll_delta)
                .await?;
            tokio::time::sleep(self.options.delay).await;
        }

        let completed = self.options.cycles as usize - failed;
        let status = RunStatus::from_counts(completed, failed);
        tracing::info!(
            cycles = self.options.cycles,
            new_content,
            ?status,
            "capture run finished"
        );

        Ok(CaptureRun {
            captures,
            new_content_cycles: new_content,
            status,
        })
    }
}
