//! Configuration for a gleaner run.
//!
//! [`GleanConfig`] is the top-level configuration loaded from
//! `gleaner.toml`, controlling the debugging endpoint, cycle counts and
//! delays for both extraction paths, injection budgets, and per-action
//! selector overrides. Every section has working defaults; an absent file
//! is equivalent to `GleanConfig::default()`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::selectors::SelectorBook;
use crate::unit::Region;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "gleaner.toml";

/// Errors from loading or persisting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("failed to serialize configuration: {0}")]
    Serialize(String),
}

/// Where to find the remote-debugging endpoint and which page to attach to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Host the debugging port is reachable on. The target application is
    /// launched externally with debugging enabled; gleaner only connects.
    pub host: String,
    pub port: u16,
    /// Case-insensitive substring matched against target titles and URLs.
    /// When no target matches, the first available target is used.
    pub target_keyword: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9222,
            target_keyword: None,
        }
    }
}

/// Structural extraction loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Reveal+extract cycles to run. The loop always runs exactly this many
    /// cycles; it does not stop early when no new content appears.
    pub max_cycles: u32,
    /// Fixed wait after each reveal, for lazy-loaded content to arrive.
    /// Deliberately not adaptive.
    pub cycle_delay_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_cycles: 50,
            cycle_delay_ms: 1000,
        }
    }
}

/// Capture/recognition fallback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub cycles: u32,
    pub delay_ms: u64,
    /// Directory raw capture images are written into.
    pub output_dir: PathBuf,
    /// External recognition command. Receives PNG bytes on stdin and must
    /// print recognized text on stdout (e.g. `tesseract stdin stdout -l
    /// chi_sim+eng`).
    pub recognizer_command: Option<String>,
    /// Wheel scroll amount dispatched between captures, in CSS pixels.
    pub scroll_delta: f64,
    /// Fixed capture region. When absent, the region is sampled
    /// interactively (two clicks in the page) before the loop starts.
    /// Declared last so the TOML table serializes after the scalar values.
    pub region: Option<Region>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            cycles: 20,
            delay_ms: 2000,
            output_dir: PathBuf::from("captures"),
            recognizer_command: None,
            scroll_delta: 360.0,
            region: None,
        }
    }
}

/// Injection (write-side) flow settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectConfig {
    /// Total timeout budget per logical action, divided across that
    /// action's candidate locators.
    pub action_budget_ms: u64,
    /// Confirmation poll: fixed number of attempts with growing delay.
    pub confirm_attempts: u32,
    /// Delay before the first confirmation attempt; grows linearly with
    /// each subsequent attempt.
    pub confirm_initial_delay_ms: u64,
    /// Settle time after opening a dialog or submitting a payload.
    pub settle_delay_ms: u64,
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            action_budget_ms: 10_000,
            confirm_attempts: 3,
            confirm_initial_delay_ms: 5_000,
            settle_delay_ms: 1_000,
        }
    }
}

/// Top-level configuration, loaded from [`CONFIG_FILENAME`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GleanConfig {
    pub endpoint: EndpointConfig,
    pub harvest: HarvestConfig,
    pub capture: CaptureConfig,
    pub inject: InjectConfig,
    /// Per-action selector overrides. An entry replaces the built-in
    /// candidate list for that action.
    pub selectors: BTreeMap<String, Vec<String>>,
}

impl GleanConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// The effective selector book: built-in defaults with this
    /// configuration's overrides applied.
    pub fn selector_book(&self) -> SelectorBook {
        SelectorBook::default().with_overrides(&self.selectors)
    }
}
