//! Content units produced by the two extraction paths.
//!
//! [`ExtractedUnit`] comes from structural (in-page) extraction and mirrors
//! the JSON shape the page script returns; [`RawCapture`] comes from the
//! screenshot/recognition fallback. Source pages are heterogeneous, so every
//! field is best-effort and may be empty.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One comment attached to an extracted unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentUnit {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub content: String,
}

/// One post/entry extracted structurally from the page.
///
/// Field names are camelCase on the wire because the values are produced by
/// a page-context script and deserialized straight from its return value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedUnit {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub publish_time: String,
    /// Image URIs found inside the unit's container. Inline emoji assets are
    /// excluded at extraction time.
    #[serde(default)]
    pub images: Vec<String>,
    /// Display names of identities that liked the unit, when the page
    /// renders them.
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub comments: Vec<CommentUnit>,
}

impl ExtractedUnit {
    /// Identity key used to reconcile cycle-over-cycle overlap: each reveal
    /// cycle re-extracts everything currently rendered, so units are
    /// deduplicated on (author, publish time, content).
    pub fn identity_key(&self) -> (String, String, String) {
        (
            self.author.clone(),
            self.publish_time.clone(),
            self.content.clone(),
        )
    }

    /// True when the unit carries neither text nor images. The page script
    /// already skips such containers; this guards the Rust side against a
    /// drifted script.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.images.is_empty()
    }
}

/// One cycle of the capture/recognition fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCapture {
    /// Monotonic index within the owning capture component. Every cycle is
    /// recorded, including cycles whose recognized text matched the previous
    /// one.
    pub sequence_index: u64,
    pub timestamp: DateTime<Utc>,
    pub recognized_text: String,
    /// Where the raw screenshot was written (audit trail).
    pub source_image: PathBuf,
}

/// A rectangular screen region in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    /// Build a region from two corner points in either order.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let x = x1.min(x2);
        let y = y1.min(y2);
        Self {
            x,
            y,
            width: (x1 - x2).abs(),
            height: (y1 - y2).abs(),
        }
    }

    /// Center point of the region.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}
