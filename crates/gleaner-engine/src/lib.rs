//! The resilient UI-driving engine: selector resolution, incremental
//! reveal loops, the capture/recognition fallback, and content injection.
//!
//! Everything here operates against the [`surface::PageSurface`] seam so
//! the flows can be exercised with a scripted mock; the production
//! implementation is `gleaner_browser::PageSession`.
//!
//! - **`selector`**: multi-candidate resolution with a divided timeout
//!   budget and human-paced interaction.
//! - **`harvest`**: the reveal/extract/merge loop for structural
//!   extraction.
//! - **`fallback`**: region capture plus external text recognition with
//!   consecutive-capture dedup.
//! - **`inject`**: the write-side dialog flow with per-item isolation and
//!   bounded confirmation polling.
//! - **`script`**: builders for the self-contained page scripts the other
//!   modules evaluate.

pub mod error;
pub mod fallback;
pub mod harvest;
pub mod inject;
pub mod script;
pub mod selector;
pub mod surface;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::EngineError;
pub use fallback::{
    fingerprint, sample_region, CaptureLoop, CaptureOptions, CommandRecognizer, NullRecognizer,
    Recognizer,
};
pub use harvest::{CycleState, HarvestLoop, HarvestOptions};
pub use inject::{InjectOptions, Injector, Payload, SUPPORTED_EXTENSIONS};
pub use selector::{Pacing, ResolvedLocator, Resolver, VISIBILITY_POLL_INTERVAL};
pub use surface::PageSurface;
