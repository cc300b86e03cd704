//! Progress-callback trait for per-round pagination events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the engine measures and repairs slides. The CLI renders them as a
//! spinner; a service could forward them to a channel or a job record.
//!
//! # Example
//!
//! ```rust
//! use marp_autosplit::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct RoundCounter {
//!     rounds: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for RoundCounter {
//!     fn on_round_complete(&self, round: u32, final_slides: usize, overflowing: usize) {
//!         self.rounds.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("round {round}: {final_slides} fit, {overflowing} to repair");
//!     }
//! }
//!
//! let counter = Arc::new(RoundCounter { rounds: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pagination engine as it works through its rounds.
///
/// Implementations must be `Send + Sync`: [`crate::convert::convert_many`]
/// shares one callback between concurrently running conversions. All methods
/// have default no-op implementations so callers only override what they
/// care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after pass 1, before anything is measured.
    ///
    /// # Arguments
    /// * `candidates`: number of slides derived from heading breaks
    fn on_conversion_start(&self, candidates: usize) {
        let _ = candidates;
    }

    /// Called just before a batch is sent to the renderer.
    ///
    /// # Arguments
    /// * `round`: 0 for the first measurement, then 1.. for repair rounds
    /// * `batch`: number of slides in this renderer invocation
    fn on_round_start(&self, round: u32, batch: usize) {
        let _ = (round, batch);
    }

    /// Called after a batch has been measured and evaluated.
    ///
    /// # Arguments
    /// * `round`: round number
    /// * `final_slides`: slides now known to fit
    /// * `overflowing`: slides split for the next round
    fn on_round_complete(&self, round: u32, final_slides: usize, overflowing: usize) {
        let _ = (round, final_slides, overflowing);
    }

    /// Called when a batch could not be measured (timeout, renderer error).
    fn on_probe_error(&self, round: u32, error: &str) {
        let _ = (round, error);
    }

    /// Called once when pagination is finished.
    ///
    /// # Arguments
    /// * `slides`: slides in the final deck
    /// * `irreducible`: slides measured over budget and emitted anyway
    fn on_conversion_complete(&self, slides: usize, irreducible: usize) {
        let _ = (slides, irreducible);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
