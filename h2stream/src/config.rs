//! Read batching configuration.
//!
//! The accumulation threshold is the single knob between per-read latency
//! and per-read overhead:
//!
//! - **threshold = 1** (default): a read drains the queue only when frames
//!   are already waiting; an idle stream returns each frame as it arrives.
//! - **larger thresholds**: shallow queues are read one frame at a time and
//!   only bursts of at least `threshold` frames are drained into one value.

use serde::{Deserialize, Serialize};

/// Default accumulation threshold.
pub const DEFAULT_ACCUMULATION_THRESHOLD: usize = 1;

/// Configuration for one stream adapter.
///
/// # Example
///
/// ```rust
/// use h2stream::AdapterConfig;
///
/// let config = AdapterConfig::new().accumulation_threshold(4);
/// assert_eq!(config.get_accumulation_threshold(), 4);
/// assert!(config.is_coalescing());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdapterConfig {
    /// Queue depth at which a read drains everything buffered.
    accumulation_threshold: usize,
    /// Whether a single non-terminal frame read on the fast path is merged
    /// with frames that arrived behind it.
    coalesce: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            accumulation_threshold: DEFAULT_ACCUMULATION_THRESHOLD,
            coalesce: true,
        }
    }
}

impl AdapterConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue depth at which reads drain and coalesce.
    ///
    /// Values below 1 are treated as 1: a read always needs at least one
    /// frame before it can return.
    pub fn accumulation_threshold(mut self, threshold: usize) -> Self {
        self.accumulation_threshold = threshold;
        self
    }

    /// Set whether fast-path reads coalesce with frames queued behind them.
    pub fn coalesce(mut self, coalesce: bool) -> Self {
        self.coalesce = coalesce;
        self
    }

    /// Returns the effective accumulation threshold.
    pub fn get_accumulation_threshold(&self) -> usize {
        self.accumulation_threshold.max(1)
    }

    pub fn is_coalescing(&self) -> bool {
        self.coalesce
    }

    /// Whether a read that sees `depth` buffered frames should drain them all.
    pub fn should_accumulate(&self, depth: usize) -> bool {
        depth >= self.get_accumulation_threshold()
    }
}
