//! Stream read instrumentation.
//!
//! The adapter only samples; aggregation belongs to the [`StatsSink`] the
//! proxy injects (per-route histograms, Prometheus export, ...).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Stat names sampled by the adapter.
pub mod names {
    /// Bytes (payload and padding) folded by one accumulation pass.
    pub const ACCUM_BYTES: &str = "stream/accum/bytes";
    /// Duration of one accumulation pass, in microseconds.
    pub const ACCUM_LATENCY_US: &str = "stream/accum/latency_us";
    /// Frames buffered when a read starts.
    pub const QUEUE_DEPTH: &str = "stream/read/queue_depth";
    /// Duration of one read call, in microseconds.
    pub const READ_LATENCY_US: &str = "stream/read/latency_us";
    /// Frames found after a terminal frame and dropped.
    pub const FRAMES_DROPPED: &str = "stream/frames/dropped";
}

/// Destination for named stats.
///
/// The unit type `()` discards everything.
pub trait StatsSink: Send + Sync {
    /// Record one sample into the histogram `name`.
    fn record(&self, name: &'static str, value: u64);

    /// Add `delta` to the counter `name`.
    fn incr(&self, name: &'static str, delta: u64) {
        let _ = (name, delta);
    }
}

impl StatsSink for () {
    #[inline]
    fn record(&self, _name: &'static str, _value: u64) {}
}

/// An in-memory sink keeping every sample, for tests and debugging.
#[derive(Debug, Default)]
pub struct MemoryStats {
    histograms: Mutex<HashMap<&'static str, Vec<u64>>>,
    counters: Mutex<HashMap<&'static str, u64>>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn histograms(&self) -> MutexGuard<'_, HashMap<&'static str, Vec<u64>>> {
        self.histograms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn counters(&self) -> MutexGuard<'_, HashMap<&'static str, u64>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Samples recorded under `name`, in order.
    pub fn samples(&self, name: &str) -> Vec<u64> {
        self.histograms().get(name).cloned().unwrap_or_default()
    }

    /// Current value of the counter `name`.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters().get(name).copied().unwrap_or(0)
    }
}

impl StatsSink for MemoryStats {
    fn record(&self, name: &'static str, value: u64) {
        self.histograms().entry(name).or_default().push(value);
    }

    fn incr(&self, name: &'static str, delta: u64) {
        *self.counters().entry(name).or_default() += delta;
    }
}

/// The adapter's view of its sink.
#[derive(Clone)]
pub(crate) struct StreamStats {
    sink: Arc<dyn StatsSink>,
}

impl StreamStats {
    pub(crate) fn new(sink: Arc<dyn StatsSink>) -> Self {
        Self { sink }
    }

    pub(crate) fn queue_depth(&self, depth: usize) {
        self.sink.record(names::QUEUE_DEPTH, depth as u64);
    }

    pub(crate) fn read_latency(&self, elapsed: Duration) {
        self.sink.record(names::READ_LATENCY_US, micros(elapsed));
    }

    pub(crate) fn accumulated(&self, bytes: usize, elapsed: Duration) {
        self.sink.record(names::ACCUM_BYTES, bytes as u64);
        self.sink.record(names::ACCUM_LATENCY_US, micros(elapsed));
    }

    pub(crate) fn dropped(&self, frames: usize) {
        if frames > 0 {
            self.sink.incr(names::FRAMES_DROPPED, frames as u64);
        }
    }
}

fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_stats_records_in_order() {
        let stats = MemoryStats::new();
        stats.record(names::QUEUE_DEPTH, 3);
        stats.record(names::QUEUE_DEPTH, 0);
        assert_eq!(stats.samples(names::QUEUE_DEPTH), vec![3, 0]);
        assert!(stats.samples(names::ACCUM_BYTES).is_empty());
    }

    #[test]
    fn test_memory_stats_counters() {
        let stats = MemoryStats::new();
        stats.incr(names::FRAMES_DROPPED, 2);
        stats.incr(names::FRAMES_DROPPED, 1);
        assert_eq!(stats.counter(names::FRAMES_DROPPED), 3);
        assert_eq!(stats.counter("unknown"), 0);
    }

    #[test]
    fn test_stream_stats_accumulated() {
        let sink = Arc::new(MemoryStats::new());
        let stats = StreamStats::new(sink.clone());
        stats.accumulated(12, Duration::from_millis(2));
        stats.dropped(0);

        assert_eq!(sink.samples(names::ACCUM_BYTES), vec![12]);
        assert_eq!(sink.samples(names::ACCUM_LATENCY_US), vec![2000]);
        assert_eq!(sink.counter(names::FRAMES_DROPPED), 0);
    }

    #[test]
    fn test_unit_sink_is_noop() {
        let stats = StreamStats::new(Arc::new(()));
        stats.queue_depth(1);
        stats.read_latency(Duration::from_micros(5));
    }
}
