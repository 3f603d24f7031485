//! Metric sources polled by the pulsemon agent.
//!
//! A [`Collector`] produces either counter increments (`i64`) or gauge
//! readings (`f64`) as key/value pairs. The agent merges them into its local
//! stores on every poll tick.

pub mod counter;
pub mod cpu;
pub mod memory;
pub mod random;

use anyhow::Result;
use pulsemon_common::types::Value;

pub use counter::PollCountCollector;
pub use cpu::CpuCollector;
pub use memory::MemoryCollector;
pub use random::RandomCollector;

/// A metric source that runs on the agent host.
///
/// Collectors are grouped by [`Collector::Value`]: counter sources yield
/// `i64` increments, gauge sources yield `f64` readings.
pub trait Collector: Send + Sync {
    type Value;

    /// Collector name used in logs (e.g. `"cpu"`).
    fn name(&self) -> &str;

    /// Samples the source once.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&mut self) -> Result<Vec<Value<Self::Value>>>;
}

/// Counter sources the agent registers by default.
pub fn default_counters() -> Vec<Box<dyn Collector<Value = i64>>> {
    vec![Box::new(PollCountCollector::new())]
}

/// Gauge sources the agent registers by default.
pub fn default_gauges() -> Vec<Box<dyn Collector<Value = f64>>> {
    vec![
        Box::new(MemoryCollector::new()),
        Box::new(CpuCollector::new()),
        Box::new(RandomCollector::new()),
    ]
}
