//! Heap accounting for render metrics.
//!
//! [`COUNTING_ALLOCATOR`] is the `stats_alloc` instrumented system allocator.
//! The binary installs it with `#[global_allocator]`; library users who do
//! not will simply see a zero heap delta in [`PipelineMetrics`].

use crate::output::PipelineMetrics;
use stats_alloc::Stats;
use std::alloc::System;
use std::time::Instant;

pub use stats_alloc::INSTRUMENTED_SYSTEM as COUNTING_ALLOCATOR;

/// System allocator that counts allocations and bytes.
pub type CountingAllocator = stats_alloc::StatsAlloc<System>;

/// Live heap bytes implied by a set of allocator counters.
fn live_bytes(stats: &Stats) -> i64 {
    stats.bytes_allocated as i64 - stats.bytes_deallocated as i64 + stats.bytes_reallocated as i64
}

/// Live heap bytes seen by [`COUNTING_ALLOCATOR`].
pub fn allocated_bytes() -> i64 {
    live_bytes(&COUNTING_ALLOCATOR.stats())
}

/// Start/stop sampler producing a [`PipelineMetrics`].
#[derive(Debug)]
pub struct MetricsSampler {
    started: Instant,
    heap_start: i64,
}

impl MetricsSampler {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            heap_start: allocated_bytes(),
        }
    }

    pub fn finish(self) -> PipelineMetrics {
        PipelineMetrics {
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            heap_delta_bytes: allocated_bytes() - self.heap_start,
        }
    }
}
