use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Why a submitted frame never reached the compute context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Disabled,
    Busy,
    SourceExhausted,
    ConversionFailed,
}

#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub frames_submitted: u64,
    pub frames_accepted: u64,
    pub frames_published: u64,
    pub cycles_failed: u64,
    pub dropped_disabled: u64,
    pub dropped_busy: u64,
    pub dropped_empty: u64,
    pub dropped_conversion: u64,

    // EWMA timing stats
    pub avg_cycle_us: f32,
    pub max_cycle_us: u64,
    pub last_cycle_us: u64,

    pub depth_maps_per_second: f32,
    last_rate_calculation: Instant,
    rate_count: u64,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self {
            frames_submitted: 0,
            frames_accepted: 0,
            frames_published: 0,
            cycles_failed: 0,
            dropped_disabled: 0,
            dropped_busy: 0,
            dropped_empty: 0,
            dropped_conversion: 0,
            avg_cycle_us: 0.0,
            max_cycle_us: 0,
            last_cycle_us: 0,
            depth_maps_per_second: 0.0,
            last_rate_calculation: Instant::now(),
            rate_count: 0,
        }
    }
}

impl PipelineStats {
    pub fn frames_dropped(&self) -> u64 {
        self.dropped_disabled + self.dropped_busy + self.dropped_empty + self.dropped_conversion
    }
}

/// Counters and latency figures for the pipeline, cheap to clone and share
/// with the UI.
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    stats: Arc<Mutex<PipelineStats>>,
}

impl PipelineMetrics {
    const ALPHA: f32 = 0.1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PipelineStats {
        self.lock().clone()
    }

    pub(crate) fn record_submitted(&self) {
        self.lock().frames_submitted += 1;
    }

    pub(crate) fn record_drop(&self, reason: DropReason) {
        let mut stats = self.lock();
        match reason {
            DropReason::Disabled => stats.dropped_disabled += 1,
            DropReason::Busy => stats.dropped_busy += 1,
            DropReason::SourceExhausted => stats.dropped_empty += 1,
            DropReason::ConversionFailed => stats.dropped_conversion += 1,
        }
    }

    pub(crate) fn record_accepted(&self) {
        self.lock().frames_accepted += 1;
    }

    pub(crate) fn record_failure(&self) {
        self.lock().cycles_failed += 1;
    }

    pub(crate) fn record_published(&self, cycle: Duration) {
        let mut stats = self.lock();
        let duration_us = cycle.as_micros() as u64;
        stats.frames_published += 1;
        stats.last_cycle_us = duration_us;
        stats.max_cycle_us = stats.max_cycle_us.max(duration_us);
        stats.avg_cycle_us = if stats.frames_published == 1 {
            duration_us as f32
        } else {
            Self::update_ewma(stats.avg_cycle_us, duration_us, Self::ALPHA)
        };

        stats.rate_count += 1;
        let now = Instant::now();
        let elapsed = now.duration_since(stats.last_rate_calculation);
        if elapsed.as_secs_f32() >= 1.0 {
            stats.depth_maps_per_second = stats.rate_count as f32 / elapsed.as_secs_f32();
            stats.rate_count = 0;
            stats.last_rate_calculation = now;
        }
    }

    fn update_ewma(current: f32, new_value: u64, alpha: f32) -> f32 {
        current * (1.0 - alpha) + new_value as f32 * alpha
    }

    fn lock(&self) -> MutexGuard<'_, PipelineStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
