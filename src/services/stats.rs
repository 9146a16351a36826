use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the scheduler, the sink workers and observers.
#[derive(Debug, Default)]
pub struct AcquisitionStats {
    ticks: AtomicU64,
    samples_published: AtomicU64,
    read_errors: AtomicU64,
    overruns: AtomicU64,
    sink_overruns: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub samples_published: u64,
    pub read_errors: u64,
    /// Ticks that started late because the previous one ran past its period.
    pub overruns: u64,
    /// Events dropped from sink queues.
    pub sink_overruns: u64,
}

impl AcquisitionStats {
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.samples_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_overrun(&self, dropped: u64) {
        self.sink_overruns.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            samples_published: self.samples_published.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            sink_overruns: self.sink_overruns.load(Ordering::Relaxed),
        }
    }
}
