//! Metrics collection for SimulationClock

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics collected by the SimulationClock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockMetrics {
    /// Total ticks processed
    pub total_ticks: u64,

    /// Total day advances
    pub total_day_advances: u64,

    /// Duration of the last processing pass in nanoseconds
    pub last_pass_duration_ns: u64,

    /// Maximum processing pass duration in nanoseconds
    pub max_pass_duration_ns: u64,

    /// Games completed since start
    pub games_processed: u64,

    /// Games without a final score in the last pass
    pub games_pending: u64,

    /// Games whose ingestion failed since start
    pub ingest_failures: u64,

    /// League weeks whose bonuses were applied
    pub weeks_settled: u64,

    /// Skins rows written (awards and rollovers)
    pub skins_settled: u64,

    /// Advance calls rejected because another was in flight
    pub rejected_advances: u64,

    /// System uptime in seconds
    pub system_uptime_seconds: u64,
}

/// Counters for one processing pass
#[derive(Debug, Clone, Copy, Default)]
pub struct PassCounts {
    pub games_processed: u64,
    pub games_pending: u64,
    pub ingest_failures: u64,
    pub weeks_settled: u64,
    pub skins_settled: u64,
}

/// Metrics collector for the SimulationClock
pub struct MetricsCollector {
    total_ticks: AtomicU64,
    total_day_advances: AtomicU64,
    last_pass_duration: AtomicU64,
    max_pass_duration: AtomicU64,
    games_processed: AtomicU64,
    games_pending: AtomicU64,
    ingest_failures: AtomicU64,
    weeks_settled: AtomicU64,
    skins_settled: AtomicU64,
    rejected_advances: AtomicU64,
    start_time: Instant,
    emit: bool,
}

impl MetricsCollector {
    /// Create a new metrics collector; `emit` mirrors counters into the metrics recorder
    pub fn new(emit: bool) -> Self {
        Self {
            total_ticks: AtomicU64::new(0),
            total_day_advances: AtomicU64::new(0),
            last_pass_duration: AtomicU64::new(0),
            max_pass_duration: AtomicU64::new(0),
            games_processed: AtomicU64::new(0),
            games_pending: AtomicU64::new(0),
            ingest_failures: AtomicU64::new(0),
            weeks_settled: AtomicU64::new(0),
            skins_settled: AtomicU64::new(0),
            rejected_advances: AtomicU64::new(0),
            start_time: Instant::now(),
            emit,
        }
    }

    pub fn record_tick(&self) {
        self.total_ticks.fetch_add(1, Ordering::Relaxed);
        if self.emit {
            ::metrics::counter!("mok_clock_ticks_total", 1);
        }
    }

    pub fn record_day_advance(&self) {
        self.total_day_advances.fetch_add(1, Ordering::Relaxed);
        if self.emit {
            ::metrics::counter!("mok_clock_day_advances_total", 1);
        }
    }

    pub fn record_rejected_advance(&self) {
        self.rejected_advances.fetch_add(1, Ordering::Relaxed);
        if self.emit {
            ::metrics::counter!("mok_clock_rejected_advances_total", 1);
        }
    }

    /// Record the outcome of one ingestion and settlement pass
    pub fn record_pass(&self, duration: Duration, counts: PassCounts) {
        let duration_ns = duration.as_nanos() as u64;
        self.last_pass_duration.store(duration_ns, Ordering::Relaxed);
        self.games_processed.fetch_add(counts.games_processed, Ordering::Relaxed);
        self.games_pending.store(counts.games_pending, Ordering::Relaxed);
        self.ingest_failures.fetch_add(counts.ingest_failures, Ordering::Relaxed);
        self.weeks_settled.fetch_add(counts.weeks_settled, Ordering::Relaxed);
        self.skins_settled.fetch_add(counts.skins_settled, Ordering::Relaxed);

        // Update max duration
        let mut max_duration = self.max_pass_duration.load(Ordering::Relaxed);
        while duration_ns > max_duration {
            match self.max_pass_duration.compare_exchange_weak(
                max_duration,
                duration_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => max_duration = current,
            }
        }

        if self.emit {
            ::metrics::counter!("mok_games_processed_total", counts.games_processed);
            ::metrics::counter!("mok_ingest_failures_total", counts.ingest_failures);
            ::metrics::counter!("mok_weeks_settled_total", counts.weeks_settled);
            ::metrics::counter!("mok_skins_settled_total", counts.skins_settled);
            ::metrics::gauge!("mok_games_pending", counts.games_pending as f64);
            ::metrics::histogram!("mok_pass_duration_seconds", duration.as_secs_f64());
        }
    }

    /// Get current metrics
    pub fn get_metrics(&self) -> ClockMetrics {
        ClockMetrics {
            total_ticks: self.total_ticks.load(Ordering::Relaxed),
            total_day_advances: self.total_day_advances.load(Ordering::Relaxed),
            last_pass_duration_ns: self.last_pass_duration.load(Ordering::Relaxed),
            max_pass_duration_ns: self.max_pass_duration.load(Ordering::Relaxed),
            games_processed: self.games_processed.load(Ordering::Relaxed),
            games_pending: self.games_pending.load(Ordering::Relaxed),
            ingest_failures: self.ingest_failures.load(Ordering::Relaxed),
            weeks_settled: self.weeks_settled.load(Ordering::Relaxed),
            skins_settled: self.skins_settled.load(Ordering::Relaxed),
            rejected_advances: self.rejected_advances.load(Ordering::Relaxed),
            system_uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for counter in [
            &self.total_ticks,
            &self.total_day_advances,
            &self.last_pass_duration,
            &self.max_pass_duration,
            &self.games_processed,
            &self.games_pending,
            &self.ingest_failures,
            &self.weeks_settled,
            &self.skins_settled,
            &self.rejected_advances,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
