//! Flush accounting
//!
//! Counters behind the shutdown summary and the clock both flush triggers
//! consult before flushing.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free flush counters.
///
/// Written by the flush worker (and by callers hitting a stopped worker or
/// dropping unresolvable records), read at shutdown for the summary. Each
/// counter is individually consistent; no ordering between them is implied.
#[derive(Debug, Default)]
pub struct FlushStats {
    total_flushes: AtomicU64,
    failed_flushes: AtomicU64,
    total_records: AtomicU64,
    failed_records: AtomicU64,
}

impl FlushStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one flush attempt of `records` records
    pub fn record(&self, records: u64, failed: bool) {
        self.total_flushes.fetch_add(1, Ordering::Relaxed);
        self.total_records.fetch_add(records, Ordering::Relaxed);
        if failed {
            self.failed_flushes.fetch_add(1, Ordering::Relaxed);
            self.failed_records.fetch_add(records, Ordering::Relaxed);
        }
    }

    /// Account for records dropped without a flush attempt
    pub fn discard(&self, records: u64) {
        self.total_records.fetch_add(records, Ordering::Relaxed);
        self.failed_records.fetch_add(records, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FlushSummary {
        FlushSummary {
            total_flushes: self.total_flushes.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            total_records: self.total_records.load(Ordering::Relaxed),
            failed_records: self.failed_records.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`FlushStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub total_flushes: u64,
    pub failed_flushes: u64,
    pub total_records: u64,
    pub failed_records: u64,
}

impl FlushSummary {
    pub fn successful_flushes(&self) -> u64 {
        self.total_flushes.saturating_sub(self.failed_flushes)
    }

    pub fn successful_records(&self) -> u64 {
        self.total_records.saturating_sub(self.failed_records)
    }
}

impl fmt::Display for FlushSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} processed records ({}/{} successful flushes)",
            self.successful_records(),
            self.total_records,
            self.successful_flushes(),
            self.total_flushes
        )
    }
}

/// Time of the most recent flush attempt, shared by both flush triggers
#[derive(Debug)]
pub struct FlushClock {
    epoch: Instant,
    last_nanos: AtomicU64,
}

impl FlushClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_nanos: AtomicU64::new(0),
        }
    }

    /// Record "now" as the last flush time
    pub fn mark(&self) {
        let nanos = self.epoch.elapsed().as_nanos() as u64;
        self.last_nanos.store(nanos, Ordering::Relaxed);
    }

    /// Time since the last recorded flush
    pub fn elapsed(&self) -> Duration {
        let last = Duration::from_nanos(self.last_nanos.load(Ordering::Relaxed));
        self.epoch.elapsed().saturating_sub(last)
    }
}

impl Default for FlushClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = FlushStats::new();
        stats.record(50, false);
        stats.record(10, true);
        stats.record(0, false);

        let summary = stats.snapshot();
        assert_eq!(summary.total_flushes, 3);
        assert_eq!(summary.failed_flushes, 1);
        assert_eq!(summary.total_records, 60);
        assert_eq!(summary.failed_records, 10);
        assert_eq!(summary.successful_records(), 50);
        assert_eq!(summary.successful_flushes(), 2);
    }

    #[test]
    fn test_discard_counts_records_only() {
        let stats = FlushStats::new();
        stats.record(8, false);
        stats.discard(2);

        let summary = stats.snapshot();
        assert_eq!(summary.total_flushes, 1);
        assert_eq!(summary.failed_flushes, 0);
        assert_eq!(summary.total_records, 10);
        assert_eq!(summary.successful_records(), 8);
    }

    #[test]
    fn test_summary_display() {
        let summary = FlushSummary {
            total_flushes: 4,
            failed_flushes: 1,
            total_records: 100,
            failed_records: 25,
        };
        assert_eq!(
            summary.to_string(),
            "75/100 processed records (3/4 successful flushes)"
        );
    }

    #[test]
    fn test_concurrent_records() {
        let stats = std::sync::Arc::new(FlushStats::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record(2, i % 2 == 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = stats.snapshot();
        assert_eq!(summary.total_flushes, 4000);
        assert_eq!(summary.failed_flushes, 2000);
        assert_eq!(summary.total_records, 8000);
        assert!(summary.successful_records() <= summary.total_records);
    }

    #[test]
    fn test_clock_mark_resets_elapsed() {
        let clock = FlushClock::new();
        std::thread::sleep(Duration::from_millis(20));
        assert!(clock.elapsed() >= Duration::from_millis(20));

        clock.mark();
        assert!(clock.elapsed() < Duration::from_millis(20));
    }
}
