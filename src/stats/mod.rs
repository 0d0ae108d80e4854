//! Cache-wide counters (`spec.md` §4.8), grounded on `p2f.c`'s `flocap_stats`.
//!
//! The flow cache runs single-threaded and cooperatively (`spec.md` §5): no other
//! code ever concurrently touches a [`FlowCache`](crate::conntrack::FlowCache), so
//! these counters are plain `u64` fields rather than atomics or thread-locals.

use std::time::Duration;

/// Running totals maintained by a [`FlowCache`](crate::conntrack::FlowCache) across
/// its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Total packets observed, including those with no payload.
    pub num_packets: u64,
    /// Total payload bytes observed.
    pub num_bytes: u64,
    /// Records currently resident in the cache (not yet expired).
    pub num_records_in_table: u64,
    /// Records expired and emitted over the cache's lifetime.
    pub num_records_output: u64,
    /// Record allocations that failed: a new record was needed but
    /// [`crate::config::FlowCacheConfig::max_records`] had been reached, so the
    /// packet was dropped instead (`spec.md` §7, "allocation failure").
    pub malloc_fail: u64,
}

/// Periodically logs a [`CacheStats`] snapshot plus the rates since the previous
/// report, mirroring `flocap_stats_output`'s role in the original source.
#[derive(Debug, Clone, Copy)]
pub struct StatsReporter {
    interval: Duration,
    last_reported: Duration,
    last_stats: CacheStats,
}

impl StatsReporter {
    pub fn new(interval: Duration) -> Self {
        StatsReporter {
            interval,
            last_reported: Duration::ZERO,
            last_stats: CacheStats::default(),
        }
    }

    /// Logs `stats` at `log::info!` if at least `interval` has elapsed since the
    /// last report, given the current elapsed capture time `now`. Rates are the
    /// delta against the previous report's snapshot, divided by the elapsed
    /// seconds between the two, matching `flocap_stats_output`.
    pub fn maybe_report(&mut self, stats: &CacheStats, now: Duration) {
        let elapsed = now.saturating_sub(self.last_reported);
        if elapsed < self.interval {
            return;
        }

        let seconds = elapsed.as_secs_f64();
        let bps = (stats.num_bytes - self.last_stats.num_bytes) as f64 / seconds;
        let pps = (stats.num_packets - self.last_stats.num_packets) as f64 / seconds;
        let rps = (stats.num_records_output - self.last_stats.num_records_output) as f64 / seconds;

        log::info!(
            "flow cache stats: packets={} bytes={} resident={} emitted={} alloc_fails={} bytes/sec={:.4e} packets/sec={:.4e} records/sec={:.4e}",
            stats.num_packets,
            stats.num_bytes,
            stats.num_records_in_table,
            stats.num_records_output,
            stats.malloc_fail,
            bps,
            pps,
            rps,
        );
        self.last_reported = now;
        self.last_stats = *stats;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_only_after_interval_elapses() {
        let mut reporter = StatsReporter::new(Duration::from_secs(10));
        let stats = CacheStats::default();
        reporter.maybe_report(&stats, Duration::from_secs(1));
        assert_eq!(reporter.last_reported, Duration::ZERO);
        reporter.maybe_report(&stats, Duration::from_secs(11));
        assert_eq!(reporter.last_reported, Duration::from_secs(11));
    }

    #[test]
    fn snapshot_advances_after_each_report() {
        let mut reporter = StatsReporter::new(Duration::from_secs(10));
        let mut stats = CacheStats::default();
        stats.num_bytes = 1000;
        stats.num_packets = 10;
        reporter.maybe_report(&stats, Duration::from_secs(10));
        assert_eq!(reporter.last_stats.num_bytes, 1000);

        stats.num_bytes = 3000;
        stats.num_packets = 30;
        reporter.maybe_report(&stats, Duration::from_secs(20));
        // 2000 bytes and 20 packets over the 10s interval since the last report.
        assert_eq!(reporter.last_stats.num_bytes, 3000);
        assert_eq!(reporter.last_stats.num_packets, 30);
    }
}
