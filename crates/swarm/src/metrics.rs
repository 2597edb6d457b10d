use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

/// Counters for one request label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestStats {
    /// Total number of requests issued
    pub requests: u64,
    /// Requests that failed at the transport level or returned HTTP >= 400
    pub failures: u64,
    /// Total body bytes received
    pub bytes: u64,
    /// Sum of request latencies in milliseconds
    pub latency_sum_ms: u64,
    /// Slowest request in milliseconds
    pub latency_max_ms: u64,
}

impl RequestStats {
    pub fn avg_latency_ms(&self) -> u64 {
        if self.requests == 0 {
            0
        } else {
            self.latency_sum_ms / self.requests
        }
    }

    fn record(&mut self, latency: Duration) {
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.requests += 1;
        self.latency_sum_ms = self.latency_sum_ms.saturating_add(latency_ms);
        self.latency_max_ms = self.latency_max_ms.max(latency_ms);
    }
}

/// Request statistics grouped by request label.
///
/// One instance is shared by every session of a load test, so that the harness
/// reports aggregate numbers per request kind.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    by_name: Mutex<BTreeMap<&'static str, RequestStats>>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request that produced an HTTP response
    pub fn record_response(&self, name: &'static str, status: u16, bytes: u64, latency: Duration) {
        let mut by_name = self.by_name.lock();
        let stats = by_name.entry(name).or_default();
        stats.record(latency);
        stats.bytes = stats.bytes.saturating_add(bytes);
        if status >= 400 {
            stats.failures += 1;
        }
    }

    /// Record a request that failed before a response arrived
    pub fn record_error(&self, name: &'static str, latency: Duration) {
        let mut by_name = self.by_name.lock();
        let stats = by_name.entry(name).or_default();
        stats.record(latency);
        stats.failures += 1;
    }

    pub fn snapshot(&self) -> Vec<(&'static str, RequestStats)> {
        self.by_name
            .lock()
            .iter()
            .map(|(name, stats)| (*name, *stats))
            .collect()
    }

    pub fn total(&self) -> RequestStats {
        self.by_name
            .lock()
            .values()
            .fold(RequestStats::default(), |mut acc, stats| {
                acc.requests += stats.requests;
                acc.failures += stats.failures;
                acc.bytes = acc.bytes.saturating_add(stats.bytes);
                acc.latency_sum_ms = acc.latency_sum_ms.saturating_add(stats.latency_sum_ms);
                acc.latency_max_ms = acc.latency_max_ms.max(stats.latency_max_ms);
                acc
            })
    }

    pub fn log_summary(&self) {
        for (name, stats) in self.snapshot() {
            info!(
                label = name,
                requests = stats.requests,
                failures = stats.failures,
                bytes = stats.bytes,
                avg_ms = stats.avg_latency_ms(),
                max_ms = stats.latency_max_ms,
                "Request statistics"
            );
        }
    }
}
