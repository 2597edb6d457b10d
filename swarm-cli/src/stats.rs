use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use swarm_engine::{RequestStats, SessionCounters};

/// Session totals kept by the harness.
#[derive(Debug, Default)]
pub struct HarnessStats {
    started: AtomicU64,
    failed: AtomicU64,
    stopped: AtomicU64,
}

impl HarnessStats {
    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stopped(&self) {
        self.stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.started().saturating_sub(self.stopped.load(Ordering::Relaxed))
    }
}

/// Adds up the counters of finished sessions.
pub fn sum_counters<'a>(counters: impl IntoIterator<Item = &'a SessionCounters>) -> SessionCounters {
    counters
        .into_iter()
        .fold(SessionCounters::default(), |mut acc, c| {
            acc.segments_downloaded += c.segments_downloaded;
            acc.segments_filtered += c.segments_filtered;
            acc.segment_errors += c.segment_errors;
            acc.playlist_refreshes += c.playlist_refreshes;
            acc.refresh_errors += c.refresh_errors;
            acc.reseeks += c.reseeks;
            acc
        })
}

/// Renders per-label request statistics as a fixed-width table with a total row.
pub fn format_request_table(rows: &[(&str, RequestStats)], total: &RequestStats) -> String {
    let width = rows
        .iter()
        .map(|(name, _)| name.len())
        .chain(std::iter::once("Aggregated".len()))
        .max()
        .unwrap_or_default();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}  {:>10}  {:>8}  {:>8}  {:>8}  {:>12}",
        "Name", "# reqs", "# fails", "avg ms", "max ms", "bytes"
    );
    let mut line = |name: &str, stats: &RequestStats| {
        let _ = writeln!(
            out,
            "{:<width$}  {:>10}  {:>8}  {:>8}  {:>8}  {:>12}",
            name,
            stats.requests,
            stats.failures,
            stats.avg_latency_ms(),
            stats.latency_max_ms,
            stats.bytes
        );
    };
    for (name, stats) in rows {
        line(name, stats);
    }
    line("Aggregated", total);
    out
}
