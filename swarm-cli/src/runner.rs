// Load-test harness: spawns sessions at the configured rate and stops them on
// Ctrl-C or when the run time is over.

use std::sync::Arc;
use std::time::Duration;

use swarm_engine::{
    HlsSession, HttpClient, HttpConfig, ReqwestHttpClient, RequestMetrics, SessionConfig,
    SessionCounters,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::Result;
use crate::stats::{HarnessStats, format_request_table, sum_counters};

pub struct LoadTest {
    pub session_config: SessionConfig,
    pub users: usize,
    pub spawn_interval: Duration,
    /// `None` runs until Ctrl-C
    pub run_time: Option<Duration>,
    /// `None` disables periodic reports
    pub stats_interval: Option<Duration>,
}

impl LoadTest {
    pub async fn run(self) -> Result<()> {
        let metrics = Arc::new(RequestMetrics::new());
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::with_metrics(
            &HttpConfig::default(),
            metrics.clone(),
        )?);
        let config = Arc::new(self.session_config);
        let stats = Arc::new(HarnessStats::default());
        let token = CancellationToken::new();

        info!(
            users = self.users,
            spawn_interval = ?self.spawn_interval,
            run_time = ?self.run_time,
            masters = config.master_urls.len(),
            "Starting load test"
        );

        let shutdown = tokio::spawn(wait_for_shutdown(token.clone(), self.run_time));
        let reporter = self.stats_interval.map(|interval| {
            tokio::spawn(report_periodically(
                metrics.clone(),
                stats.clone(),
                token.clone(),
                interval,
            ))
        });

        let mut users = JoinSet::new();
        for n in 0..self.users {
            if n > 0 {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.spawn_interval) => {}
                }
            }
            let session = HlsSession::new(config.clone(), http.clone());
            let span = info_span!("user", n);
            users.spawn(run_user(session, stats.clone(), token.clone()).instrument(span));
        }
        debug!(spawned = users.len(), "All users spawned");

        token.cancelled().await;
        info!("Stopping all sessions");

        let mut finished = Vec::new();
        while let Some(result) = users.join_next().await {
            match result {
                Ok(Some(counters)) => finished.push(counters),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "User task ended abnormally"),
            }
        }

        shutdown.abort();
        if let Some(reporter) = reporter {
            let _ = reporter.await;
        }

        print_final_report(&metrics, &stats, &sum_counters(&finished));
        Ok(())
    }
}

/// Runs one session until the harness shuts down. Returns its counters, or `None`
/// when it failed to start.
async fn run_user(
    mut session: HlsSession,
    stats: Arc<HarnessStats>,
    token: CancellationToken,
) -> Option<SessionCounters> {
    if let Err(e) = session.start().await {
        stats.record_failed();
        warn!(session = session.id(), error = %e, "User failed to start");
        return None;
    }
    stats.record_started();

    token.cancelled().await;
    session.stop().await;
    stats.record_stopped();
    session.snapshot().map(|snapshot| snapshot.counters)
}

async fn wait_for_shutdown(token: CancellationToken, run_time: Option<Duration>) {
    let deadline = async {
        match run_time {
            Some(run_time) => tokio::time::sleep(run_time).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C, stopping");
            } else {
                info!("Received Ctrl-C");
            }
        }
        _ = deadline => info!("Run time elapsed"),
    }
    token.cancel();
}

async fn report_periodically(
    metrics: Arc<RequestMetrics>,
    stats: Arc<HarnessStats>,
    token: CancellationToken,
    interval: Duration,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
        info!(
            active = stats.active(),
            failed = stats.failed(),
            "Load test progress"
        );
        metrics.log_summary();
    }
}

fn print_final_report(metrics: &RequestMetrics, stats: &HarnessStats, counters: &SessionCounters) {
    println!();
    println!(
        "{}",
        format_request_table(&metrics.snapshot(), &metrics.total())
    );
    println!(
        "Sessions: {} started, {} failed to start",
        stats.started(),
        stats.failed()
    );
    println!(
        "Segments: {} downloaded, {} filtered, {} failed; {} playlist refreshes ({} failed); {} reseeks",
        counters.segments_downloaded,
        counters.segments_filtered,
        counters.segment_errors,
        counters.playlist_refreshes,
        counters.refresh_errors,
        counters.reseeks
    );
}
