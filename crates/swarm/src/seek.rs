// Random seek controller for VOD sessions.

use std::sync::Arc;

use rand::RngExt;
use tracing::{debug, info};

use crate::scheduler::fill_for_vod;
use crate::session::SessionContext;
use crate::state::SessionState;

/// Restarts VOD playback at `index`: drops buffered and queued media, moves the
/// cursor and refills the buffer from there. Returns the number of segments queued.
///
/// Bumps the seek generation so downloads already in flight are not credited.
pub fn reseek_to(state: &mut SessionState, index: u64) -> usize {
    state.buffered_duration = 0.0;
    state.queue.clear();
    state.in_flight = None;
    state.last_downloaded_sequence = index.checked_sub(1);
    if let Some(vod) = state.vod.as_mut() {
        vod.current_index = index;
        vod.last_added_index = None;
    }
    state.seek_generation += 1;
    state.counters.reseeks += 1;
    fill_for_vod(state)
}

/// Reseeks to a uniformly random segment. Returns the chosen index, or `None`
/// when the session has no VOD segments.
pub fn reseek_random(state: &mut SessionState) -> Option<u64> {
    let total = state.vod.as_ref()?.total_segments();
    if total == 0 {
        return None;
    }
    let index = rand::rng().random_range(0..total);
    reseek_to(state, index);
    Some(index)
}

pub(crate) async fn run(ctx: Arc<SessionContext>) {
    let interval = ctx.config.switch_interval;
    if interval.is_zero() {
        debug!("Random seeking disabled");
        return;
    }

    while ctx.sleep(interval).await {
        let index = reseek_random(&mut ctx.state.lock());
        if let Some(index) = index {
            info!(index, "Seeked to random segment");
        }
    }

    debug!("Seek controller stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use url::Url;

    use super::*;
    use crate::config::SessionConfig;
    use crate::playlist::Segment;
    use crate::scheduler::QueueEntry;
    use crate::state::StreamType;
    use crate::test_utils::FakeHttpClient;

    fn vod_state(count: usize) -> SessionState {
        let mut state = SessionState::new(
            Url::parse("https://cdn.example.com/vod/stream.m3u8").unwrap(),
            Url::parse("https://cdn.example.com/").unwrap(),
            None,
            StreamType::Vod,
            20.0,
        );
        state.set_vod_segments(
            (0..count)
                .map(|i| Segment {
                    uri: format!("seg{i}.ts"),
                    duration: 6.0,
                    sequence: i as u64,
                })
                .collect(),
        );
        state
    }

    #[test]
    fn reseek_resets_playback_state() {
        let mut state = vod_state(50);
        state.buffered_duration = 17.0;
        state.last_downloaded_sequence = Some(30);
        state.queue.push_unique_sequence(QueueEntry {
            uri: "seg31.ts".to_string(),
            duration: 6.0,
            sequence: 31,
        });
        state.in_flight = Some(QueueEntry {
            uri: "seg30.ts".to_string(),
            duration: 6.0,
            sequence: 30,
        });

        let queued = reseek_to(&mut state, 12);

        assert_eq!(state.buffered_duration, 0.0);
        assert_eq!(state.last_downloaded_sequence, Some(11));
        assert_eq!(state.in_flight, None);
        assert_eq!(state.vod.as_ref().unwrap().current_index, 12);
        assert_eq!(state.seek_generation, 1);
        assert_eq!(state.counters.reseeks, 1);
        // 20s target over 6s segments
        assert_eq!(queued, 4);
        let sequences: Vec<u64> = state.queue.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![12, 13, 14, 15]);
    }

    #[test]
    fn reseek_to_start_leaves_no_downloaded_sequence() {
        let mut state = vod_state(10);
        state.last_downloaded_sequence = Some(9);
        reseek_to(&mut state, 0);
        assert_eq!(state.last_downloaded_sequence, None);
        assert_eq!(state.queue.iter().next().map(|e| e.sequence), Some(0));
    }

    #[test]
    fn reseek_random_stays_in_range() {
        let mut state = vod_state(7);
        for _ in 0..64 {
            let index = reseek_random(&mut state).unwrap();
            assert!(index < 7);
            assert_eq!(state.vod.as_ref().unwrap().current_index, index);
        }
        assert_eq!(state.counters.reseeks, 64);
    }

    #[test]
    fn reseek_random_needs_segments() {
        let mut state = vod_state(0);
        assert_eq!(reseek_random(&mut state), None);
        assert_eq!(state.counters.reseeks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_never_seeks() {
        let config = SessionConfig {
            switch_interval: Duration::ZERO,
            ..SessionConfig::default()
        };
        let ctx = SessionContext::for_test(vod_state(10), Arc::new(FakeHttpClient::new()), config);

        run(ctx.clone()).await;
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert_eq!(ctx.state.lock().counters.reseeks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn seeks_once_per_interval() {
        let config = SessionConfig {
            switch_interval: Duration::from_secs(10),
            ..SessionConfig::default()
        };
        let ctx = SessionContext::for_test(vod_state(10), Arc::new(FakeHttpClient::new()), config);
        let handle = tokio::spawn(run(ctx.clone()));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(ctx.state.lock().counters.reseeks, 2);

        ctx.token.cancel();
        handle.await.unwrap();
    }
}
