// Playback clock: one simulated second of playback per tick.

use std::sync::Arc;

use tracing::{debug, info};

use crate::seek::reseek_random;
use crate::session::SessionContext;
use crate::state::SessionState;

/// Plays one second: advances the position and drains the buffer, floored at zero.
///
/// A VOD session that has downloaded its last segment and played everything
/// buffered restarts at a random segment. Returns that segment's index.
pub fn tick(state: &mut SessionState) -> Option<u64> {
    state.playback_position += 1;
    state.buffered_duration = (state.buffered_duration - 1.0).max(0.0);

    if reached_end_of_content(state) {
        return reseek_random(state);
    }
    None
}

fn reached_end_of_content(state: &SessionState) -> bool {
    let Some(vod) = state.vod.as_ref() else {
        return false;
    };
    let total = vod.total_segments();
    total > 0
        && state.buffered_duration <= 0.0
        && state
            .last_downloaded_sequence
            .is_some_and(|last| last + 1 >= total)
}

pub(crate) async fn run(ctx: Arc<SessionContext>) {
    let interval = ctx.config.intervals.playback_tick;

    while ctx.sleep(interval).await {
        let restarted = tick(&mut ctx.state.lock());
        if let Some(index) = restarted {
            info!(index, "Reached end of content, restarting playback");
        }
    }

    debug!("Playback clock stopped");
}
