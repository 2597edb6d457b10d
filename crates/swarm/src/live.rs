// Live refresher: re-polls the media playlist and queues newly published segments.

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::http::HttpRequest;
use crate::playlist::{MediaPlaylistInfo, ParsedPlaylist, parse_playlist};
use crate::scheduler::QueueEntry;
use crate::session::SessionContext;
use crate::state::SessionState;

pub const PLAYLIST_REQUEST: &str = "GET stream.m3u8";

/// Merges a live playlist snapshot into the session queue. Returns the number of
/// segments queued.
///
/// A segment is queued when its sequence is past the last downloaded one and its
/// uri is neither waiting nor being downloaded, while buffered, in-flight and
/// queued media is below target. An automatic target is sized to half the listed
/// window the first time a playlist is seen.
pub fn apply_live_playlist(state: &mut SessionState, playlist: &MediaPlaylistInfo) -> usize {
    if state.target_buffer <= 0.0 {
        state.target_buffer = playlist.total_duration() / 2.0;
        debug!(target_buffer = state.target_buffer, "Sized live buffer from playlist window");
    }

    if state.last_downloaded_sequence.is_none() {
        // None also stands for "before sequence 0"
        state.last_downloaded_sequence = playlist.media_sequence.checked_sub(1);
    }
    let last = state.last_downloaded_sequence;

    let in_flight = state.in_flight.clone();

    let mut accumulated = state.buffered_duration
        + state.queue.queued_duration()
        + in_flight.as_ref().map_or(0.0, |e| e.duration);
    let mut added = 0;
    for segment in &playlist.segments {
        if accumulated >= state.target_buffer {
            break;
        }
        if last.is_some_and(|last| segment.sequence <= last) {
            continue;
        }
        if in_flight
            .as_ref()
            .is_some_and(|e| e.uri == segment.uri || e.sequence == segment.sequence)
        {
            continue;
        }
        let entry = QueueEntry {
            uri: segment.uri.clone(),
            duration: segment.duration,
            sequence: segment.sequence,
        };
        if state.queue.push_unique_uri(entry) {
            accumulated += segment.duration;
            added += 1;
        }
    }
    added
}

async fn refresh_once(ctx: &SessionContext) -> Result<usize, SessionError> {
    let url = ctx.state.lock().playlist_url.clone();
    let response = ctx.http.get(HttpRequest::get(url.clone(), PLAYLIST_REQUEST)).await?;
    if response.status != StatusCode::OK {
        return Err(SessionError::PlaylistFetchFailed {
            status: response.status,
            url: url.to_string(),
        });
    }

    let playlist = match parse_playlist(&response.text(), url.as_str())? {
        ParsedPlaylist::Media(playlist) => playlist,
        ParsedPlaylist::Master(_) => {
            return Err(SessionError::playlist_parse(
                url.as_str(),
                "expected a media playlist, got a master playlist",
            ));
        }
    };

    let mut state = ctx.state.lock();
    if !state.running {
        return Ok(0);
    }
    state.counters.playlist_refreshes += 1;
    Ok(apply_live_playlist(&mut state, &playlist))
}

/// Polls the live playlist every refresh interval until the session stops.
///
/// The first poll happens one interval after start; the resolver's playlist
/// seeds the queue before this loop runs.
pub(crate) async fn run(ctx: Arc<SessionContext>) {
    let interval = ctx.config.intervals.live_refresh;
    debug!(?interval, "Live refresher started");

    while ctx.sleep(interval).await {
        match refresh_once(&ctx).await {
            Ok(added) if added > 0 => debug!(added, "Queued new live segments"),
            Ok(_) => {}
            Err(e) => {
                ctx.state.lock().counters.refresh_errors += 1;
                warn!(error = %e, "Live playlist refresh failed");
            }
        }
    }

    info!("Live refresher stopped");
}
