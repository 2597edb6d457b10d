// Segment fetcher: drains the pending queue and accounts downloaded media.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::{HeaderValue, RANGE};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::SessionError;
use crate::http::HttpRequest;
use crate::resolver::with_session_id;
use crate::scheduler::{QueueEntry, fill_for_vod};
use crate::session::SessionContext;
use crate::state::SessionState;

pub const SEGMENT_REQUEST: &str = "GET TS Segment";

/// Range requested when only the first byte of a segment is wanted.
const FIRST_BYTE_RANGE: &str = "bytes=0-0";

/// A dequeued segment, tagged with the seek generation it was dequeued under.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentJob {
    pub entry: QueueEntry,
    pub generation: u64,
}

/// How a job ended. Every outcome is credited to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOutcome {
    Downloaded,
    /// Served from another origin; no request was made
    Filtered,
    Failed,
}

/// Takes the next segment to download, or `None` when the buffer is at target or
/// nothing is queued. An empty VOD queue is refilled first.
///
/// Entries at or below the last downloaded sequence are dropped. The returned
/// entry stays recorded as in flight until [`complete_job`] sees it.
pub fn next_job(state: &mut SessionState) -> Option<SegmentJob> {
    if !state.running || !state.needs_data() {
        return None;
    }
    if state.is_vod() && state.queue.is_empty() {
        fill_for_vod(state);
    }

    let last = state.last_downloaded_sequence;
    let entry = loop {
        let entry = state.queue.pop_front()?;
        if last.is_some_and(|last| entry.sequence <= last) {
            trace!(sequence = entry.sequence, "Dropping segment that is already downloaded");
            continue;
        }
        break entry;
    };

    state.in_flight = Some(entry.clone());
    Some(SegmentJob {
        entry,
        generation: state.seek_generation,
    })
}

/// Resolves a segment uri against the media playlist URL and carries the session
/// id over when the uri does not set one.
pub fn segment_url(
    playlist_url: &Url,
    uri: &str,
    session_id: Option<&str>,
) -> Result<Url, SessionError> {
    let url = playlist_url
        .join(uri)
        .map_err(|e| SessionError::invalid_url(uri, e))?;
    Ok(with_session_id(url, session_id))
}

/// Whether a segment at `url` is requested over the network. With filtering on,
/// only segments on the session's host origin are.
pub fn should_fetch(url: &Url, host: &Url, filter_host_segments: bool) -> bool {
    !filter_host_segments || url.origin() == host.origin()
}

/// Issues the segment request. Only the first byte is asked for unless full
/// downloads are enabled; the body is drained and dropped either way.
pub(crate) async fn fetch(ctx: &SessionContext, url: Url) -> Result<u64, SessionError> {
    let mut request = HttpRequest::get(url.clone(), SEGMENT_REQUEST).discarding_body();
    if !ctx.config.download_full_segments {
        request = request.with_header(RANGE, HeaderValue::from_static(FIRST_BYTE_RANGE));
    }

    let response = ctx.http.get(request).await?;
    match response.status {
        StatusCode::OK | StatusCode::PARTIAL_CONTENT => Ok(response.body_len),
        status => Err(SessionError::SegmentFetchFailed {
            status,
            url: url.to_string(),
        }),
    }
}

/// Credits a finished job to the session. Returns `false`, changing nothing, when
/// the session stopped or reseeked since the job was dequeued.
pub fn complete_job(state: &mut SessionState, job: &SegmentJob, outcome: SegmentOutcome) -> bool {
    if state.in_flight.as_ref() == Some(&job.entry) {
        state.in_flight = None;
    }
    if !state.running || job.generation != state.seek_generation {
        return false;
    }

    state.buffered_duration += job.entry.duration;
    state.last_downloaded_sequence = Some(
        state
            .last_downloaded_sequence
            .map_or(job.entry.sequence, |last| last.max(job.entry.sequence)),
    );
    match outcome {
        SegmentOutcome::Downloaded => state.counters.segments_downloaded += 1,
        SegmentOutcome::Filtered => state.counters.segments_filtered += 1,
        SegmentOutcome::Failed => state.counters.segment_errors += 1,
    }
    true
}

async fn process(ctx: &SessionContext, job: &SegmentJob) -> SegmentOutcome {
    let (playlist_url, host, session_id) = {
        let state = ctx.state.lock();
        (
            state.playlist_url.clone(),
            state.host.clone(),
            state.session_id.clone(),
        )
    };

    let url = match segment_url(&playlist_url, &job.entry.uri, session_id.as_deref()) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "Skipping segment with unusable uri");
            return SegmentOutcome::Failed;
        }
    };

    if !should_fetch(&url, &host, ctx.config.filter_host_segments) {
        trace!(%url, "Segment is off host, not requesting it");
        return SegmentOutcome::Filtered;
    }

    match fetch(ctx, url).await {
        Ok(bytes) => {
            trace!(sequence = job.entry.sequence, bytes, "Segment downloaded");
            SegmentOutcome::Downloaded
        }
        Err(e) => {
            warn!(sequence = job.entry.sequence, error = %e, "Segment request failed");
            SegmentOutcome::Failed
        }
    }
}

/// Downloads segments back to back while the buffer is below target and work is
/// queued; otherwise sleeps for the idle interval.
pub(crate) async fn run(ctx: Arc<SessionContext>) {
    let idle = ctx.config.intervals.fetch_idle;

    while ctx.is_running() {
        let job = next_job(&mut ctx.state.lock());
        let Some(job) = job else {
            if !ctx.sleep(idle).await {
                break;
            }
            continue;
        };

        let outcome = process(&ctx, &job).await;
        if !complete_job(&mut ctx.state.lock(), &job, outcome) {
            debug!(sequence = job.entry.sequence, "Discarded segment dequeued before a reseek or stop");
        }
    }

    debug!("Segment fetcher stopped");
}
