// Session state shared by the playback loops of one simulated viewer.

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::config::DEFAULT_TARGET_BUFFER_SECS;
use crate::playlist::Segment;
use crate::scheduler::{PendingQueue, QueueEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Live,
    Vod,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Live => write!(f, "LIVE"),
            StreamType::Vod => write!(f, "VOD"),
        }
    }
}

/// The fixed segment list of a VOD stream and the playback cursor into it.
#[derive(Debug, Clone)]
pub struct VodTimeline {
    pub segments: Arc<[Segment]>,
    /// Index playback last (re)started from
    pub current_index: u64,
    /// Highest index handed to the queue since the last (re)start
    pub last_added_index: Option<u64>,
}

impl VodTimeline {
    pub fn total_segments(&self) -> u64 {
        self.segments.len() as u64
    }
}

/// Per-session activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounters {
    pub segments_downloaded: u64,
    /// Segments accounted for without a request because of the host filter
    pub segments_filtered: u64,
    pub segment_errors: u64,
    pub playlist_refreshes: u64,
    pub refresh_errors: u64,
    pub reseeks: u64,
}

/// Mutable record shared by every loop of a session, always behind the session lock.
#[derive(Debug)]
pub struct SessionState {
    /// Value of the `sessionid` query parameter handed out by the origin's redirect
    pub session_id: Option<String>,
    pub playlist_url: Url,
    /// Origin segments must share to be fetched when host filtering is on
    pub host: Url,
    pub stream_type: StreamType,
    /// Simulated seconds played
    pub playback_position: u64,
    /// Seconds of media downloaded and not yet played
    pub buffered_duration: f64,
    /// Seconds of media to keep buffered; `0` until computed for auto-sized live sessions
    pub target_buffer: f64,
    pub last_downloaded_sequence: Option<u64>,
    pub queue: PendingQueue,
    /// Entry taken off the queue whose download has not completed yet
    pub in_flight: Option<QueueEntry>,
    pub running: bool,
    /// Present for VOD streams only
    pub vod: Option<VodTimeline>,
    /// Bumped by every reseek; downloads started under an older value are discarded
    pub seek_generation: u64,
    pub counters: SessionCounters,
}

impl SessionState {
    /// `target_buffer_secs` of zero or less asks for an automatic size: computed from
    /// the first live playlist, or the default for VOD.
    pub fn new(
        playlist_url: Url,
        host: Url,
        session_id: Option<String>,
        stream_type: StreamType,
        target_buffer_secs: f64,
    ) -> Self {
        let target_buffer = match stream_type {
            _ if target_buffer_secs > 0.0 => target_buffer_secs,
            StreamType::Vod => DEFAULT_TARGET_BUFFER_SECS,
            StreamType::Live => 0.0,
        };

        Self {
            session_id,
            playlist_url,
            host,
            stream_type,
            playback_position: 0,
            buffered_duration: 0.0,
            target_buffer,
            last_downloaded_sequence: None,
            queue: PendingQueue::new(),
            in_flight: None,
            running: true,
            vod: None,
            seek_generation: 0,
            counters: SessionCounters::default(),
        }
    }

    /// Installs the VOD segment list with playback positioned at its first segment.
    pub fn set_vod_segments(&mut self, segments: Vec<Segment>) {
        self.vod = Some(VodTimeline {
            segments: segments.into(),
            current_index: 0,
            last_added_index: None,
        });
        self.buffered_duration = 0.0;
        self.queue.clear();
        self.in_flight = None;
        self.last_downloaded_sequence = None;
    }

    pub fn is_vod(&self) -> bool {
        self.stream_type == StreamType::Vod
    }

    /// Whether the fetcher should pull another segment.
    pub fn needs_data(&self) -> bool {
        self.buffered_duration < self.target_buffer
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            stream_type: self.stream_type,
            playlist_url: self.playlist_url.to_string(),
            session_id: self.session_id.clone(),
            playback_position: self.playback_position,
            buffered_duration: self.buffered_duration,
            target_buffer: self.target_buffer,
            last_downloaded_sequence: self.last_downloaded_sequence,
            queue_len: self.queue.len(),
            current_segment_index: self.vod.as_ref().map(|v| v.current_index),
            total_segments: self.vod.as_ref().map(VodTimeline::total_segments),
            running: self.running,
            counters: self.counters,
        }
    }
}

/// Point-in-time copy of a session's observable state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub stream_type: StreamType,
    pub playlist_url: String,
    pub session_id: Option<String>,
    pub playback_position: u64,
    pub buffered_duration: f64,
    pub target_buffer: f64,
    pub last_downloaded_sequence: Option<u64>,
    pub queue_len: usize,
    pub current_segment_index: Option<u64>,
    pub total_segments: Option<u64>,
    pub running: bool,
    pub counters: SessionCounters,
}
