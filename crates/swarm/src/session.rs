// HLS session: resolves the stream, then runs the playback loops until stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, error, info, info_span, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::http::HttpClient;
use crate::live::apply_live_playlist;
use crate::resolver::PlaylistResolver;
use crate::scheduler::fill_for_vod;
use crate::state::{SessionSnapshot, SessionState, StreamType};
use crate::{clock, fetcher, live, seek};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Everything the loops of one session share.
pub(crate) struct SessionContext {
    pub(crate) state: Mutex<SessionState>,
    pub(crate) http: Arc<dyn HttpClient>,
    pub(crate) config: Arc<SessionConfig>,
    pub(crate) token: CancellationToken,
}

impl SessionContext {
    pub(crate) fn new(
        state: SessionState,
        http: Arc<dyn HttpClient>,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            state: Mutex::new(state),
            http,
            config,
            token: CancellationToken::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        state: SessionState,
        http: Arc<dyn HttpClient>,
        config: SessionConfig,
    ) -> Arc<Self> {
        Arc::new(Self::new(state, http, Arc::new(config)))
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.token.is_cancelled() && self.state.lock().running
    }

    /// Sleeps for `interval`. Returns `false` when the session stopped meanwhile.
    pub(crate) async fn sleep(&self, interval: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(interval) => self.is_running(),
        }
    }
}

/// One simulated viewer.
///
/// `start` resolves the stream and spawns the playback clock, the segment fetcher
/// and either the live refresher or the random seek controller. `stop` signals
/// them and waits for all of them to finish.
pub struct HlsSession {
    id: u64,
    config: Arc<SessionConfig>,
    http: Arc<dyn HttpClient>,
    ctx: Option<Arc<SessionContext>>,
    handles: Vec<JoinHandle<()>>,
}

impl HlsSession {
    pub fn new(config: Arc<SessionConfig>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            id: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            config,
            http,
            ctx: None,
            handles: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Resolves the stream and starts the playback loops. A failure leaves the
    /// session without running loops; it is not retried.
    pub async fn start(&mut self) -> Result<StreamType, SessionError> {
        if self.ctx.is_some() {
            return Err(SessionError::AlreadyStarted);
        }

        let span = info_span!("session", id = self.id);
        let ctx = self
            .prepare()
            .instrument(span.clone())
            .await
            .inspect_err(|e| {
                span.in_scope(|| error!(error = %e, "Session failed to start"));
            })?;
        let stream_type = ctx.state.lock().stream_type;

        self.handles = Self::spawn_loops(&ctx, stream_type, &span);
        self.ctx = Some(ctx);
        Ok(stream_type)
    }

    async fn prepare(&self) -> Result<Arc<SessionContext>, SessionError> {
        let master_url = self.config.pick_master_url()?;
        let host = self.config.host_for(&master_url);
        let resolved = PlaylistResolver::new(self.http.clone())
            .resolve(&master_url, &host)
            .await?;

        let mut state = SessionState::new(
            resolved.playlist_url,
            host,
            resolved.session_id,
            resolved.stream_type,
            self.config.target_buffer_secs,
        );
        let queued = match resolved.stream_type {
            StreamType::Vod => {
                state.set_vod_segments(resolved.playlist.segments);
                fill_for_vod(&mut state)
            }
            StreamType::Live => apply_live_playlist(&mut state, &resolved.playlist),
        };
        info!(
            stream_type = %state.stream_type,
            target_buffer = state.target_buffer,
            queued,
            "Session started"
        );

        Ok(Arc::new(SessionContext::new(
            state,
            self.http.clone(),
            self.config.clone(),
        )))
    }

    fn spawn_loops(
        ctx: &Arc<SessionContext>,
        stream_type: StreamType,
        span: &Span,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = vec![
            tokio::spawn(clock::run(ctx.clone()).instrument(span.clone())),
            tokio::spawn(fetcher::run(ctx.clone()).instrument(span.clone())),
        ];
        match stream_type {
            StreamType::Live => {
                handles.push(tokio::spawn(live::run(ctx.clone()).instrument(span.clone())));
            }
            StreamType::Vod => {
                handles.push(tokio::spawn(seek::run(ctx.clone()).instrument(span.clone())));
            }
        }
        handles
    }

    /// Stops every loop and waits for them. A request in flight completes and its
    /// result is dropped. Does nothing if the session never started.
    pub async fn stop(&mut self) {
        let Some(ctx) = self.ctx.as_ref() else {
            return;
        };
        ctx.state.lock().running = false;
        ctx.token.cancel();

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(session = self.id, error = %e, "Session task ended abnormally");
            }
        }

        let counters = ctx.state.lock().counters;
        info!(
            session = self.id,
            downloaded = counters.segments_downloaded,
            filtered = counters.segments_filtered,
            errors = counters.segment_errors,
            reseeks = counters.reseeks,
            "Session stopped"
        );
    }

    /// Current state of a started session; `None` before a successful start.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.ctx.as_ref().map(|ctx| ctx.state.lock().snapshot())
    }

    pub fn is_running(&self) -> bool {
        self.ctx.as_ref().is_some_and(|ctx| ctx.is_running())
    }
}
