use std::time::Duration;

use rand::RngExt;
use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

use crate::error::SessionError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Target buffer used when none is configured.
pub const DEFAULT_TARGET_BUFFER_SECS: f64 = 40.0;

/// Interval between random VOD seeks when none is configured.
pub const DEFAULT_SWITCH_INTERVAL: Duration = Duration::from_secs(300);

// --- HTTP Configuration ---

/// Options for the HTTP clients shared by every session.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,

    /// Overall timeout for a single request, body included
    pub timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Headers sent with every request
    pub headers: HeaderMap,

    /// Maximum idle connections to keep per host.
    /// A load test opens many sessions against one origin, so keep this generous.
    pub pool_max_idle_per_host: usize,

    /// Duration to keep idle connections alive before closing
    pub pool_idle_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HttpConfig::get_default_headers(),
            pool_max_idle_per_host: 64,
            pool_idle_timeout: Duration::from_secs(30),
        }
    }
}

impl HttpConfig {
    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        default_headers
    }
}

// --- Loop cadence ---

/// Wake-up intervals of the per-session loops.
#[derive(Debug, Clone)]
pub struct LoopIntervals {
    /// How often the playback clock advances (one simulated second per tick)
    pub playback_tick: Duration,
    /// How long the segment fetcher sleeps when there is nothing to download
    pub fetch_idle: Duration,
    /// How often live media playlists are re-fetched
    pub live_refresh: Duration,
}

impl Default for LoopIntervals {
    fn default() -> Self {
        Self {
            playback_tick: Duration::from_secs(1),
            fetch_idle: Duration::from_secs(1),
            live_refresh: Duration::from_secs(5),
        }
    }
}

// --- Session Configuration ---

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Candidate master playlist URLs; each session plays one of them.
    pub master_urls: Vec<String>,
    /// Origin that segments must share to be fetched when filtering is on.
    /// `None` means the origin of the chosen master URL.
    pub host: Option<Url>,
    /// Seconds of media to keep buffered; `0` selects an automatic size.
    pub target_buffer_secs: f64,
    /// Interval between random seeks on VOD streams; zero disables them.
    pub switch_interval: Duration,
    /// Skip the network request for segments served from another origin.
    pub filter_host_segments: bool,
    /// Download whole segments instead of the first byte only.
    pub download_full_segments: bool,
    pub intervals: LoopIntervals,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            master_urls: Vec::new(),
            host: None,
            target_buffer_secs: DEFAULT_TARGET_BUFFER_SECS,
            switch_interval: DEFAULT_SWITCH_INTERVAL,
            filter_host_segments: true,
            download_full_segments: false,
            intervals: LoopIntervals::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_master_urls(master_urls: Vec<String>) -> Self {
        Self {
            master_urls,
            ..Self::default()
        }
    }

    /// Picks one master URL uniformly at random.
    pub fn pick_master_url(&self) -> Result<Url, SessionError> {
        if self.master_urls.is_empty() {
            return Err(SessionError::configuration("no master playlist URL configured"));
        }
        let idx = rand::rng().random_range(0..self.master_urls.len());
        let raw = &self.master_urls[idx];
        Url::parse(raw).map_err(|e| SessionError::invalid_url(raw.as_str(), e))
    }

    /// Origin used by the segment host filter for a session playing `master_url`.
    pub fn host_for(&self, master_url: &Url) -> Url {
        match &self.host {
            Some(host) => host.clone(),
            None => {
                let mut origin = master_url.clone();
                origin.set_path("/");
                origin.set_query(None);
                origin.set_fragment(None);
                origin
            }
        }
    }
}

/// Splits a master URL list given as `"url","url"` (quotes optional) into its entries.
pub fn parse_master_urls(raw: &str) -> Vec<String> {
    raw.replace('"', "")
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}
