use std::time::Duration;

use clap::Parser;
use clap::builder::BoolishValueParser;
use swarm_engine::{SessionConfig, parse_master_urls};
use url::Url;

use crate::error::{AppError, Result};

#[derive(Parser, Debug)]
#[command(
    name = "swarm",
    about = "Swarm - HLS load generator simulating many concurrent player sessions",
    version
)]
pub struct Args {
    /// Master playlist URLs, comma separated (e.g. "https://a/master.m3u8","https://b/master.m3u8").
    /// Each session picks one at random.
    #[arg(long, env = "MASTER_URL")]
    pub master_url: String,

    /// Origin whose segments are fetched when host filtering is on.
    /// Defaults to the origin of the chosen master URL.
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Seconds of media each session keeps buffered (0 = automatic)
    #[arg(long, env = "VOD_BUFFER_DURATION", default_value_t = 40.0)]
    pub vod_buffer_duration: f64,

    /// Seconds between random seeks on VOD streams (0 = never)
    #[arg(long, env = "VOD_SWITCH_INTERVAL", default_value_t = 300)]
    pub vod_switch_interval: u64,

    /// Only request segments served from the host origin
    #[arg(long, env = "FILTER_HOST_SEGMENTS", default_value = "true", value_parser = BoolishValueParser::new())]
    pub filter_host_segments: bool,

    /// Download whole segments instead of their first byte
    #[arg(long, env = "DOWNLOAD_FULL_SEGMENTS", default_value = "false", value_parser = BoolishValueParser::new())]
    pub download_full_segments: bool,

    /// Number of concurrent sessions
    #[arg(short, long, default_value_t = 1)]
    pub users: usize,

    /// Sessions started per second
    #[arg(short = 'r', long, default_value_t = 1.0)]
    pub spawn_rate: f64,

    /// Seconds to run before stopping every session (0 = until Ctrl-C)
    #[arg(short = 't', long, default_value_t = 0)]
    pub run_time: u64,

    /// Seconds between request statistics reports (0 = final report only)
    #[arg(long, default_value_t = 10)]
    pub stats_interval: u64,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    pub fn session_config(&self) -> Result<SessionConfig> {
        let master_urls = parse_master_urls(&self.master_url);
        if master_urls.is_empty() {
            return Err(AppError::InvalidInput("no master playlist URL given".to_string()));
        }
        for raw in &master_urls {
            Url::parse(raw).map_err(|e| AppError::InvalidInput(format!("{raw}: {e}")))?;
        }

        if !self.vod_buffer_duration.is_finite() || self.vod_buffer_duration < 0.0 {
            return Err(AppError::InvalidInput(format!(
                "buffer duration must be a non-negative number of seconds, got {}",
                self.vod_buffer_duration
            )));
        }

        let host = self.host.as_deref().map(parse_host).transpose()?;

        Ok(SessionConfig {
            master_urls,
            host,
            target_buffer_secs: self.vod_buffer_duration,
            switch_interval: Duration::from_secs(self.vod_switch_interval),
            filter_host_segments: self.filter_host_segments,
            download_full_segments: self.download_full_segments,
            ..SessionConfig::default()
        })
    }

    /// Delay between two session starts
    pub fn spawn_interval(&self) -> Result<Duration> {
        if !self.spawn_rate.is_finite() || self.spawn_rate <= 0.0 {
            return Err(AppError::InvalidInput(format!(
                "spawn rate must be positive, got {}",
                self.spawn_rate
            )));
        }
        Ok(Duration::from_secs_f64(1.0 / self.spawn_rate))
    }
}

/// Accepts a full URL or a bare host name, which is taken as https.
fn parse_host(raw: &str) -> Result<Url> {
    let raw = raw.trim().trim_matches('"');
    Url::parse(raw)
        .ok()
        .filter(|url| url.has_host())
        .map_or_else(|| Url::parse(&format!("https://{raw}")), Ok)
        .map_err(|e| AppError::InvalidInput(format!("invalid host {raw}: {e}")))
}
