// HLS player session simulator used for load testing
pub mod clock;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod live;
pub mod metrics;
pub mod playlist;
pub mod resolver;
pub mod scheduler;
pub mod seek;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod test_utils;

// Export common types for ease of use
pub use config::{HttpConfig, LoopIntervals, SessionConfig, parse_master_urls};
pub use error::SessionError;
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use metrics::{RequestMetrics, RequestStats};
pub use resolver::{PlaylistResolver, ResolvedStream};
pub use session::HlsSession;
pub use state::{SessionCounters, SessionSnapshot, StreamType};
