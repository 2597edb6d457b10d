use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("unexpected HTTP {status} for {url}")]
    UnexpectedStatus { status: StatusCode, url: String },

    #[error("redirect from {url} carries no Location header")]
    MissingLocation { url: String },

    #[error("failed to fetch playlist {url}: HTTP {status}")]
    PlaylistFetchFailed { status: StatusCode, url: String },

    #[error("failed to parse playlist {url}: {reason}")]
    PlaylistParse { url: String, reason: String },

    #[error("master playlist {url} lists no playable variants")]
    NoVariantsFound { url: String },

    #[error("playlist {url} contains neither variants nor segments")]
    EmptyPlaylist { url: String },

    #[error("segment request failed with HTTP {status} for {url}")]
    SegmentFetchFailed { status: StatusCode, url: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("session already started")]
    AlreadyStarted,
}

impl SessionError {
    pub fn invalid_url(input: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    pub fn playlist_parse(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PlaylistParse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}
