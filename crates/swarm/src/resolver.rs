// Playlist resolver: master playlist -> session redirect -> rendition -> media playlist.

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, info};
use url::Url;

use crate::error::SessionError;
use crate::http::{HttpClient, HttpRequest};
use crate::live::PLAYLIST_REQUEST;
use crate::playlist::{
    MediaPlaylistInfo, ParsedPlaylist, fix_master_quotes, parse_playlist, select_variant,
};
use crate::state::StreamType;

pub const MASTER_REDIRECT_REQUEST: &str = "GET master-redirect.m3u8";
pub const MASTER_SESSION_REQUEST: &str = "GET master-session.m3u8";

/// Query parameter the origin uses to pin a viewer session.
pub const SESSION_ID_PARAM: &str = "sessionid";

/// The media playlist a session plays, as found at startup.
#[derive(Debug, Clone)]
pub struct ResolvedStream {
    pub stream_type: StreamType,
    /// URL the media playlist was fetched from
    pub playlist_url: Url,
    pub session_id: Option<String>,
    pub playlist: MediaPlaylistInfo,
}

/// Appends `sessionid=<id>` unless the URL already carries a `sessionid`.
pub fn with_session_id(mut url: Url, session_id: Option<&str>) -> Url {
    let Some(session_id) = session_id else {
        return url;
    };
    let present = url.query_pairs().any(|(key, _)| key == SESSION_ID_PARAM);
    if !present {
        url.query_pairs_mut().append_pair(SESSION_ID_PARAM, session_id);
    }
    url
}

fn session_id_of(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == SESSION_ID_PARAM)
        .map(|(_, value)| value.into_owned())
}

pub struct PlaylistResolver {
    http: Arc<dyn HttpClient>,
}

impl PlaylistResolver {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Resolves `master_url` down to a media playlist and classifies the stream.
    ///
    /// A relative variant uri is resolved against the session `host`, not against
    /// the master playlist's location. Any failure here is a startup failure for
    /// the session.
    pub async fn resolve(
        &self,
        master_url: &Url,
        host: &Url,
    ) -> Result<ResolvedStream, SessionError> {
        let (text, base_url, session_id) = self.fetch_master(master_url).await?;

        let text = fix_master_quotes(&text);
        let (playlist_url, playlist) = match parse_playlist(&text, base_url.as_str())? {
            ParsedPlaylist::Master(variants) => {
                let variant =
                    select_variant(&variants).ok_or_else(|| SessionError::NoVariantsFound {
                        url: base_url.to_string(),
                    })?;
                debug!(
                    uri = %variant.uri,
                    bandwidth = variant.bandwidth,
                    resolution = ?variant.resolution,
                    "Selected variant"
                );

                let variant_url = host
                    .join(&variant.uri)
                    .map_err(|e| SessionError::invalid_url(variant.uri.as_str(), e))?;
                let variant_url = with_session_id(variant_url, session_id.as_deref());
                let playlist = self.fetch_media(&variant_url).await?;
                (variant_url, playlist)
            }
            ParsedPlaylist::Media(playlist) => (base_url, playlist),
        };

        if playlist.segments.is_empty() {
            return Err(SessionError::EmptyPlaylist {
                url: playlist_url.to_string(),
            });
        }

        let stream_type = if playlist.is_vod() {
            StreamType::Vod
        } else {
            StreamType::Live
        };
        info!(
            %playlist_url,
            %stream_type,
            segments = playlist.segments.len(),
            session_id = session_id.as_deref().unwrap_or("-"),
            "Resolved stream"
        );

        Ok(ResolvedStream {
            stream_type,
            playlist_url,
            session_id,
            playlist,
        })
    }

    /// Fetches the master playlist without following redirects, then follows a
    /// single session-establishing 302. Returns the text, the URL it came from
    /// and the session id handed out by the redirect.
    async fn fetch_master(
        &self,
        master_url: &Url,
    ) -> Result<(String, Url, Option<String>), SessionError> {
        let request = HttpRequest::get(master_url.clone(), MASTER_REDIRECT_REQUEST).without_redirects();
        let response = self.http.get(request).await?;

        match response.status {
            StatusCode::OK => Ok((response.text(), master_url.clone(), None)),
            StatusCode::FOUND => {
                let location = response.location().ok_or_else(|| SessionError::MissingLocation {
                    url: master_url.to_string(),
                })?;
                let target = master_url
                    .join(location)
                    .map_err(|e| SessionError::invalid_url(location, e))?;
                let session_id = session_id_of(&target);
                debug!(%target, ?session_id, "Following session redirect");

                let response = self
                    .http
                    .get(HttpRequest::get(target.clone(), MASTER_SESSION_REQUEST))
                    .await?;
                if response.status != StatusCode::OK {
                    return Err(SessionError::UnexpectedStatus {
                        status: response.status,
                        url: target.to_string(),
                    });
                }
                Ok((response.text(), target, session_id))
            }
            status => Err(SessionError::UnexpectedStatus {
                status,
                url: master_url.to_string(),
            }),
        }
    }

    async fn fetch_media(&self, url: &Url) -> Result<MediaPlaylistInfo, SessionError> {
        let response = self
            .http
            .get(HttpRequest::get(url.clone(), PLAYLIST_REQUEST))
            .await?;
        if response.status != StatusCode::OK {
            return Err(SessionError::PlaylistFetchFailed {
                status: response.status,
                url: url.to_string(),
            });
        }

        match parse_playlist(&response.text(), url.as_str())? {
            ParsedPlaylist::Media(playlist) => Ok(playlist),
            ParsedPlaylist::Master(_) => Err(SessionError::playlist_parse(
                url.as_str(),
                "variant points at another master playlist",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeHttpClient, init_tracing};

    const MASTER_URL: &str = "https://cdn.example.com/master.m3u8";

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=800000,RESOLUTION=1280x720
720p_low/stream.m3u8
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=1200000,RESOLUTION=1280x720
720p_high/stream.m3u8
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=400000,RESOLUTION=640x360
360p/stream.m3u8
";

    const VOD: &str = "#EXTM3U
#EXT-X-TARGETDURATION:6
#EXT-X-PLAYLIST-TYPE:VOD
#EXTINF:6.0,
seg0.ts
#EXTINF:6.0,
seg1.ts
#EXT-X-ENDLIST
";

    const LIVE: &str = "#EXTM3U
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:42
#EXTINF:6.0,
seg42.ts
#EXTINF:6.0,
seg43.ts
";

    fn resolver(http: &Arc<FakeHttpClient>) -> PlaylistResolver {
        PlaylistResolver::new(http.clone())
    }

    fn master_url() -> Url {
        Url::parse(MASTER_URL).unwrap()
    }

    fn host() -> Url {
        Url::parse("https://cdn.example.com/").unwrap()
    }

    #[test]
    fn with_session_id_keeps_existing_parameter() {
        let url = Url::parse("https://cdn.example.com/a.m3u8?x=1").unwrap();
        assert_eq!(
            with_session_id(url.clone(), Some("abc")).as_str(),
            "https://cdn.example.com/a.m3u8?x=1&sessionid=abc"
        );
        assert_eq!(with_session_id(url.clone(), None), url);

        let pinned = Url::parse("https://cdn.example.com/a.m3u8?sessionid=old").unwrap();
        assert_eq!(with_session_id(pinned.clone(), Some("new")), pinned);
    }

    #[tokio::test]
    async fn follows_session_redirect_and_selects_720p() {
        init_tracing();
        let http = Arc::new(FakeHttpClient::new());
        http.redirect(MASTER_URL, "/session/master.m3u8?sessionid=abc");
        http.respond("https://cdn.example.com/session/master.m3u8?sessionid=abc", 200, MASTER);
        http.respond(
            "https://cdn.example.com/720p_high/stream.m3u8?sessionid=abc",
            200,
            VOD,
        );

        let resolved = resolver(&http).resolve(&master_url(), &host()).await.unwrap();

        assert_eq!(resolved.stream_type, StreamType::Vod);
        assert_eq!(resolved.session_id.as_deref(), Some("abc"));
        assert_eq!(
            resolved.playlist_url.as_str(),
            "https://cdn.example.com/720p_high/stream.m3u8?sessionid=abc"
        );
        assert_eq!(resolved.playlist.segments.len(), 2);

        let requests = http.requests();
        let names: Vec<&str> = requests.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![MASTER_REDIRECT_REQUEST, MASTER_SESSION_REQUEST, PLAYLIST_REQUEST]
        );
        assert!(!requests[0].follow_redirects);
    }

    #[tokio::test]
    async fn variant_is_fetched_from_the_configured_host() {
        let http = Arc::new(FakeHttpClient::new());
        http.redirect(MASTER_URL, "/session/master.m3u8?sessionid=abc");
        http.respond("https://cdn.example.com/session/master.m3u8?sessionid=abc", 200, MASTER);
        http.respond(
            "https://origin.example.org/720p_high/stream.m3u8?sessionid=abc",
            200,
            VOD,
        );

        let host = Url::parse("https://origin.example.org/").unwrap();
        let resolved = resolver(&http).resolve(&master_url(), &host).await.unwrap();

        assert_eq!(
            resolved.playlist_url.as_str(),
            "https://origin.example.org/720p_high/stream.m3u8?sessionid=abc"
        );
    }

    #[tokio::test]
    async fn media_playlist_at_master_url_is_played_directly() {
        let http = Arc::new(FakeHttpClient::new());
        http.respond(MASTER_URL, 200, LIVE);

        let resolved = resolver(&http).resolve(&master_url(), &host()).await.unwrap();

        assert_eq!(resolved.stream_type, StreamType::Live);
        assert_eq!(resolved.playlist_url, master_url());
        assert_eq!(resolved.session_id, None);
        assert_eq!(resolved.playlist.media_sequence, 42);
        assert_eq!(http.requests().len(), 1);
    }

    #[tokio::test]
    async fn unexpected_master_status_fails() {
        let http = Arc::new(FakeHttpClient::new());
        http.respond(MASTER_URL, 500, "");

        let err = resolver(&http).resolve(&master_url(), &host()).await.unwrap_err();
        assert!(matches!(err, SessionError::UnexpectedStatus { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn redirect_without_location_fails() {
        let http = Arc::new(FakeHttpClient::new());
        http.respond(MASTER_URL, 302, "");

        let err = resolver(&http).resolve(&master_url(), &host()).await.unwrap_err();
        assert!(matches!(err, SessionError::MissingLocation { .. }));
    }

    #[tokio::test]
    async fn missing_variant_playlist_fails() {
        let http = Arc::new(FakeHttpClient::new());
        http.respond(MASTER_URL, 200, MASTER);

        let err = resolver(&http).resolve(&master_url(), &host()).await.unwrap_err();
        assert!(matches!(err, SessionError::PlaylistFetchFailed { status, .. } if status == StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn master_with_only_iframe_variants_has_nothing_to_play() {
        let http = Arc::new(FakeHttpClient::new());
        http.respond(
            MASTER_URL,
            200,
            "#EXTM3U\n#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=90000,RESOLUTION=1280x720,URI=\"iframe.m3u8\"\n",
        );

        let err = resolver(&http).resolve(&master_url(), &host()).await.unwrap_err();
        assert!(matches!(err, SessionError::NoVariantsFound { .. }));
    }

    #[tokio::test]
    async fn media_playlist_without_segments_fails() {
        let http = Arc::new(FakeHttpClient::new());
        http.respond(MASTER_URL, 200, "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-ENDLIST\n");

        let err = resolver(&http).resolve(&master_url(), &host()).await.unwrap_err();
        assert!(matches!(err, SessionError::EmptyPlaylist { .. }));
    }
}
