// Playlist model: parses m3u8 text into the variants and segments a session needs.

use std::borrow::Cow;
use std::sync::LazyLock;

use m3u8_rs::{MediaPlaylistType, parse_playlist_res};
use rand::RngExt;
use regex::Regex;
use tracing::debug;

use crate::error::SessionError;

/// Resolution preferred when choosing a rendition.
pub const PREFERRED_RESOLUTION: (u64, u64) = (1280, 720);

static BARE_PROGRAM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"PROGRAM-ID=(\d+)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub uri: String,
    pub bandwidth: u64,
    pub resolution: Option<(u64, u64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Absolute or relative to the media playlist
    pub uri: String,
    /// Seconds
    pub duration: f64,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistType {
    Vod,
    Event,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylistInfo {
    /// Sequence number of the first listed segment
    pub media_sequence: u64,
    pub segments: Vec<Segment>,
    /// `#EXT-X-ENDLIST` present
    pub ended: bool,
    pub playlist_type: Option<PlaylistType>,
}

impl MediaPlaylistInfo {
    /// A playlist that will never grow: ended, or explicitly typed VOD.
    pub fn is_vod(&self) -> bool {
        self.ended || self.playlist_type == Some(PlaylistType::Vod)
    }

    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPlaylist {
    Master(Vec<Variant>),
    Media(MediaPlaylistInfo),
}

/// Quotes bare numeric `PROGRAM-ID` attribute values.
///
/// Some origins emit `PROGRAM-ID=1` where the attribute grammar expects a quoted
/// string. Already quoted values are left alone.
pub fn fix_master_quotes(text: &str) -> Cow<'_, str> {
    BARE_PROGRAM_ID.replace_all(text, r#"PROGRAM-ID="$1""#)
}

/// Parses playlist text. `url` is only used for error reporting.
///
/// I-frame variants are dropped: they are not playable renditions.
pub fn parse_playlist(text: &str, url: &str) -> Result<ParsedPlaylist, SessionError> {
    match parse_playlist_res(text.as_bytes()) {
        Ok(m3u8_rs::Playlist::MasterPlaylist(master)) => {
            let variants = master
                .variants
                .into_iter()
                .filter(|v| !v.is_i_frame)
                .map(|v| Variant {
                    uri: v.uri,
                    bandwidth: v.bandwidth,
                    resolution: v.resolution.map(|r| (r.width, r.height)),
                })
                .collect::<Vec<_>>();
            debug!(url, variants = variants.len(), "Parsed master playlist");
            Ok(ParsedPlaylist::Master(variants))
        }
        Ok(m3u8_rs::Playlist::MediaPlaylist(media)) => {
            let media_sequence = media.media_sequence;
            let segments = media
                .segments
                .into_iter()
                .enumerate()
                .map(|(idx, s)| Segment {
                    uri: s.uri,
                    duration: f64::from(s.duration),
                    sequence: media_sequence + idx as u64,
                })
                .collect::<Vec<_>>();
            let playlist_type = match media.playlist_type {
                Some(MediaPlaylistType::Vod) => Some(PlaylistType::Vod),
                Some(MediaPlaylistType::Event) => Some(PlaylistType::Event),
                _ => None,
            };
            debug!(url, media_sequence, segments = segments.len(), "Parsed media playlist");
            Ok(ParsedPlaylist::Media(MediaPlaylistInfo {
                media_sequence,
                segments,
                ended: media.end_list,
                playlist_type,
            }))
        }
        Err(e) => Err(SessionError::playlist_parse(url, e.to_string())),
    }
}

/// Chooses the rendition to play.
///
/// The highest-bandwidth 1280x720 variant wins; without one, any variant is
/// picked uniformly at random.
pub fn select_variant(variants: &[Variant]) -> Option<&Variant> {
    let preferred = variants
        .iter()
        .filter(|v| v.resolution == Some(PREFERRED_RESOLUTION))
        .max_by_key(|v| v.bandwidth);

    if preferred.is_some() {
        return preferred;
    }
    if variants.is_empty() {
        return None;
    }
    let idx = rand::rng().random_range(0..variants.len());
    variants.get(idx)
}
