//! The seam to the external extraction tool.
//!
//! The orchestrator only talks to an [`Extractor`]; the production
//! implementation lives in [`crate::ytdlp`], tests use an in-memory fake.

use crate::config::FolderKind;
use crate::error::Result;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which representation the user wants and therefore which folder it lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn folder(&self) -> FolderKind {
        match self {
            MediaKind::Video => FolderKind::Video,
            MediaKind::Audio => FolderKind::Audio,
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "video" | "v" => Ok(MediaKind::Video),
            "audio" | "a" => Ok(MediaKind::Audio),
            other => Err(format!("'{}' is not 'video' or 'audio'", other)),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => f.write_str("video"),
            MediaKind::Audio => f.write_str("audio"),
        }
    }
}

/// One selectable encoding of a source.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub format_id: String,
    pub url: String,
    pub http_headers: BTreeMap<String, String>,
    pub extension: String,
    /// Expected size in bytes, 0 when the extractor does not know it.
    pub filesize: u64,
    /// False when `filesize` is only an estimate.
    pub exact_size: bool,
    pub has_video: bool,
    pub has_audio: bool,
    pub height: Option<u32>,
    /// Total bitrate in kbit/s.
    pub bitrate: Option<f64>,
    pub default_filename: String,
}

impl Stream {
    fn is_progressive(&self) -> bool {
        self.has_video && self.has_audio
    }

    fn is_audio_only(&self) -> bool {
        self.has_audio && !self.has_video
    }
}

/// Metadata of a resolved source.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub id: String,
    pub title: String,
    pub author: String,
    pub view_count: u64,
    pub duration_secs: u64,
    pub streams: Vec<Stream>,
}

impl MediaInfo {
    /// Picks the stream for `kind`.
    ///
    /// * `Video`: the highest resolution stream carrying both audio and video
    /// * `Audio`: an audio-only stream, `m4a` first, then highest bitrate
    pub fn select_stream(&self, kind: MediaKind) -> Option<&Stream> {
        match kind {
            MediaKind::Video => self
                .streams
                .iter()
                .filter(|s| s.is_progressive())
                .max_by(|a, b| {
                    a.height
                        .unwrap_or(0)
                        .cmp(&b.height.unwrap_or(0))
                        .then_with(|| compare_bitrate(a, b))
                }),
            MediaKind::Audio => self
                .streams
                .iter()
                .filter(|s| s.is_audio_only())
                .max_by(|a, b| {
                    (a.extension == "m4a")
                        .cmp(&(b.extension == "m4a"))
                        .then_with(|| compare_bitrate(a, b))
                }),
        }
    }
}

fn compare_bitrate(a: &Stream, b: &Stream) -> Ordering {
    a.bitrate
        .unwrap_or(0.0)
        .partial_cmp(&b.bitrate.unwrap_or(0.0))
        .unwrap_or(Ordering::Equal)
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub url: String,
    pub title: String,
    pub author: String,
    pub view_count: Option<u64>,
    pub duration_secs: Option<u64>,
}

/// Called for every chunk written: `(stream, chunk, bytes_remaining)`.
pub type ChunkCallback<'a> = dyn FnMut(&Stream, &[u8], u64) + 'a;

/// The external extraction collaborator.
#[allow(async_fn_in_trait)]
pub trait Extractor {
    /// Fetches metadata and the available streams of `identifier`.
    async fn resolve(&self, identifier: &str) -> Result<MediaInfo>;

    /// Runs a free-text search and returns results in ranking order.
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;

    /// Writes `stream` into `destination` as `stream.default_filename`,
    /// calling `on_chunk` after every chunk. Returns the written file path.
    async fn transfer(
        &self,
        stream: &Stream,
        destination: &Path,
        on_chunk: &mut ChunkCallback<'_>,
    ) -> Result<PathBuf>;
}

/// Canonical watch URL for a video id.
pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

/// Replaces characters that are not allowed in file names on common
/// platforms and trims trailing dots and spaces.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}
