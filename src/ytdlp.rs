use crate::config::AppPaths;
use crate::error::{AppError, Result, UnavailableReason};
use crate::extractor::{
    sanitize_filename, watch_url, ChunkCallback, Extractor, MediaInfo, SearchResult, Stream,
};
use reqwest::header::{HeaderMap, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument};
use yt_dlp::fetcher::deps::Libraries;
use yt_dlp::model::format::{Container, Extension, Format, FormatType, HttpHeaders, Protocol};
use yt_dlp::model::Video;
use yt_dlp::Youtube;

#[cfg(windows)]
const YT_DLP_BINARY: &str = "yt-dlp.exe";
#[cfg(not(windows))]
const YT_DLP_BINARY: &str = "yt-dlp";
#[cfg(windows)]
const FFMPEG_BINARY: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const FFMPEG_BINARY: &str = "ffmpeg";

/// Number of results requested per keyword search.
pub const SEARCH_LIMIT: usize = 10;

/// Size of each ranged request. Large single requests get throttled.
const RANGE_SIZE: u64 = 10 * 1024 * 1024;

/// The production [`Extractor`], backed by the `yt-dlp` crate.
///
/// Metadata comes from [`Youtube::fetch_video_infos`]. Search runs the same
/// executable with `ytsearchN:` since the crate has no search call. The bytes
/// of the chosen stream are fetched directly over HTTP so every chunk can be
/// reported.
pub struct YtDlpExtractor {
    youtube: Youtube,
    client: reqwest::Client,
    range_size: u64,
}

impl YtDlpExtractor {
    /// Installs or updates the binaries under `paths.libraries_dir`
    ///
    /// # Errors
    /// * If the libraries folder cannot be created
    /// * If downloading or updating the binaries fails
    #[instrument(skip(paths))]
    pub async fn new(paths: &AppPaths) -> Result<Self> {
        tokio::fs::create_dir_all(&paths.libraries_dir).await?;
        let youtube = Self::install_binaries(paths).await?;
        Ok(Self::with_youtube(youtube))
    }

    /// Wraps an already configured fetcher.
    pub fn with_youtube(youtube: Youtube) -> Self {
        Self {
            youtube,
            client: reqwest::Client::new(),
            range_size: RANGE_SIZE,
        }
    }

    /// Downloads yt-dlp and ffmpeg when missing, otherwise updates yt-dlp in
    /// place.
    async fn install_binaries(paths: &AppPaths) -> Result<Youtube> {
        let yt_dlp = paths.libraries_dir.join(YT_DLP_BINARY);
        let ffmpeg = paths.libraries_dir.join(FFMPEG_BINARY);

        if !yt_dlp.exists() || !ffmpeg.exists() {
            info!("Installing yt-dlp and ffmpeg into {}", paths.libraries_dir.display());
            let youtube =
                Youtube::with_new_binaries(paths.libraries_dir.clone(), paths.root.clone()).await?;
            return Ok(youtube);
        }

        let libraries = Libraries::new(yt_dlp, ffmpeg);
        let youtube = Youtube::new(libraries, paths.root.clone())?;
        youtube.update_downloader().await?;
        Ok(youtube)
    }

    async fn run_json(&self, args: &[&str]) -> Result<String> {
        debug!(?args, "running yt-dlp");
        let output = Command::new(&self.youtube.libraries.youtube)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Extractor for YtDlpExtractor {
    async fn resolve(&self, identifier: &str) -> Result<MediaInfo> {
        let video = self
            .youtube
            .fetch_video_infos(identifier.to_string())
            .await
            .map_err(classify_fetch_error)?;
        Ok(media_from_video(video))
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let term = format!("ytsearch{}:{}", SEARCH_LIMIT, query);
        let json = self
            .run_json(&["-J", "--flat-playlist", "--no-warnings", &term])
            .await?;
        parse_search(&json)
    }

    async fn transfer(
        &self,
        stream: &Stream,
        destination: &Path,
        on_chunk: &mut ChunkCallback<'_>,
    ) -> Result<PathBuf> {
        debug!(format = %stream.format_id, exact = stream.exact_size, "starting transfer");
        tokio::fs::create_dir_all(destination).await?;
        let path = destination.join(&stream.default_filename);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut written: u64 = 0;

        // Only an exact size bounds the ranges up front. Otherwise the length
        // is taken from the server's Content-Range.
        let mut total = Some(stream.filesize).filter(|&size| stream.exact_size && size > 0);

        loop {
            let end = match total {
                Some(total) => (written + self.range_size).min(total) - 1,
                None => written + self.range_size - 1,
            };
            let mut request = self
                .client
                .get(&stream.url)
                .header(RANGE, format!("bytes={}-{}", written, end));
            for (name, value) in &stream.http_headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let response = request.send().await?;
            if response.status() == StatusCode::RANGE_NOT_SATISFIABLE
                && content_range_total(response.headers()) == Some(written)
            {
                break;
            }
            let mut response = response.error_for_status()?;
            let partial = response.status() == StatusCode::PARTIAL_CONTENT;
            if partial {
                if let Some(length) = content_range_total(response.headers()) {
                    total = Some(length);
                }
            }

            let before = written;
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
                on_chunk(stream, &chunk, stream.filesize.saturating_sub(written));
            }

            // a plain 200 carries the whole body
            if !partial {
                break;
            }
            let received = written - before;
            match total {
                Some(total) if written >= total => break,
                None if received < end + 1 - before => break,
                _ => {}
            }
            if received == 0 {
                return Err(AppError::Unknown(format!(
                    "server stopped sending data after {} bytes",
                    written
                )));
            }
        }

        file.flush().await?;
        debug!(path = %path.display(), written, "transfer finished");
        Ok(path)
    }
}

/// Full length from a `Content-Range: bytes a-b/len` header, `None` when the
/// header is missing or the length is `*`.
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)?
        .to_str()
        .ok()?
        .rsplit('/')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Maps the fetcher's error to the error taxonomy. A failed yt-dlp run
/// carries its stderr in the message.
fn classify_fetch_error(error: yt_dlp::error::Error) -> AppError {
    match error {
        yt_dlp::error::Error::Command(output) => classify_failure(&output),
        other => AppError::Youtube(other),
    }
}

/// Converts the fetcher's metadata into [`MediaInfo`].
///
/// Only audio and video formats served over HTTPS are kept. Manifests and
/// storyboards cannot be fetched with ranged requests.
pub fn media_from_video(video: Video) -> MediaInfo {
    let stem = sanitize_filename(&video.title);

    let streams = video
        .formats
        .iter()
        .filter(|f| f.protocol == Protocol::Https)
        .filter(|f| {
            matches!(
                f.format_type(),
                FormatType::Audio | FormatType::Video | FormatType::AudioAndVideo
            )
        })
        .map(|f| stream_from_format(f, &stem))
        .collect();

    MediaInfo {
        duration_secs: storyboard_duration(&video.formats) as u64,
        view_count: u64::try_from(video.view_count).unwrap_or(0),
        author: video.channel,
        id: video.id,
        title: video.title,
        streams,
    }
}

fn stream_from_format(format: &Format, stem: &str) -> Stream {
    let (size, exact_size) = match (format.file_info.filesize, format.file_info.filesize_approx) {
        (Some(size), _) => (size, true),
        (None, Some(size)) => (size, false),
        (None, None) => (0, false),
    };
    let extension = extension_of(format);

    Stream {
        format_id: format.format_id.clone(),
        url: format.download_info.url.clone(),
        http_headers: header_map(&format.download_info.http_headers),
        default_filename: format!("{}.{}", stem, extension),
        extension: extension.to_string(),
        filesize: u64::try_from(size).unwrap_or(0),
        exact_size,
        has_video: format.codec_info.video_codec.is_some(),
        has_audio: format.codec_info.audio_codec.is_some(),
        height: format
            .video_resolution
            .height
            .and_then(|h| u32::try_from(h).ok()),
        bitrate: format.rates_info.total_rate.or(format.rates_info.audio_rate),
    }
}

/// The metadata model has no duration field. Every storyboard spans the
/// whole video, so the fragment durations of one of them add up to it.
fn storyboard_duration(formats: &[Format]) -> f64 {
    formats
        .iter()
        .find_map(|f| f.storyboard_info.fragments.as_ref())
        .map(|fragments| fragments.iter().map(|f| f.duration).sum())
        .unwrap_or(0.0)
}

/// File extension of a format. `m4a` is not among the model's known
/// extensions, so the DASH container is consulted before the codecs.
fn extension_of(format: &Format) -> &'static str {
    match (&format.download_info.ext, &format.container) {
        (Extension::Mp4, _) => "mp4",
        (Extension::Webm, _) => "webm",
        (Extension::M4A, _) | (_, Some(Container::M4A)) => "m4a",
        (_, Some(Container::Mp4)) => "mp4",
        (_, Some(Container::Webm)) => "webm",
        _ => match format.codec_info.audio_codec.as_deref() {
            Some(codec) if format.codec_info.video_codec.is_none() && codec.starts_with("mp4a") => {
                "m4a"
            }
            Some("opus") if format.codec_info.video_codec.is_none() => "webm",
            _ => "mp4",
        },
    }
}

fn header_map(headers: &HttpHeaders) -> BTreeMap<String, String> {
    [
        ("User-Agent", &headers.user_agent),
        ("Accept", &headers.accept),
        ("Accept-Language", &headers.accept_language),
        ("Sec-Fetch-Mode", &headers.sec_fetch_mode),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(name, value)| (name.to_string(), value.clone()))
    .collect()
}

#[derive(Debug, Deserialize)]
struct RawSearch {
    #[serde(default)]
    entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    id: String,
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    view_count: Option<u64>,
    duration: Option<f64>,
}

/// Parses the output of a flat `ytsearchN:` query.
pub fn parse_search(json: &str) -> Result<Vec<SearchResult>> {
    let raw: RawSearch = serde_json::from_str(json)?;
    Ok(raw
        .entries
        .into_iter()
        .map(|e| SearchResult {
            url: watch_url(&e.id),
            title: e.title.unwrap_or_else(|| e.id.clone()),
            author: e.uploader.or(e.channel).unwrap_or_default(),
            view_count: e.view_count,
            duration_secs: e.duration.map(|d| d as u64),
            id: e.id,
        })
        .collect())
}

/// Maps yt-dlp's stderr to the error taxonomy.
pub fn classify_failure(stderr: &str) -> AppError {
    let message = stderr
        .lines()
        .rev()
        .find_map(|line| line.find("ERROR:").map(|at| &line[at..]))
        .or_else(|| stderr.lines().rev().find(|line| !line.trim().is_empty()))
        .unwrap_or("yt-dlp failed without output")
        .trim()
        .to_string();
    let lower = message.to_lowercase();

    let reason = if lower.contains("private video") || lower.contains("video is private") {
        UnavailableReason::Private
    } else if lower.contains("available in your country")
        || lower.contains("blocked it in your country")
        || lower.contains("geo restriction")
    {
        UnavailableReason::RegionBlocked
    } else if lower.contains("sign in to confirm")
        || lower.contains("login required")
        || lower.contains("members-only")
        || lower.contains("use --cookies")
    {
        UnavailableReason::LoginRequired
    } else if lower.contains("video unavailable")
        || lower.contains("is not available")
        || lower.contains("has been removed")
    {
        UnavailableReason::Unavailable
    } else {
        return AppError::Unknown(message);
    };

    AppError::SourceUnavailable { reason, message }
}
