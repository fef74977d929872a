//! A console menu for downloading YouTube videos and audio.
//!
//! This library drives the `yt-dlp` extractor to download media by URL or by
//! search keyword, keeps a small JSON settings document, and reports byte
//! progress for single downloads and sequential batches.
//!
//! # Architecture
//!
//! The application is structured into several key components:
//! - `ConfigStore`: Settings document loading, merging and saving
//! - `ProgressAggregator`: Byte progress across one or more transfers
//! - `Extractor`: The seam to the extraction tool, implemented by `YtDlpExtractor`
//! - `Downloader`: item states, stream choice and sequential downloads
//! - `Menu`: Interactive screens and the error presentation boundary
//!
//! # Example
//! ```no_run
//! use ytmenu::{AppPaths, ConfigStore, Downloader, YtDlpExtractor};
//!
//! async fn example() {
//!     let paths = AppPaths::new("youtube_downloader_projects");
//!     let _store = ConfigStore::open(&paths).unwrap();
//!     let downloader = Downloader::new(YtDlpExtractor::new(&paths).await.unwrap());
//!     // ... use downloader
//! }
//! ```

pub mod config;
pub mod display;
pub mod downloader;
pub mod error;
pub mod extractor;
pub mod format;
pub mod menu;
pub mod progress;
pub mod selection;
pub mod ytdlp;

// Re-export commonly used items
pub use config::{AppPaths, ConfigStore};
pub use downloader::{BatchReport, DownloadTarget, Downloader};
pub use error::AppError;
pub use extractor::{Extractor, MediaKind};
pub use menu::{Console, Menu};
pub use progress::ProgressAggregator;
pub use ytdlp::YtDlpExtractor;
