//! Error types for the application.
//!
//! Three categories matter to the menu layer:
//! - Source unavailable: the extractor refused the content (private,
//!   region-blocked, removed, login required). Reported, never fatal.
//! - Config I/O: the settings document could not be read or written.
//!   Defaults are kept or the change is not persisted.
//! - Everything else is "unknown" and is shown with its message.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why the extractor refused a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    Unavailable,
    Private,
    RegionBlocked,
    LoginRequired,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnavailableReason::Unavailable => "video unavailable",
            UnavailableReason::Private => "video is private",
            UnavailableReason::RegionBlocked => "video is blocked in your region",
            UnavailableReason::LoginRequired => "login required",
        };
        f.write_str(text)
    }
}

/// Represents all possible errors that can occur in the application.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Source unavailable ({reason}): {message}")]
    SourceUnavailable {
        reason: UnavailableReason,
        message: String,
    },

    #[error("Config file {}: {message}", path.display())]
    ConfigIo { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Youtube error: {0}")]
    Youtube(#[from] yt_dlp::error::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("{0}")]
    Unknown(String),
}

impl AppError {
    /// Returns the refusal reason when the source itself was unavailable.
    pub fn unavailable_reason(&self) -> Option<UnavailableReason> {
        match self {
            AppError::SourceUnavailable { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Copies the error for bookkeeping, keeping its category.
    ///
    /// Wrapped library errors cannot be cloned and become `Unknown` with
    /// their message.
    pub fn replicate(&self) -> AppError {
        match self {
            AppError::SourceUnavailable { reason, message } => AppError::SourceUnavailable {
                reason: *reason,
                message: message.clone(),
            },
            AppError::ConfigIo { path, message } => AppError::ConfigIo {
                path: path.clone(),
                message: message.clone(),
            },
            AppError::Unknown(message) => AppError::Unknown(message.clone()),
            other => AppError::Unknown(other.to_string()),
        }
    }
}


/// A settings change that was refused. The stored value is left untouched.
#[derive(Error, Debug)]
pub enum Rejection {
    #[error("worker count must be between {min} and {max}, got {value}")]
    WorkerCountOutOfRange { value: i64, min: usize, max: usize },

    #[error("'{0}' is not a valid number")]
    NotANumber(String),

    #[error("folder path must not be empty")]
    EmptyPath,

    #[error("could not create folder {}: {source}", path.display())]
    CreateFolder { path: PathBuf, source: io::Error },
}

pub type Result<T> = std::result::Result<T, AppError>;
