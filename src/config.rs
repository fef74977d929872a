//! Configuration management for the application.
//!
//! Holds the on-disk layout ([`AppPaths`]), the persisted user settings
//! ([`Settings`]) and the store that loads, merges and saves them
//! ([`ConfigStore`]). Everything is constructed once at startup and passed by
//! reference; there are no globals.

use crate::error::{AppError, Rejection, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_ROOT: &str = "youtube_downloader_projects";
pub const ROOT_ENV: &str = "YTMENU_ROOT";

pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 16;
pub const DEFAULT_WORKERS: usize = 4;

/// Filesystem layout derived from the project root.
///
/// # Examples
///
/// ```
/// use ytmenu::config::AppPaths;
///
/// let paths = AppPaths::new("projects");
/// assert!(paths.config_file.ends_with("config.json"));
/// ```
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub config_file: PathBuf,
    pub libraries_dir: PathBuf,
    pub failure_report: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_file: root.join("config.json"),
            libraries_dir: root.join("libs"),
            failure_report: root.join("failed.txt"),
            root,
        }
    }

    /// Uses `YTMENU_ROOT` when set, the default project folder otherwise.
    pub fn from_env() -> Self {
        match std::env::var(ROOT_ENV) {
            Ok(root) if !root.trim().is_empty() => Self::new(root.trim()),
            _ => Self::new(DEFAULT_ROOT),
        }
    }
}

/// The three managed storage folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FolderKind {
    Audio,
    Video,
    Thumbnail,
}

impl FolderKind {
    pub const ALL: [FolderKind; 3] = [FolderKind::Audio, FolderKind::Video, FolderKind::Thumbnail];

    pub fn as_str(&self) -> &'static str {
        match self {
            FolderKind::Audio => "audio",
            FolderKind::Video => "video",
            FolderKind::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for FolderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Folders {
    pub audio: PathBuf,
    pub video: PathBuf,
    pub thumbnail: PathBuf,
}

impl Folders {
    fn under(root: &Path) -> Self {
        Self {
            audio: root.join("audio"),
            video: root.join("video"),
            thumbnail: root.join("thumbnail"),
        }
    }

    pub fn get(&self, kind: FolderKind) -> &Path {
        match kind {
            FolderKind::Audio => &self.audio,
            FolderKind::Video => &self.video,
            FolderKind::Thumbnail => &self.thumbnail,
        }
    }

    fn set(&mut self, kind: FolderKind, path: PathBuf) {
        match kind {
            FolderKind::Audio => self.audio = path,
            FolderKind::Video => self.video = path,
            FolderKind::Thumbnail => self.thumbnail = path,
        }
    }
}

/// Persisted user settings.
///
/// Field order is the key order of the saved document; `filters` is a
/// `BTreeMap` so its keys are written sorted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub max_workers: usize,
    pub folders: Folders,
    pub filters: BTreeMap<String, Value>,
}

impl Settings {
    pub fn defaults(root: &Path) -> Self {
        let mut filters = BTreeMap::new();
        filters.insert("upload_date".to_string(), Value::from("Today"));
        filters.insert("type".to_string(), Value::from("Video"));
        filters.insert("duration".to_string(), Value::from("Under 4 minutes"));
        filters.insert(
            "features".to_string(),
            Value::from(vec!["4K", "Creative Commons"]),
        );
        filters.insert("sort_by".to_string(), Value::from("Upload date"));

        Self {
            max_workers: DEFAULT_WORKERS,
            folders: Folders::under(root),
            filters,
        }
    }
}

/// What `load()` did with the document.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded,
    Missing,
    Ignored(AppError),
}

/// Result of an accepted change: the in-memory value is updated either way.
#[derive(Debug)]
pub enum Persist {
    Saved,
    NotSaved(AppError),
}

pub struct ConfigStore {
    path: PathBuf,
    settings: Settings,
}

impl ConfigStore {
    /// Store holding the defaults for `paths`, nothing read or created yet.
    pub fn with_defaults(paths: &AppPaths) -> Self {
        Self {
            path: paths.config_file.clone(),
            settings: Settings::defaults(&paths.root),
        }
    }

    /// Defaults, merged with the document if present, with every folder
    /// created.
    ///
    /// # Errors
    /// * If a storage folder cannot be created
    pub fn open(paths: &AppPaths) -> Result<Self> {
        let mut store = Self::with_defaults(paths);
        store.load();
        store.ensure_folders()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn folder(&self, kind: FolderKind) -> &Path {
        self.settings.folders.get(kind)
    }

    pub fn max_workers(&self) -> usize {
        self.settings.max_workers
    }

    /// Merges the document at the fixed path into the current settings.
    /// Never fails: a broken document is logged and the current values stay.
    pub fn load(&mut self) -> LoadOutcome {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no settings document, using defaults");
            return LoadOutcome::Missing;
        }

        match self.read_document() {
            Ok(document) => {
                self.merge(&document);
                info!(path = %self.path.display(), "settings loaded");
                LoadOutcome::Loaded
            }
            Err(e) => {
                warn!("Could not read settings file: {}", e);
                LoadOutcome::Ignored(e)
            }
        }
    }

    fn read_document(&self) -> Result<Map<String, Value>> {
        let text = fs::read_to_string(&self.path).map_err(|e| self.io_error(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| self.io_error(e.to_string()))
    }

    /// Each recognized key is taken on its own; a key with the wrong type is
    /// skipped without touching its siblings.
    fn merge(&mut self, document: &Map<String, Value>) {
        if let Some(workers) = field::<i64>(document, "max_workers") {
            match validate_workers(workers) {
                Ok(workers) => self.settings.max_workers = workers,
                Err(e) => warn!("Ignoring stored max_workers: {}", e),
            }
        }

        if let Some(folders) = field::<Map<String, Value>>(document, "folders") {
            for kind in FolderKind::ALL {
                let path = field::<String>(&folders, kind.as_str());
                if let Some(path) = path.filter(|p| !p.trim().is_empty()) {
                    self.settings.folders.set(kind, PathBuf::from(path));
                }
            }
        }

        if let Some(filters) = field::<BTreeMap<String, Value>>(document, "filters") {
            self.settings.filters = filters;
        }
    }

    /// Writes the settings as indented JSON, creating the parent folder.
    ///
    /// # Errors
    /// * `AppError::ConfigIo` if serialization or any write fails
    pub fn save(&self) -> Result<()> {
        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.settings
            .serialize(&mut serializer)
            .map_err(|e| self.io_error(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e.to_string()))?;
        }
        fs::write(&self.path, buffer).map_err(|e| self.io_error(e.to_string()))?;

        info!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    fn persist(&self) -> Persist {
        match self.save() {
            Ok(()) => Persist::Saved,
            Err(e) => {
                warn!("Could not save settings file: {}", e);
                Persist::NotSaved(e)
            }
        }
    }

    fn io_error(&self, message: String) -> AppError {
        AppError::ConfigIo {
            path: self.path.clone(),
            message,
        }
    }

    /// Creates every configured storage folder.
    pub fn ensure_folders(&self) -> Result<()> {
        for kind in FolderKind::ALL {
            fs::create_dir_all(self.folder(kind))?;
        }
        Ok(())
    }

    /// Accepts 1..=16 and saves; anything else leaves value and file alone.
    pub fn set_worker_count(&mut self, count: i64) -> std::result::Result<Persist, Rejection> {
        let count = validate_workers(count)?;
        self.settings.max_workers = count;
        Ok(self.persist())
    }

    /// Same as [`ConfigStore::set_worker_count`] for raw user input.
    pub fn set_worker_count_input(&mut self, input: &str) -> std::result::Result<Persist, Rejection> {
        let trimmed = input.trim();
        let count = trimmed
            .parse::<i64>()
            .map_err(|_| Rejection::NotANumber(trimmed.to_string()))?;
        self.set_worker_count(count)
    }

    /// Points `kind` at `path`, creating the folder, then saves.
    pub fn set_storage_path(
        &mut self,
        kind: FolderKind,
        path: &str,
    ) -> std::result::Result<Persist, Rejection> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(Rejection::EmptyPath);
        }

        let path = PathBuf::from(trimmed);
        fs::create_dir_all(&path).map_err(|source| Rejection::CreateFolder {
            path: path.clone(),
            source,
        })?;

        self.settings.folders.set(kind, path);
        Ok(self.persist())
    }
}

fn validate_workers(count: i64) -> std::result::Result<usize, Rejection> {
    if count < MIN_WORKERS as i64 || count > MAX_WORKERS as i64 {
        return Err(Rejection::WorkerCountOutOfRange {
            value: count,
            min: MIN_WORKERS,
            max: MAX_WORKERS,
        });
    }
    Ok(count as usize)
}

/// Reads `key` from a settings object. Absent and `null` values are skipped
/// silently, values of the wrong type with a warning.
fn field<T: DeserializeOwned>(document: &Map<String, Value>, key: &str) -> Option<T> {
    let value = document.get(key).filter(|v| !v.is_null())?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("Ignoring stored {}: {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    fn fixture() -> (TempDir, AppPaths) {
        let dir = tempdir().unwrap();
        let paths = AppPaths::new(dir.path().join("projects"));
        (dir, paths)
    }

    #[test]
    fn absent_document_uses_defaults_and_creates_folders() {
        let (_dir, paths) = fixture();
        let store = ConfigStore::open(&paths).unwrap();

        assert_eq!(store.max_workers(), 4);
        assert_eq!(store.folder(FolderKind::Audio), paths.root.join("audio"));
        for kind in FolderKind::ALL {
            assert!(store.folder(kind).is_dir(), "{} folder missing", kind);
        }
        assert!(!paths.config_file.exists());
    }

    #[test]
    fn every_valid_worker_count_is_persisted() {
        let (_dir, paths) = fixture();
        let mut store = ConfigStore::open(&paths).unwrap();

        for n in 1..=16 {
            assert!(matches!(store.set_worker_count(n), Ok(Persist::Saved)));
            let mut fresh = ConfigStore::with_defaults(&paths);
            assert!(matches!(fresh.load(), LoadOutcome::Loaded));
            assert_eq!(fresh.max_workers(), n as usize);
        }
    }

    #[test]
    fn invalid_worker_counts_leave_value_and_file_untouched() {
        let (_dir, paths) = fixture();
        let mut store = ConfigStore::open(&paths).unwrap();
        store.set_worker_count(7).unwrap();
        let before = fs::read(&paths.config_file).unwrap();

        for n in [0, -1, 17, 100, i64::MIN, i64::MAX] {
            let err = store.set_worker_count(n).unwrap_err();
            assert!(matches!(err, Rejection::WorkerCountOutOfRange { .. }));
        }
        for input in ["abc", "", "4.5", "  "] {
            assert!(store.set_worker_count_input(input).is_err());
        }

        assert_eq!(store.max_workers(), 7);
        assert_eq!(fs::read(&paths.config_file).unwrap(), before);
    }

    #[test]
    fn rejected_worker_count_does_not_create_document() {
        let (_dir, paths) = fixture();
        let mut store = ConfigStore::open(&paths).unwrap();
        let err = store.set_worker_count_input("seventeen").unwrap_err();
        assert!(matches!(err, Rejection::NotANumber(_)));
        assert!(!paths.config_file.exists());
    }

    #[test]
    fn worker_input_is_trimmed() {
        let (_dir, paths) = fixture();
        let mut store = ConfigStore::open(&paths).unwrap();
        store.set_worker_count_input(" 12 \n").unwrap();
        assert_eq!(store.max_workers(), 12);
    }

    #[test]
    fn save_then_load_round_trips() {
        let (dir, paths) = fixture();
        let mut store = ConfigStore::open(&paths).unwrap();
        store.set_worker_count(9).unwrap();
        let music = dir.path().join("music");
        store
            .set_storage_path(FolderKind::Audio, music.to_str().unwrap())
            .unwrap();
        store.settings.filters.insert("lang".into(), json!(["vi", "en"]));
        store.save().unwrap();

        let mut fresh = ConfigStore::with_defaults(&paths);
        assert!(matches!(fresh.load(), LoadOutcome::Loaded));
        assert_eq!(fresh.settings(), store.settings());
        assert_eq!(fresh.folder(FolderKind::Audio), music.as_path());
    }

    #[test]
    fn saved_document_has_expected_keys_in_order() {
        let (_dir, paths) = fixture();
        let store = ConfigStore::open(&paths).unwrap();
        store.save().unwrap();

        let text = fs::read_to_string(&paths.config_file).unwrap();
        let workers = text.find("\"max_workers\"").unwrap();
        let folders = text.find("\"folders\"").unwrap();
        let filters = text.find("\"filters\"").unwrap();
        assert!(workers < folders && folders < filters);
        assert!(text.contains("\n    \"max_workers\": 4"));

        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["filters"]["features"], json!(["4K", "Creative Commons"]));
    }

    #[test]
    fn partial_document_keeps_missing_defaults() {
        let (_dir, paths) = fixture();
        fs::create_dir_all(&paths.root).unwrap();
        fs::write(
            &paths.config_file,
            r#"{"folders": {"video": "clips"}, "theme": "dark"}"#,
        )
        .unwrap();

        let mut store = ConfigStore::with_defaults(&paths);
        assert!(matches!(store.load(), LoadOutcome::Loaded));
        assert_eq!(store.folder(FolderKind::Video), Path::new("clips"));
        assert_eq!(store.folder(FolderKind::Audio), paths.root.join("audio"));
        assert_eq!(store.max_workers(), DEFAULT_WORKERS);
        assert_eq!(store.settings().filters, Settings::defaults(&paths.root).filters);
    }

    #[test]
    fn out_of_range_stored_workers_are_ignored() {
        let (_dir, paths) = fixture();
        fs::create_dir_all(&paths.root).unwrap();
        fs::write(&paths.config_file, r#"{"max_workers": 64}"#).unwrap();

        let mut store = ConfigStore::with_defaults(&paths);
        store.load();
        assert_eq!(store.max_workers(), DEFAULT_WORKERS);
    }

    #[test]
    fn mistyped_key_keeps_valid_siblings() {
        let (_dir, paths) = fixture();
        fs::create_dir_all(&paths.root).unwrap();
        fs::write(
            &paths.config_file,
            r#"{"max_workers": "8", "folders": {"audio": "music", "video": 3}, "filters": []}"#,
        )
        .unwrap();

        let mut store = ConfigStore::with_defaults(&paths);
        assert!(matches!(store.load(), LoadOutcome::Loaded));
        assert_eq!(store.max_workers(), DEFAULT_WORKERS);
        assert_eq!(store.folder(FolderKind::Audio), Path::new("music"));
        assert_eq!(store.folder(FolderKind::Video), paths.root.join("video"));
        assert_eq!(store.settings().filters, Settings::defaults(&paths.root).filters);

        fs::write(&paths.config_file, r#"{"max_workers": 12, "filters": "none"}"#).unwrap();
        store.load();
        assert_eq!(store.max_workers(), 12);
    }

    #[test]
    fn malformed_document_is_ignored_and_left_on_disk() {
        let (_dir, paths) = fixture();
        fs::create_dir_all(&paths.root).unwrap();
        let garbage = "{ \"max_workers\": 8, ";
        fs::write(&paths.config_file, garbage).unwrap();

        let mut store = ConfigStore::with_defaults(&paths);
        assert!(matches!(
            store.load(),
            LoadOutcome::Ignored(AppError::ConfigIo { .. })
        ));
        assert_eq!(store.settings(), &Settings::defaults(&paths.root));
        assert_eq!(fs::read_to_string(&paths.config_file).unwrap(), garbage);
    }

    #[test]
    fn storage_path_is_created_and_saved() {
        let (dir, paths) = fixture();
        let mut store = ConfigStore::open(&paths).unwrap();
        let nested = dir.path().join("a").join("b").join("thumbs");

        let outcome = store
            .set_storage_path(FolderKind::Thumbnail, nested.to_str().unwrap())
            .unwrap();
        assert!(matches!(outcome, Persist::Saved));
        assert!(nested.is_dir());

        let text = fs::read_to_string(&paths.config_file).unwrap();
        assert!(text.contains("thumbs"));
    }

    #[test]
    fn empty_storage_path_is_rejected() {
        let (_dir, paths) = fixture();
        let mut store = ConfigStore::open(&paths).unwrap();
        let before = store.folder(FolderKind::Video).to_path_buf();

        assert!(matches!(
            store.set_storage_path(FolderKind::Video, "   "),
            Err(Rejection::EmptyPath)
        ));
        assert_eq!(store.folder(FolderKind::Video), before);
    }

    #[test]
    fn unwritable_document_path_is_reported_not_fatal() {
        let (dir, _paths) = fixture();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "not a folder").unwrap();
        let paths = AppPaths::new(blocker.join("root"));

        let mut store = ConfigStore::with_defaults(&paths);
        let outcome = store.set_worker_count(3).unwrap();
        assert!(matches!(outcome, Persist::NotSaved(AppError::ConfigIo { .. })));
        assert_eq!(store.max_workers(), 3);
    }
}
