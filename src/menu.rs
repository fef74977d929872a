//! Interactive numbered menus.
//!
//! Every screen returns `Result<_, AppError>` and the loops here are the only
//! place errors are turned into text. A failed operation is reported and the
//! loop it came from keeps running; closing the input ends the program.

use crate::config::{AppPaths, ConfigStore, FolderKind, Persist};
use crate::display::ProgressObserver;
use crate::downloader::{BatchReport, DownloadTarget, Downloader};
use crate::error::{AppError, Result};
use crate::extractor::{Extractor, MediaKind, SearchResult};
use crate::format::{human_duration, human_elapsed, human_size, thousands};
use crate::selection::parse_selection;
use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};

const WIDTH: usize = 70;
const APP_TITLE: &str = "YOUTUBE DOWNLOADER TOOLS V1";

/// Line based terminal I/O over any reader/writer pair.
pub struct Console<R, W> {
    input: R,
    output: W,
    clear_screen: bool,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            clear_screen: false,
        }
    }

    /// Clears the terminal before every header.
    pub fn clearing(mut self) -> Self {
        self.clear_screen = true;
        self
    }

    pub fn say(&mut self, text: impl Display) -> Result<()> {
        writeln!(self.output, "{}", text)?;
        Ok(())
    }

    fn rule(&mut self, ch: char) -> Result<()> {
        self.say(ch.to_string().repeat(WIDTH))
    }

    pub fn header(&mut self, title: &str) -> Result<()> {
        if self.clear_screen {
            write!(self.output, "\x1B[2J\x1B[1;1H")?;
        }
        self.rule('=')?;
        let text = format!("{} - {}", APP_TITLE, title.to_uppercase());
        self.say(format!("{:^width$}", text, width = WIDTH))?;
        self.rule('=')
    }

    /// Prints `text` and reads one trimmed line.
    ///
    /// # Errors
    /// * `io::ErrorKind::UnexpectedEof` once the input is closed
    pub fn prompt(&mut self, text: &str) -> Result<String> {
        write!(self.output, "{}", text)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed").into());
        }
        Ok(line.trim().to_string())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.prompt("\nPress Enter to continue...")?;
        Ok(())
    }
}

fn is_closed_input(error: &AppError) -> bool {
    matches!(error, AppError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
}

/// What the top level loop should do after a screen returns.
enum Flow {
    Continue,
    Exit,
}

pub struct Menu<E, R, W> {
    console: Console<R, W>,
    store: ConfigStore,
    downloader: Downloader<E>,
    paths: AppPaths,
    observer: Box<dyn ProgressObserver>,
}

impl<E: Extractor, R: BufRead, W: Write> Menu<E, R, W> {
    pub fn new(
        console: Console<R, W>,
        store: ConfigStore,
        downloader: Downloader<E>,
        paths: AppPaths,
        observer: Box<dyn ProgressObserver>,
    ) -> Self {
        Self {
            console,
            store,
            downloader,
            paths,
            observer,
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.store
    }

    /// Runs the main screen until the user exits or the input closes.
    ///
    /// # Errors
    /// * Only if the console output itself cannot be written
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let flow = match self.main_screen().await {
                Ok(flow) => flow,
                Err(e) if is_closed_input(&e) => Flow::Exit,
                Err(e) => match self.report(&e) {
                    Ok(()) => Flow::Continue,
                    Err(e) if is_closed_input(&e) => Flow::Exit,
                    Err(e) => return Err(e),
                },
            };
            if let Flow::Exit = flow {
                break;
            }
        }
        self.console.say("\nThanks for using the tool!")?;
        info!("menu closed");
        Ok(())
    }

    /// Prints `error` according to its category.
    fn report(&mut self, error: &AppError) -> Result<()> {
        let text = match error {
            AppError::SourceUnavailable { reason, message } => {
                format!("❌ Video error ({}): {}", reason, message)
            }
            AppError::ConfigIo { .. } => format!("⚠️ {}", error),
            _ => format!("❌ Unexpected error: {}", error),
        };
        self.console.say(text)?;
        self.console.pause()
    }

    /// Runs one round of a sub screen, reporting its failure in place.
    fn settle(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Err(e) if !is_closed_input(&e) => self.report(&e),
            other => other,
        }
    }

    async fn main_screen(&mut self) -> Result<Flow> {
        self.console.header("Main screen")?;
        self.console.say(" [1] Download video/audio from URL")?;
        self.console.say(" [2] Download playlist from URL")?;
        self.console.say(" [3] Download from keyword")?;
        self.console.rule('-')?;
        self.console.say(" [4] Settings")?;
        self.console.say(" [0] Exit")?;
        self.console.rule('=')?;
        self.print_configuration()?;
        self.console.rule('=')?;

        match self.console.prompt("Enter your option: ")?.as_str() {
            "1" => self.download_from_url().await?,
            "2" => {
                self.console.say("⚠️ Playlist download is not implemented yet.")?;
                self.console.pause()?;
            }
            "3" => self.download_from_keyword().await?,
            "4" => self.settings()?,
            "0" => return Ok(Flow::Exit),
            _ => {
                self.console.say("❌ Invalid option, please try again.")?;
                self.console.pause()?;
            }
        }
        Ok(Flow::Continue)
    }

    fn print_configuration(&mut self) -> Result<()> {
        let workers = self.store.max_workers();
        let audio = self.store.folder(FolderKind::Audio).display().to_string();
        let video = self.store.folder(FolderKind::Video).display().to_string();
        let thumbnail = self.store.folder(FolderKind::Thumbnail).display().to_string();
        self.console.say(" Current configuration:")?;
        self.console.say(format!("    Workers: {}", workers))?;
        self.console.say("    Folders:")?;
        self.console.say(format!("        Audio: {}", audio))?;
        self.console.say(format!("        Video: {}", video))?;
        self.console.say(format!("        Thumbnail: {}", thumbnail))
    }

    fn print_folders(&mut self) -> Result<()> {
        let audio = self.store.folder(FolderKind::Audio).display().to_string();
        let video = self.store.folder(FolderKind::Video).display().to_string();
        self.console.say("Folders:")?;
        self.console.say(format!("   Audio: {}", audio))?;
        self.console.say(format!("   Video: {}", video))
    }

    /// Folder for `kind`, created if it went missing since startup.
    fn destination(&self, kind: MediaKind) -> Result<PathBuf> {
        let folder = self.store.folder(kind.folder()).to_path_buf();
        std::fs::create_dir_all(&folder)?;
        Ok(folder)
    }

    fn ask_media_kind(&mut self) -> Result<MediaKind> {
        loop {
            let answer = self.console.prompt("Choose download type (video/audio): ")?;
            match answer.parse::<MediaKind>() {
                Ok(kind) => return Ok(kind),
                Err(_) => self
                    .console
                    .say("⚠️ Invalid choice. Please enter 'video' or 'audio'.")?,
            }
        }
    }

    async fn download_from_url(&mut self) -> Result<()> {
        loop {
            self.console.header("Download video/audio from URL")?;
            self.print_folders()?;
            self.console.rule('-')?;
            self.console.say("[q] To back")?;
            self.console.rule('=')?;

            let url = self.console.prompt(">>> Enter URL: ")?;
            if url == "q" {
                return Ok(());
            }
            if url.is_empty() {
                continue;
            }

            let result = self.download_url_round(&url).await;
            self.settle(result)?;
        }
    }

    async fn download_url_round(&mut self, url: &str) -> Result<()> {
        let mut target = DownloadTarget::new(url, url);
        let media = self.downloader.inspect(&mut target).await?;
        self.console.say(format!("\n{}", "-".repeat(WIDTH)))?;
        self.console.say(format!("Title: {}", media.title))?;
        self.console.say(format!("Author: {}", media.author))?;
        self.console.say(format!("Views: {}", thousands(media.view_count)))?;
        self.console
            .say(format!("Duration: {}", human_duration(media.duration_secs)))?;
        self.console.rule('-')?;

        let kind = self.ask_media_kind()?;
        let stream = self.downloader.pick(&mut target, &media, kind)?;
        let destination = self.destination(kind)?;

        self.console.header("Starting download...")?;
        self.console
            .say(format!("File name: {}", stream.default_filename))?;
        let size = human_size(stream.filesize);
        if stream.exact_size {
            self.console.say(format!("Size: {}", size))?;
        } else {
            self.console.say(format!("Size: ~{}", size))?;
        }
        self.console.say(format!(
            "Saving to: {}",
            destination.join(&stream.default_filename).display()
        ))?;
        self.console.rule('=')?;

        self.downloader
            .download_one(&mut target, &destination, self.observer.as_ref())
            .await?;

        self.console.say("\n✅ Download complete!")?;
        self.console.pause()
    }

    async fn download_from_keyword(&mut self) -> Result<()> {
        loop {
            self.console.header("Download video/audio from keyword")?;
            self.print_folders()?;
            self.console.rule('-')?;
            self.console.say("[q] To back")?;
            self.console.rule('=')?;

            let keyword = self.console.prompt(">>> Enter keyword: ")?;
            if keyword == "q" {
                return Ok(());
            }
            if keyword.is_empty() {
                continue;
            }

            let result = self.keyword_round(&keyword).await;
            self.settle(result)?;
        }
    }

    async fn keyword_round(&mut self, keyword: &str) -> Result<()> {
        self.console.say("\nSearching...")?;
        let results = self.downloader.search(keyword).await?;
        if results.is_empty() {
            self.console.say("No results found.")?;
            return self.console.pause();
        }
        self.print_results(&results)?;

        self.console
            .say("\nSelect several results by typing their numbers separated by commas (,)")?;
        self.console.say("    Example: 1,3,5 selects results 1, 3 and 5")?;
        self.console.say("    Type 'all' to select every result")?;
        let choice = self
            .console
            .prompt("\nYour selection (or 'q' to go back): ")?;
        if choice.eq_ignore_ascii_case("q") {
            return Ok(());
        }

        let selection = parse_selection(&choice, results.len());
        for token in &selection.skipped {
            self.console
                .say(format!("⚠️ Skipped invalid selection: {}", token))?;
        }
        if selection.is_empty() {
            self.console.say("❌ Nothing valid was selected")?;
            return self.console.pause();
        }

        let targets: Vec<DownloadTarget> = selection
            .indices
            .iter()
            .map(|&i| DownloadTarget::from_search(&results[i]))
            .collect();

        self.console.say("\n✅ Selected for download:")?;
        for target in &targets {
            self.console.say(format!(" - {}", target.title))?;
        }
        self.console.pause()?;

        self.console
            .header(&format!("Download ({} selected)", targets.len()))?;
        self.print_folders()?;
        self.console.rule('=')?;
        for (i, target) in targets.iter().enumerate() {
            self.console.say(format!("[{}] - {}", i + 1, target.title))?;
        }
        let kind = self.ask_media_kind()?;
        let destination = self.destination(kind)?;

        let report = self
            .downloader
            .download_batch(targets, kind, &destination, self.observer.as_ref())
            .await;
        self.print_report(&report)?;
        if let Err(e) = report.export_failures(&self.paths.failure_report) {
            warn!("Failed to export failure report: {}", e);
        }
        self.console.pause()
    }

    fn print_results(&mut self, results: &[SearchResult]) -> Result<()> {
        self.console.rule('-')?;
        for (i, result) in results.iter().enumerate() {
            self.console.say(format!("|     ID: {}", result.id))?;
            self.console.say(format!("|     Title: {}", result.title))?;
            self.console
                .say(format!("[{}]  Author: {}", i + 1, result.author))?;
            if let Some(views) = result.view_count {
                self.console.say(format!("|     Views: {}", thousands(views)))?;
            }
            if let Some(duration) = result.duration_secs {
                self.console
                    .say(format!("|     Duration: {}", human_duration(duration)))?;
            }
            self.console.rule('-')?;
        }
        Ok(())
    }

    fn print_report(&mut self, report: &BatchReport) -> Result<()> {
        self.console
            .say(format!("Download time: {}", human_elapsed(report.elapsed)))?;
        self.console.say(format!(
            "Succeeded: {}, Failed: {}",
            report.succeeded(),
            report.failed()
        ))?;
        for target in report.failures() {
            let reason = target
                .failure
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();
            self.console
                .say(format!("❌ Error downloading {}: {}", target.title, reason))?;
        }
        Ok(())
    }

    fn settings(&mut self) -> Result<()> {
        loop {
            self.console.header("Settings")?;
            self.console.say("[1] Configure Folders")?;
            self.console.say("[2] Configure Threading")?;

            match self.console.prompt("Enter your choice ('q' to back): ")?.as_str() {
                "1" => {
                    let result = self.configure_folders();
                    self.settle(result)?;
                }
                "2" => {
                    let result = self.configure_threading();
                    self.settle(result)?;
                }
                "q" => return Ok(()),
                _ => {
                    self.console.say("❌ Invalid option, please try again.")?;
                    self.console.pause()?;
                }
            }
        }
    }

    fn configure_threading(&mut self) -> Result<()> {
        self.console.header("Threading")?;
        let current = self.store.max_workers();
        self.console.say(format!("Current workers: {}", current))?;

        let input = self
            .console
            .prompt(&format!("Enter new worker count (1-16, default: {}): ", current))?;
        if input.is_empty() {
            self.console.say(format!("✅ Keeping {} workers", current))?;
        } else {
            match self.store.set_worker_count_input(&input) {
                Ok(persist) => {
                    let text = format!("✅ Workers set to {}", self.store.max_workers());
                    self.console.say(text)?;
                    self.report_persist(persist)?;
                }
                Err(rejection) => self
                    .console
                    .say(format!("⚠️ {}; keeping {} workers", rejection, current))?,
            }
        }
        self.console.pause()
    }

    fn configure_folders(&mut self) -> Result<()> {
        loop {
            self.console.header("Folders")?;
            self.console.say("Current storage folders:")?;
            for kind in FolderKind::ALL {
                let folder = self.store.folder(kind).display().to_string();
                self.console.say(format!("    {}: {}", kind, folder))?;
            }
            self.console.rule('=')?;
            self.console.say(" [1] Change Audio folder")?;
            self.console.say(" [2] Change Video folder")?;
            self.console.say(" [3] Change Thumbnail folder")?;
            self.console.say(" [0] Back")?;
            self.console.rule('=')?;

            let kind = match self.console.prompt("Enter your option: ")?.as_str() {
                "1" => FolderKind::Audio,
                "2" => FolderKind::Video,
                "3" => FolderKind::Thumbnail,
                "0" => return Ok(()),
                _ => {
                    self.console.say("⚠️ Invalid option, please try again.")?;
                    self.console.pause()?;
                    continue;
                }
            };
            self.change_folder(kind)?;
        }
    }

    fn change_folder(&mut self, kind: FolderKind) -> Result<()> {
        let current = self.store.folder(kind).display().to_string();
        let input = self
            .console
            .prompt(&format!("Enter new folder (default: {}): ", current))?;
        if input.is_empty() {
            self.console
                .say(format!("✅ Keeping {} folder: {}", kind, current))?;
            return self.console.pause();
        }

        match self.store.set_storage_path(kind, &input) {
            Ok(persist) => {
                let folder = self.store.folder(kind).display().to_string();
                self.console
                    .say(format!("✅ {} folder set to: {}", kind, folder))?;
                self.report_persist(persist)?;
            }
            Err(rejection) => self.console.say(format!("⚠️ {}", rejection))?,
        }
        self.console.pause()
    }

    fn report_persist(&mut self, persist: Persist) -> Result<()> {
        match persist {
            Persist::Saved => {
                let path = self.store.path().display().to_string();
                self.console.say(format!("✅ Settings saved to {}", path))
            }
            Persist::NotSaved(e) => self
                .console
                .say(format!("⚠️ Change applied but not saved: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::Silent;
    use crate::error::UnavailableReason;
    use crate::extractor::{ChunkCallback, MediaInfo, Stream};
    use std::collections::BTreeMap;
    use std::io::Cursor;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    struct StubExtractor;

    fn stub_media(id: &str) -> MediaInfo {
        MediaInfo {
            id: id.to_string(),
            title: format!("clip {}", id),
            author: "stub".into(),
            view_count: 1234,
            duration_secs: 75,
            streams: vec![Stream {
                format_id: "140".into(),
                url: format!("https://cdn.example/{}", id),
                http_headers: BTreeMap::new(),
                extension: "m4a".into(),
                filesize: 64,
                exact_size: true,
                has_video: false,
                has_audio: true,
                height: None,
                bitrate: Some(128.0),
                default_filename: format!("{}.m4a", id),
            }],
        }
    }

    impl Extractor for StubExtractor {
        async fn resolve(&self, identifier: &str) -> Result<MediaInfo> {
            if identifier.contains("private") {
                return Err(AppError::SourceUnavailable {
                    reason: UnavailableReason::Private,
                    message: "Private video".into(),
                });
            }
            let id = identifier.rsplit('=').next().unwrap_or("x");
            Ok(stub_media(id))
        }

        async fn search(&self, _query: &str) -> Result<Vec<SearchResult>> {
            Ok(["s1", "s2"]
                .iter()
                .map(|id| SearchResult {
                    id: id.to_string(),
                    url: format!("https://www.youtube.com/watch?v={}", id),
                    title: format!("clip {}", id),
                    author: "stub".into(),
                    view_count: Some(5),
                    duration_secs: Some(30),
                })
                .collect())
        }

        async fn transfer(
            &self,
            stream: &Stream,
            destination: &Path,
            on_chunk: &mut ChunkCallback<'_>,
        ) -> Result<PathBuf> {
            let data = vec![1u8; stream.filesize as usize];
            on_chunk(stream, &data, 0);
            let path = destination.join(&stream.default_filename);
            std::fs::write(&path, &data)?;
            Ok(path)
        }
    }

    fn menu(dir: &TempDir, input: &str) -> Menu<StubExtractor, Cursor<Vec<u8>>, Vec<u8>> {
        let paths = AppPaths::new(dir.path().join("projects"));
        let store = ConfigStore::open(&paths).unwrap();
        let console = Console::new(Cursor::new(input.as_bytes().to_vec()), Vec::new());
        Menu::new(
            console,
            store,
            Downloader::new(StubExtractor),
            paths,
            Box::new(Silent),
        )
    }

    fn output(menu: &Menu<StubExtractor, Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8_lossy(&menu.console.output).into_owned()
    }

    #[tokio::test]
    async fn closed_input_exits_cleanly() {
        let dir = tempdir().unwrap();
        let mut menu = menu(&dir, "");
        menu.run().await.unwrap();
        assert!(output(&menu).contains("MAIN SCREEN"));
    }

    #[tokio::test]
    async fn threading_setting_is_validated_and_saved() {
        let dir = tempdir().unwrap();
        let mut menu = menu(&dir, "4\n2\n40\n\n2\n9\n\nq\n0\n");
        menu.run().await.unwrap();

        assert_eq!(menu.config().max_workers(), 9);
        let text = output(&menu);
        assert!(text.contains("worker count must be between 1 and 16, got 40"));
        assert!(text.contains("Workers set to 9"));
        assert!(menu.config().path().exists());
    }

    #[tokio::test]
    async fn folder_setting_creates_directory() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("my-audio");
        let input = format!("4\n1\n1\n{}\n\n0\nq\n0\n", target.display());
        let mut menu = menu(&dir, &input);
        menu.run().await.unwrap();

        assert!(target.is_dir());
        assert_eq!(menu.config().folder(FolderKind::Audio), target.as_path());
    }

    #[tokio::test]
    async fn unavailable_url_is_reported_and_menu_continues() {
        let dir = tempdir().unwrap();
        let mut menu = menu(&dir, "1\nhttps://www.youtube.com/watch?v=private\n\nq\n0\n");
        menu.run().await.unwrap();

        let text = output(&menu);
        assert!(text.contains("❌ Video error (video is private): Private video"));
        assert!(text.contains("Thanks for using the tool!"));
    }

    #[tokio::test]
    async fn url_download_saves_into_audio_folder() {
        let dir = tempdir().unwrap();
        let mut menu = menu(&dir, "1\nhttps://www.youtube.com/watch?v=abc\nmp3\na\n\nq\n0\n");
        menu.run().await.unwrap();

        let text = output(&menu);
        assert!(text.contains("Views: 1,234"));
        assert!(text.contains("Size: 64.0 bytes"));
        assert!(text.contains("Invalid choice"));
        assert!(text.contains("Download complete!"));
        assert!(menu.config().folder(FolderKind::Audio).join("abc.m4a").exists());
    }

    #[tokio::test]
    async fn keyword_batch_skips_invalid_indices() {
        let dir = tempdir().unwrap();
        let mut menu = menu(&dir, "3\nclips\n2,9\n\naudio\n\nq\n0\n");
        menu.run().await.unwrap();

        let text = output(&menu);
        assert!(text.contains("Skipped invalid selection: 9"));
        assert!(text.contains("Succeeded: 1, Failed: 0"));
        let audio = menu.config().folder(FolderKind::Audio);
        assert!(audio.join("s2.m4a").exists());
        assert!(!audio.join("s1.m4a").exists());
    }

    #[tokio::test]
    async fn empty_selection_is_a_no_op() {
        let dir = tempdir().unwrap();
        let mut menu = menu(&dir, "3\nclips\n7\n\nq\n0\n");
        menu.run().await.unwrap();
        assert!(output(&menu).contains("Nothing valid was selected"));
    }

    #[tokio::test]
    async fn playlist_entry_is_a_stub() {
        let dir = tempdir().unwrap();
        let mut menu = menu(&dir, "2\n\n0\n");
        menu.run().await.unwrap();
        assert!(output(&menu).contains("Playlist download is not implemented yet."));
    }
}
