use crate::display::ProgressObserver;
use crate::error::{AppError, Result};
use crate::extractor::{Extractor, MediaInfo, MediaKind, SearchResult, Stream};
use crate::progress::{FinishGuard, ProgressAggregator};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};
use url::Url;

/// Lifecycle of one queued item. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Resolving,
    Resolved,
    Transferring,
    Completed,
    Failed,
}

/// One item queued for download
///
/// # Fields
/// * `identifier` - Source URL
/// * `title` - Title shown to the user
/// * `stream` - Chosen stream, once resolved
/// * `saved_to` - Written file, once completed
/// * `failure` - Why the item failed, if it did
#[derive(Debug)]
pub struct DownloadTarget {
    pub identifier: String,
    pub title: String,
    pub stream: Option<Stream>,
    pub saved_to: Option<PathBuf>,
    pub failure: Option<AppError>,
    state: ItemState,
}

impl DownloadTarget {
    pub fn new(identifier: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
            stream: None,
            saved_to: None,
            failure: None,
            state: ItemState::Pending,
        }
    }

    pub fn from_search(result: &SearchResult) -> Self {
        Self::new(result.url.clone(), result.title.clone())
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    /// Expected size of the chosen stream, if resolved.
    pub fn expected_bytes(&self) -> Option<u64> {
        self.stream.as_ref().map(|s| s.filesize)
    }

    fn transition(&mut self, state: ItemState) {
        debug!(url = %self.identifier, from = ?self.state, to = ?state, "item state");
        self.state = state;
    }

    /// Attaches the chosen stream.
    pub fn attach(&mut self, stream: Stream) {
        self.stream = Some(stream);
        self.transition(ItemState::Resolved);
    }

    fn complete(&mut self, path: PathBuf) {
        self.saved_to = Some(path);
        self.transition(ItemState::Completed);
    }

    fn fail(&mut self, error: AppError) {
        error!("Failed to download {}: {}", self.title, error);
        self.failure = Some(error);
        self.transition(ItemState::Failed);
    }
}

/// Statistics of a finished batch.
#[derive(Debug)]
pub struct BatchReport {
    pub elapsed: Duration,
    pub items: Vec<DownloadTarget>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|t| t.state() == ItemState::Completed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|t| t.state() == ItemState::Failed)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DownloadTarget> {
        self.items.iter().filter(|t| t.state() == ItemState::Failed)
    }

    /// Appends the failed items to `path` under a timestamped heading.
    ///
    /// Does nothing when every item succeeded.
    pub fn export_failures(&self, path: &Path) -> std::io::Result<()> {
        if self.failed() == 0 {
            return Ok(());
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = std::io::BufWriter::new(file);

        writeln!(
            writer,
            "\n=== Failed Downloads Report {} ===",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;

        for target in self.failures() {
            writeln!(writer, "URL: {}", target.identifier)?;
            writeln!(writer, "Title: {}", target.title)?;
            if let Some(error) = &target.failure {
                writeln!(writer, "Error: {}", error)?;
            }
            writeln!(writer, "---")?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Drives resolution and sequential transfers through an [`Extractor`]
///
/// # Fields
/// * `extractor` - The extraction collaborator
/// * `progress` - Byte progress of the current operation
pub struct Downloader<E> {
    extractor: E,
    progress: ProgressAggregator,
}

impl<E: Extractor> Downloader<E> {
    pub fn new(extractor: E) -> Self {
        Self {
            extractor,
            progress: ProgressAggregator::new(),
        }
    }

    pub fn progress(&self) -> &ProgressAggregator {
        &self.progress
    }

    /// Fetches metadata for a source URL
    ///
    /// # Errors
    /// * `AppError::UrlParse` if `identifier` is not a URL
    /// * `AppError::SourceUnavailable` if the content is refused
    /// * Any other extractor failure
    #[instrument(skip(self))]
    pub async fn fetch(&self, identifier: &str) -> Result<MediaInfo> {
        Url::parse(identifier)?;
        self.extractor.resolve(identifier).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let results = self.extractor.search(query).await?;
        info!(query, count = results.len(), "search finished");
        Ok(results)
    }

    /// Fetches metadata for `target`, moving it to `Resolving`
    ///
    /// The target takes the title reported by the extractor. On failure the
    /// target is marked `Failed` with the same error category that is
    /// returned.
    pub async fn inspect(&self, target: &mut DownloadTarget) -> Result<MediaInfo> {
        target.transition(ItemState::Resolving);
        match self.fetch(&target.identifier).await {
            Ok(media) => {
                target.title = media.title.clone();
                Ok(media)
            }
            Err(e) => {
                target.fail(e.replicate());
                Err(e)
            }
        }
    }

    /// Picks the stream for `kind` from inspected metadata and attaches it.
    pub fn pick(
        &self,
        target: &mut DownloadTarget,
        media: &MediaInfo,
        kind: MediaKind,
    ) -> Result<Stream> {
        match choose_stream(media, kind) {
            Ok(stream) => {
                target.attach(stream.clone());
                Ok(stream)
            }
            Err(e) => {
                target.fail(e.replicate());
                Err(e)
            }
        }
    }

    /// Resolves `target` for `kind`, leaving it `Resolved` or `Failed`
    ///
    /// # Errors
    /// * `AppError::SourceUnavailable` if the content is refused
    /// * `AppError::Unknown` if no stream matches `kind`
    #[instrument(skip(self, target), fields(url = %target.identifier))]
    pub async fn resolve(&self, target: &mut DownloadTarget, kind: MediaKind) -> Result<Stream> {
        let media = self.inspect(target).await?;
        self.pick(target, &media, kind)
    }

    /// Downloads one resolved target into `destination`
    ///
    /// # Returns
    /// * `Result<PathBuf>` - The written file
    ///
    /// # Details
    /// The aggregator is started at the stream size and finished exactly once
    /// when the transfer ends, whatever the outcome.
    #[instrument(skip(self, target, observer), fields(url = %target.identifier))]
    pub async fn download_one(
        &self,
        target: &mut DownloadTarget,
        destination: &Path,
        observer: &dyn ProgressObserver,
    ) -> Result<PathBuf> {
        let stream = match &target.stream {
            Some(stream) => stream.clone(),
            None => return Err(AppError::Unknown(format!("{} was not resolved", target.title))),
        };

        self.progress.begin(stream.filesize);
        observer.started(&target.title, self.progress.snapshot());
        target.transition(ItemState::Transferring);

        let result = {
            let _finish = FinishGuard::new(&self.progress);
            self.transfer_tracked(0, &stream, destination, observer).await
        };
        observer.finished(self.progress.snapshot());

        match result {
            Ok(path) => {
                target.complete(path.clone());
                Ok(path)
            }
            Err(e) => {
                target.fail(e.replicate());
                Err(e)
            }
        }
    }

    /// Resolves every target, then downloads them one after another
    ///
    /// # Details
    /// * Sizes of all resolved targets form one aggregate progress view
    /// * A failing item is recorded and the batch moves on
    /// * Items run sequentially; the stored worker count is not consulted
    #[instrument(skip(self, targets, observer), fields(items = targets.len()))]
    pub async fn download_batch(
        &self,
        targets: Vec<DownloadTarget>,
        kind: MediaKind,
        destination: &Path,
        observer: &dyn ProgressObserver,
    ) -> BatchReport {
        let start = Instant::now();
        let mut items = targets;

        for target in items.iter_mut() {
            // failures are recorded on the target
            let _ = self.resolve(target, kind).await;
        }

        let total: u64 = items.iter().filter_map(DownloadTarget::expected_bytes).sum();
        self.progress.begin(total);
        observer.started(
            &format!("Total ({} items)", items.len()),
            self.progress.snapshot(),
        );

        {
            let _finish = FinishGuard::new(&self.progress);
            for (index, target) in items.iter_mut().enumerate() {
                if target.state() != ItemState::Resolved {
                    continue;
                }
                let stream = match &target.stream {
                    Some(stream) => stream.clone(),
                    None => continue,
                };

                target.transition(ItemState::Transferring);
                match self
                    .transfer_tracked(index, &stream, destination, observer)
                    .await
                {
                    Ok(path) => {
                        self.progress.complete_item(index, stream.filesize);
                        target.complete(path);
                    }
                    Err(e) => target.fail(e),
                }
                observer.updated(self.progress.snapshot());
            }
        }
        observer.finished(self.progress.snapshot());

        let report = BatchReport {
            elapsed: start.elapsed(),
            items,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            elapsed = ?report.elapsed,
            "batch finished"
        );
        report
    }

    /// Runs one transfer, feeding cumulative bytes of `item` to the aggregator.
    async fn transfer_tracked(
        &self,
        item: usize,
        stream: &Stream,
        destination: &Path,
        observer: &dyn ProgressObserver,
    ) -> Result<PathBuf> {
        let progress = &self.progress;
        let mut on_chunk = |stream: &Stream, _chunk: &[u8], bytes_remaining: u64| {
            let cumulative = stream.filesize.saturating_sub(bytes_remaining);
            if progress.observe(item, cumulative) > 0 {
                observer.updated(progress.snapshot());
            }
        };
        self.extractor
            .transfer(stream, destination, &mut on_chunk)
            .await
    }
}

/// Picks the stream for `kind` or explains why there is none.
pub fn choose_stream(media: &MediaInfo, kind: MediaKind) -> Result<Stream> {
    media
        .select_stream(kind)
        .cloned()
        .ok_or_else(|| AppError::Unknown(format!("no {} stream available for {}", kind, media.title)))
}
