use crate::progress::ProgressSnapshot;
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;

const BAR_TEMPLATE: &str =
    "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} [{elapsed_precise}<{eta_precise}, {bytes_per_sec}]";

/// Receives progress snapshots from the orchestrator.
///
/// All methods default to doing nothing so tests can observe only what they
/// care about.
pub trait ProgressObserver {
    fn started(&self, _label: &str, _snapshot: ProgressSnapshot) {}
    fn updated(&self, _snapshot: ProgressSnapshot) {}
    fn finished(&self, _snapshot: ProgressSnapshot) {}
}

/// Observer that ignores everything.
pub struct Silent;

impl ProgressObserver for Silent {}

/// Terminal progress bar backed by `indicatif`.
///
/// A new bar is created for each operation and cleared of state when it
/// finishes.
#[derive(Default)]
pub struct ConsoleBar {
    bar: RefCell<Option<ProgressBar>>,
}

impl ConsoleBar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressObserver for ConsoleBar {
    fn started(&self, label: &str, snapshot: ProgressSnapshot) {
        let bar = ProgressBar::new(snapshot.bytes_total);
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .map(|style| style.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message(label.to_string());
        bar.set_position(snapshot.bytes_done);
        if let Some(previous) = self.bar.borrow_mut().replace(bar) {
            previous.abandon();
        }
    }

    fn updated(&self, snapshot: ProgressSnapshot) {
        if let Some(bar) = self.bar.borrow().as_ref() {
            bar.set_position(snapshot.bytes_done);
        }
    }

    fn finished(&self, snapshot: ProgressSnapshot) {
        if let Some(bar) = self.bar.borrow_mut().take() {
            bar.set_length(snapshot.bytes_total);
            bar.set_position(snapshot.bytes_done);
            bar.finish();
        }
    }
}
