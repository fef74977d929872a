use std::io;
use tracing::{error, info, Level};
use ytmenu::display::ConsoleBar;
use ytmenu::error::Result;
use ytmenu::{AppPaths, ConfigStore, Console, Downloader, Menu, YtDlpExtractor};

/// Set to any value to get debug logs on stderr.
const DEBUG_ENV: &str = "YTMENU_DEBUG";

/// Main entry point for the application.
///
/// # Steps
/// 1. Loads `.env` and initializes logging
/// 2. Resolves the project root and opens the settings
/// 3. Installs or updates the extractor binaries
/// 4. Runs the interactive menu until the user exits
///
/// Startup failures print a diagnostic and exit with status 1. Ctrl-C keeps
/// the default behavior and terminates the process.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging();
    info!("Starting application...");

    let paths = AppPaths::from_env();

    if let Err(e) = run_application(paths).await {
        error!("Application error: {}", e);
        eprintln!("\n❌ An unexpected error occurred: {}", e);
        std::process::exit(1);
    }

    info!("Application completed successfully");
    Ok(())
}

fn init_logging() {
    let level = if std::env::var_os(DEBUG_ENV).is_some() {
        Level::DEBUG
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Builds every component once and hands them to the menu.
///
/// # Errors
/// Returns error if:
/// - A storage folder cannot be created
/// - The extractor binaries cannot be installed
/// - The console cannot be written
async fn run_application(paths: AppPaths) -> Result<()> {
    let store = ConfigStore::open(&paths)?;
    println!("Preparing yt-dlp, this may take a moment on first start...");
    let extractor = YtDlpExtractor::new(&paths).await?;
    let downloader = Downloader::new(extractor);

    let stdin = io::stdin();
    let console = Console::new(stdin.lock(), io::stdout()).clearing();
    let mut menu = Menu::new(console, store, downloader, paths, Box::new(ConsoleBar::new()));
    menu.run().await
}
