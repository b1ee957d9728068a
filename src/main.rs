mod app;
mod config;
mod image_loader;
mod import;
mod models;
mod scanner;
mod thumbnails;
mod ui;

use std::path::PathBuf;

use app::ImageThumbApp;
use config::BrowserConfig;
use models::JournalStore;
use tracing::error;
use tracing_subscriber::EnvFilter;

const IMPORT_FLAG: &str = "--import";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("imgthumb=info")),
        )
        .init();

    let config = match BrowserConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = ?e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let mut args = std::env::args_os().skip(1);
    if args.next().is_some_and(|arg| arg == IMPORT_FLAG) {
        let paths: Vec<PathBuf> = args.map(PathBuf::from).collect();
        std::process::exit(run_import(&config, &paths));
    }

    let app = ImageThumbApp::new(config);
    std::process::exit(app.run());
}

fn run_import(config: &BrowserConfig, paths: &[PathBuf]) -> i32 {
    let store = match JournalStore::open(&config.journal_dir) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, journal = ?config.journal_dir, "Failed to open journal");
            return 1;
        }
    };

    let summary = import::import_files(&store, paths);
    println!(
        "imported {} file(s), skipped {}, failed {}",
        summary.imported.len(),
        summary.skipped,
        summary.failed
    );
    match store.count() {
        Ok(total) => println!("journal now holds {} object(s)", total),
        Err(e) => error!(error = %e, "Failed to count journal objects"),
    }
    if summary.failed > 0 {
        1
    } else {
        0
    }
}
