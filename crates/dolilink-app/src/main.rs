//! Dolilink - same-tab link patching for hosted web apps.
//!
//! This is the main binary that runs the full Dolilink service:
//! - the link-patching engine over a mirrored page document
//! - the admin HTTP API (rule editing, status, dry-run testing)
//! - a change watcher that rescans after page mutations settle
//! - an optional page snapshot feed for host-less runs

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;
use directories::ProjectDirs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dolilink_core::engine::{EngineConfig, LinkEngine};
use dolilink_core::page::PageDocument;
use dolilink_core::remote::SettingsClient;
use dolilink_core::watcher::ChangeWatcher;
use dolilink_server::{AppState, Server, ServerConfig, SettingsStore};

mod page_source;

use page_source::PageSource;

/// Delay before the initial scan, giving the first page feed a moment to
/// land.
const STARTUP_SCAN_DELAY: Duration = Duration::from_millis(100);

/// Dolilink - force matching links to open in the same tab
#[derive(Parser, Debug)]
#[command(name = "dolilink", version, about)]
struct Args {
    /// Port for the admin API server
    #[arg(long, default_value_t = dolilink_server::DEFAULT_PORT)]
    port: u16,

    /// Settings file path (defaults to the per-user config directory)
    #[arg(long)]
    settings_file: Option<PathBuf>,

    /// Page snapshot file to poll for links
    #[arg(long)]
    page_file: Option<PathBuf>,

    /// Poll interval for the page snapshot, in milliseconds
    #[arg(long, default_value_t = 500)]
    page_poll_ms: u64,

    /// Fetch the initial rule set from a remote settings endpoint
    #[arg(long)]
    rules_url: Option<String>,

    /// Settling delay between a page mutation and the rescan, in milliseconds
    #[arg(long, default_value_t = 200)]
    settle_ms: u64,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "dolilink", "Dolilink")
}

/// Get the default settings file path.
fn default_settings_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("settings.json"))
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dolilink={},warn", log_level)));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("dolilink")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stdout))
                    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                    .init();

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only.
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (keep guard alive for the duration of the program)
    let _log_guard = init_logging(&args);

    tracing::info!("Starting Dolilink...");
    tracing::info!("Args: {:?}", args);

    // Settings store (file-backed when a path is available).
    let settings_path = args.settings_file.clone().or_else(default_settings_path);
    let settings = match settings_path {
        Some(ref path) => {
            tracing::info!("Settings file: {:?}", path);
            SettingsStore::load_or_default(path)
        }
        None => SettingsStore::in_memory(),
    };

    // Engine over a fresh document; the state wiring applies the stored
    // rule set.
    let doc = Arc::new(RwLock::new(PageDocument::new()));
    let engine = LinkEngine::with_config(
        doc.clone(),
        EngineConfig::default().with_settle_delay(Duration::from_millis(args.settle_ms)),
    );
    let state = AppState::new(engine.clone(), settings);

    // An explicit remote rule source overrides the local settings; on any
    // failure the engine keeps scanning with what it has.
    if let Some(ref url) = args.rules_url {
        let rules = SettingsClient::new(url.clone()).fetch_or_default().await;
        engine.set_rule_set(rules);
    }

    // Watch for page mutations, and feed the page if a snapshot is given.
    let watcher = ChangeWatcher::spawn(engine.clone());
    let page_source = args.page_file.clone().map(|path| {
        tracing::info!("Polling page snapshot: {:?}", path);
        PageSource::spawn(doc.clone(), path, Duration::from_millis(args.page_poll_ms))
    });

    // Initial scan, regardless of where the rules came from.
    tokio::time::sleep(STARTUP_SCAN_DELAY).await;
    let outcome = engine.scan();
    tracing::info!("Initial scan patched {} links", outcome.newly_patched);

    // Run the admin API in the foreground.
    let config = ServerConfig {
        host: dolilink_server::DEFAULT_HOST.to_string(),
        port: args.port,
        settings_path: None,
    };
    let server = Server::with_state(config, state).map_err(|e| anyhow!("server setup: {}", e))?;
    let result = server.run().await;

    if let Some(source) = page_source {
        source.shutdown();
    }
    watcher.shutdown();

    tracing::info!("Dolilink shutting down");
    result.map_err(|e| anyhow!("server error: {}", e))
}
