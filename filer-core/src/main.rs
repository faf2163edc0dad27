//! src/main.rs
//! Headless filer: watches one directory and prints every change a window
//! would redraw. Rescans when the directory's mtime moves.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use tokio::{signal, time};
use tracing::{info, warn};

use filer_core::{
    cache::DirectoryCache,
    config::Config,
    error::FilerError,
    fs::paths,
    logging::LoggerBuilder,
    registry::WindowRegistry,
    view::{ItemsChanged, ViewObserver},
};

const REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// Writes view notifications to stdout.
struct ConsoleObserver;

impl ViewObserver for ConsoleObserver {
    fn on_items_changed(&mut self, changes: &ItemsChanged) {
        for leaf in &changes.inserted {
            println!("+ {leaf}");
        }
        for leaf in &changes.removed {
            println!("- {leaf}");
        }
        for leaf in &changes.updated {
            println!("~ {leaf}");
        }
    }

    fn on_scan_state_changed(&mut self, scanning: bool) {
        if scanning {
            println!("[scanning]");
        } else {
            println!("[idle]");
        }
    }

    fn on_directory_error(&mut self, error: &FilerError) {
        eprintln!("! {error}");
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let config = Config::load().await.unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        Config::default()
    });

    let _guard = LoggerBuilder::new()
        .with_config(config.logging.clone())
        .build()
        .await
        .context("Failed to initialize logging")?;

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let target = match std::env::args_os().nth(1) {
        Some(arg) => paths::resolve(&cwd, &PathBuf::from(arg))?,
        None => paths::canonical_path(&cwd)?,
    };

    let mut cache = DirectoryCache::with_config(config.cache.clone());
    let mut registry = WindowRegistry::from_config(&config)
        .with_observer_factory(Box::new(|| Box::new(ConsoleObserver)));

    let view = registry
        .open_directory(&mut cache, &target, config.view_options())
        .with_context(|| format!("Failed to open {}", target.display()))?;

    info!(marker = "REGISTRY", path = %target.display(), "Filer started");

    let mut ticker = time::interval(REFRESH_INTERVAL);

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }

            completion = cache.recv_completion() => {
                if let Some(completion) = completion {
                    cache.apply_completion(completion);
                    registry.process_events();
                }
            }

            _ = ticker.tick() => {
                cache.purge_expired();

                let alive = view.lock().on_pointer_entered_view(&mut cache);
                registry.process_events();

                if !alive {
                    warn!(path = %target.display(), "Directory went away; exiting");
                    break;
                }
            }
        }
    }

    println!("{}", view.lock().title());
    registry.close_view(&mut cache, &view);

    let stats = cache.stats();
    info!(
        marker = "CACHE_OPERATION",
        hits = stats.hits,
        misses = stats.misses,
        scans = stats.scans,
        hit_rate = stats.hit_rate(),
        "Filer exited cleanly"
    );

    Ok(())
}
