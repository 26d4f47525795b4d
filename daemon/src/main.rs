use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use daemon::DaemonState;
use daemon::compositor::Compositor;
use daemon::config::ConfigStore;
use daemon::{desktop, ipc_server, scheduler};

#[derive(Parser, Debug)]
#[command(name = "spanwall")]
#[command(about = "Per-monitor wallpaper slideshows stitched across the virtual desktop", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration document (defaults to the user config directory)
    #[arg(long, env = "SPANWALL_CONFIG")]
    config: Option<PathBuf>,

    /// Where the composited canvas is written
    #[arg(long)]
    canvas: Option<PathBuf>,

    /// IPC listen address
    #[arg(long, env = "SPANWALL_ADDR", default_value = common::DEFAULT_ADDRESS)]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    log::info!("Starting spanwall v{}", env!("CARGO_PKG_VERSION"));

    let config_path = match args.config {
        Some(path) => path,
        None => ConfigStore::default_config_path()?,
    };
    log::info!("Using config at: {}", config_path.display());

    let state = Arc::new(DaemonState::new(&config_path, desktop::system()));

    let doc = state.store.snapshot();
    log::info!("  App settings:");
    log::info!("    - Language: {}", doc.app_settings.language);
    log::info!(
        "    - Status lines: {}",
        if doc.app_settings.show_logs { "on" } else { "off" }
    );
    if doc.monitors.is_empty() {
        log::info!("  Monitors: none configured yet");
    } else {
        log::info!("  Configured monitors: {}", doc.monitors.len());
        for (name, cfg) in &doc.monitors {
            log::info!(
                "    - {}: {} image(s), every {}s, {}",
                name,
                cfg.images.len(),
                cfg.interval_seconds,
                if cfg.enabled { "enabled" } else { "disabled" }
            );
        }
    }

    state.detect_monitors();

    let compositor = Arc::new(Compositor::new(
        args.canvas.unwrap_or_else(Compositor::default_output_path),
    ));
    log::info!("Canvas path: {}", compositor.output_path().display());

    // Start IPC server
    let ipc_state = state.clone();
    let addr = args.addr;
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server::start(ipc_state, &addr).await {
            log::error!("IPC server error: {:#}", e);
        }
    });

    // Start the slideshow loop
    let scheduler_handle = tokio::spawn(scheduler::run(state.clone(), compositor));

    let signal_state = state.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Received Ctrl-C, shutting down...");
                signal_state.request_shutdown();
            }
            Err(e) => log::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = ipc_handle => {
            log::info!("IPC server stopped");
        }
        _ = scheduler_handle => {
            log::info!("Slideshow scheduler stopped");
        }
    }

    state.request_shutdown();
    log::info!("Daemon shutting down");
    Ok(())
}
