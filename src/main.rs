use airwave::api::build_router;
use airwave::config::Config;
use airwave::station::Station;
use airwave::track::load_catalog;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "airwave", about = "Autonomous radio broadcaster", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the station and the dashboard API (the default).
    Serve {
        /// Keep the station stopped until POST /control/start.
        #[arg(long)]
        no_autostart: bool,
    },
    /// Validate the track catalog and exit.
    CheckCatalog {
        /// Catalog file; defaults to CATALOG_PATH.
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::from_env();

    match cli.command.unwrap_or(Commands::Serve { no_autostart: false }) {
        Commands::CheckCatalog { path } => check_catalog(path.unwrap_or(cfg.catalog_path)),
        Commands::Serve { no_autostart } => serve(cfg, no_autostart).await,
    }
}

fn check_catalog(path: PathBuf) -> anyhow::Result<()> {
    let tracks = load_catalog(&path)
        .with_context(|| format!("catalog '{}' failed validation", path.display()))?;
    println!("{}: {} tracks ok", path.display(), tracks.len());
    Ok(())
}

async fn serve(cfg: Config, no_autostart: bool) -> anyhow::Result<()> {
    let port = cfg.port;
    // Setup probes external binaries; keep it off the async workers.
    let station = tokio::task::spawn_blocking(move || Station::new(cfg))
        .await?
        .context("station setup failed")?;
    let station = Arc::new(station);

    if no_autostart {
        info!("autostart disabled; waiting for POST /control/start");
    } else {
        let starter = Arc::clone(&station);
        let started = tokio::task::spawn_blocking(move || starter.start()).await?;
        if let Err(e) = started {
            // Keep serving so the operator can fix the problem and start
            // through the API.
            error!("station did not start: {}", e);
        }
    }

    let app = build_router(Arc::clone(&station));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    info!("dashboard API on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // No child processes may outlive the core.
    let stopper = Arc::clone(&station);
    tokio::task::spawn_blocking(move || stopper.stop()).await?;
    info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("sigterm handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }

    warn!("shutdown signal received");
}
