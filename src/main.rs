use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use mds::app::App;
use mds::cli::{Cli, Command};
use mds::config::Settings;
use mds::repository::indexer::{NoopProgress, ProgressReporter, ThresholdProgress};
use mds::server;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    std::env::set_current_dir(&cli.workdir)
        .with_context(|| format!("Could not enter {}", cli.workdir.display()))?;

    let index_path = match cli.index {
        Some(path) => path,
        None => default_index_path()?,
    };
    let settings = Settings::new(cli.mappings, cli.packages_root, index_path);

    match cli.command {
        Command::Refresh => {
            let progress: Arc<dyn ProgressReporter> = Arc::new(ThresholdProgress::new(50));
            let app = App::open(settings, progress).await?;
            let summary = app.refresh().await?;
            eprintln!(
                "Indexed {} new revisions and {} events across {} repositories",
                summary.revisions, summary.events, summary.repositories
            );
        }
        Command::Serve { port, poll_interval } => {
            let settings = settings.with_poll_interval(Duration::from_secs(poll_interval.max(1)));
            let app = Arc::new(App::open(settings, Arc::new(NoopProgress)).await?);
            serve(app, port).await?;
        }
    }

    Ok(())
}

fn default_index_path() -> Result<PathBuf> {
    Ok(dirs::cache_dir()
        .context("Could not determine cache directory")?
        .join("mds")
        .join("index.db"))
}

async fn serve(app: Arc<App>, port: u16) -> Result<()> {
    app.refresh().await?;
    app.warm().await?;

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Could not listen on port {}", port))?;
    let shutdown = app.shutdown_token();
    let api = Arc::new(app.api());
    let server = tokio::spawn(server::serve(listener, api, shutdown.clone()));
    info!(pid = std::process::id(), port, "server running");

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            _ = hangup.recv() => {
                info!("got SIGHUP, refreshing");
                let app = Arc::clone(&app);
                tokio::spawn(async move {
                    if let Err(e) = app.refresh().await {
                        error!(error = %e, "refresh failed");
                    }
                });
            }
            _ = terminate.recv() => {
                info!("got SIGTERM, shutting down");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    shutdown.cancel();
    server.await.context("Server task failed")??;
    info!("shutdown complete");
    Ok(())
}
