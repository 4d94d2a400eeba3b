//! kgraph - knowledge graph memory over SQLite and libSQL
//!
//! Main entry point for the kgraph CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

mod commands;
mod ops;

use commands::{config, export, graph, import, serve, sync};
use kgraph_config::LoadedConfig;
use kgraph_store::GraphStore;

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// kgraph - knowledge graph memory over SQLite and libSQL
#[derive(Parser)]
#[command(name = "kgraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print single-line JSON
    #[arg(long, global = true)]
    pub compact: bool,

    /// Store URL: libsql://, https://, http://, file:<path> or :memory:
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Auth token for a remote store
    #[arg(long, global = true)]
    pub auth_token: Option<String>,

    /// Local replica file; enables replica mode
    #[arg(long, global = true)]
    pub replica: Option<PathBuf>,

    /// User config directory (default: platform config dir)
    #[arg(long, global = true, env = "KGRAPH_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(flatten)]
    Graph(graph::GraphCommand),

    /// Synchronize the local replica with the remote store
    Sync(sync::SyncArgs),

    /// Write the whole graph as JSON
    Export(export::ExportArgs),

    /// Load a graph written by export
    Import(import::ImportArgs),

    /// Answer newline-delimited JSON requests on stdin
    Serve(serve::ServeArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = cli.config_dir.clone().or_else(kgraph_config::xdg_config_dir);
    let loaded = kgraph_config::load_config_with_options(None, config_dir.as_deref())?;
    let _guard = init_tracing(cli.verbose, &loaded, config_dir.as_deref());

    for warning in &loaded.warnings {
        warn!("{}", warning);
    }

    // Create context for commands
    let ctx = commands::Context {
        store: GraphStore::default(),
        loaded,
        url: cli.url,
        auth_token: cli.auth_token,
        replica: cli.replica,
        config_dir,
        compact: cli.compact,
        verbose: cli.verbose,
    };

    let outcome = tokio::select! {
        result = dispatch(cli.command, &ctx) => result,
        () = shutdown_signal() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    // No-op when the command never connected.
    if let Err(e) = ctx.store.manager().teardown().await {
        warn!(error = %e, "teardown failed");
        if outcome.is_ok() {
            return Err(e.into());
        }
    }

    outcome
}

async fn dispatch(command: Commands, ctx: &commands::Context) -> Result<()> {
    match command {
        Commands::Graph(command) => graph::run(command, ctx).await,
        Commands::Sync(args) => sync::run(args, ctx).await,
        Commands::Export(args) => export::run(args, ctx).await,
        Commands::Import(args) => import::run(args, ctx).await,
        Commands::Serve(args) => serve::run(args, ctx).await,
        Commands::Config(args) => config::run(args, ctx).await,
    }
}

/// Console (stderr, human-readable) + rotating JSON file.
///
/// Stdout carries command output only.
fn init_tracing(
    verbose: bool,
    loaded: &LoadedConfig,
    config_dir: Option<&std::path::Path>,
) -> Option<WorkerGuard> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let console_filter = if verbose {
        EnvFilter::new("kgraph=debug,kgraph_store=debug,kgraph_config=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("kgraph=info,kgraph_store=info,warn"))
    };

    let logging = loaded.config.logging();
    let (file_layer, guard) = if logging.file {
        let log_dir = logging
            .dir
            .or_else(|| config_dir.map(|d| d.join("logs")))
            .unwrap_or_else(|| PathBuf::from("logs"));
        let file_appender = tracing_appender::rolling::daily(&log_dir, "kgraph.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(EnvFilter::new(
                "kgraph=trace,kgraph_store=trace,kgraph_config=trace,info",
            ));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();

    guard
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
