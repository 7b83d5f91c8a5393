//! ghostwatch daemon binary
//!
//! Watches project directories and streams file-change events to WebSocket
//! clients, feeding the same changes to the context aggregator.
//!
//! # Usage
//!
//! ```bash
//! ghostwatch-daemon --port 7777
//! ghostwatch-daemon --watch ~/code/app --watch ~/code/lib
//! ghostwatch-daemon --config ./ghostwatch.toml
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ghostwatch::config::DaemonConfig;
use ghostwatch::context::RecentChangesAggregator;
use ghostwatch::error::DaemonError;
use ghostwatch::socket_server::{serve, Daemon};

/// ghostwatch file-change daemon
#[derive(Parser, Debug)]
#[command(name = "ghostwatch-daemon")]
#[command(about = "Project file-change daemon for AI context clients")]
#[command(version)]
struct Args {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, env = "GHOSTWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "GHOSTWATCH_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "GHOSTWATCH_PORT")]
    port: Option<u16>,

    /// Project to watch at startup (repeatable)
    #[arg(short, long = "watch", value_name = "DIR")]
    watch: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("ghostwatch-daemon: {}", e);
            e.exit_code()
        }
    }
}

async fn run(args: Args) -> Result<(), DaemonError> {
    let mut config = DaemonConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.projects.extend(args.watch);

    init_logging(&config.log_filter);

    let aggregator = Arc::new(RecentChangesAggregator::new(config.recent_events));
    let projects = config.projects.clone();
    let daemon = Daemon::start(config, aggregator);

    let listener = daemon.bind().await?;

    let started = daemon.auto_watch(&projects).await;
    if !projects.is_empty() {
        tracing::info!("Watching {} of {} configured projects", started, projects.len());
    }

    let served = serve(daemon.state(), listener, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await;

    daemon.shutdown().await?;
    served
}

/// RUST_LOG wins; otherwise use the configured filter
fn init_logging(fallback: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("ghostwatch=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
