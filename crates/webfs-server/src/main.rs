//! WebFS server binary.
//!
//! ## Usage
//!
//! ```bash
//! webfs-server run [--port 6565] [--config webfs.toml] [--db webfs.db]
//! webfs-server peers
//! webfs-server allow shop.example
//! webfs-server block ads.example
//! webfs-server mount-point [W:]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use webfs_kernel::AsyncFsOps;
use webfs_server::constants::{DEFAULT_MOUNT_POINT, DEFAULT_PORT, MOUNT_POINT_KEY};
use webfs_server::{AppDb, Router, ServerConfig, SettingsStore, TrustStore, WebFsServer};
use webfs_types::{AsyncFileInfo, OpId, PeerIdentity, TrustState};

#[derive(Parser, Debug)]
#[command(name = "webfs-server")]
#[command(about = "Mount browser origins as one drive")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server (default)
    Run {
        /// Listening port
        #[arg(long)]
        port: Option<u16>,
    },
    /// List known peers and their trust
    Peers,
    /// Allow a peer to appear on the drive
    Allow { host: String },
    /// Block a peer
    Block { host: String },
    /// Show or set the drive mount point
    MountPoint { value: Option<String> },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli, port: Option<u16>) -> Result<ServerConfig> {
    let mut config = ServerConfig::production(DEFAULT_PORT);
    if let Some(path) = &cli.config {
        config = config
            .merge_file(path)
            .with_context(|| format!("reading config {}", path.display()))?;
    }
    if let Some(db) = &cli.db {
        config.db_path = Some(db.clone());
    }
    if let Some(port) = port {
        config.port = port;
    }
    Ok(config)
}

fn open_db(config: &ServerConfig) -> Result<AppDb> {
    config.open_db().context("opening database")
}

async fn dispatch(cli: Cli) -> Result<()> {
    match &cli.command {
        None => run_server(load_config(&cli, None)?).await,
        Some(Command::Run { port }) => run_server(load_config(&cli, *port)?).await,
        Some(Command::Peers) => cmd_peers(&open_db(&load_config(&cli, None)?)?),
        Some(Command::Allow { host }) => {
            cmd_set_trust(&open_db(&load_config(&cli, None)?)?, host, TrustState::Allowed)
        }
        Some(Command::Block { host }) => {
            cmd_set_trust(&open_db(&load_config(&cli, None)?)?, host, TrustState::Blocked)
        }
        Some(Command::MountPoint { value }) => {
            cmd_mount_point(&open_db(&load_config(&cli, None)?)?, value.as_deref())
        }
    }
}

async fn run_server(config: ServerConfig) -> Result<()> {
    let db = std::sync::Arc::new(open_db(&config)?);
    let mount_point: String = db.get(MOUNT_POINT_KEY, DEFAULT_MOUNT_POINT.to_string())?;

    let router = Router::new(db.clone());
    let server = WebFsServer::bind(&config, router.clone())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;
    let detached = AsyncFileInfo::new(OpId::DETACHED);
    router.mounted(&mount_point, &detached).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
        }
        signal.cancel();
    });

    server.run(shutdown).await?;
    for conn in router.registry().snapshot() {
        conn.close();
    }
    router.unmounted(&detached).await?;
    Ok(())
}

fn cmd_peers(db: &AppDb) -> Result<()> {
    let records = db.list()?;
    if records.is_empty() {
        println!("No peers have connected yet.");
        return Ok(());
    }
    println!("{:<32} {:<10} {:<12} URL", "HOST", "TRUST", "LAST SEEN");
    for r in records {
        let last_seen = r
            .last_seen
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        println!("{:<32} {:<10} {:<12} {}", r.host, r.trust, last_seen, r.url);
    }
    Ok(())
}

fn cmd_set_trust(db: &AppDb, host: &str, trust: TrustState) -> Result<()> {
    let record = db.set_trust(&PeerIdentity::new(host), trust)?;
    println!("{} is now {}", record.host, record.trust);
    Ok(())
}

fn cmd_mount_point(db: &AppDb, value: Option<&str>) -> Result<()> {
    match value {
        Some(value) => {
            db.set(MOUNT_POINT_KEY, value)?;
            println!("Mount point set to {value}");
        }
        None => {
            let current: String = db.get(MOUNT_POINT_KEY, DEFAULT_MOUNT_POINT.to_string())?;
            println!("{current}");
        }
    }
    Ok(())
}
