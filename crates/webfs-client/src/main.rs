//! WebFS peer client binary.
//!
//! Serves an in-memory filesystem to a local WebFS server under the given
//! origin. Useful for trying the server without a browser.
//!
//! ```bash
//! webfs-client --origin https://demo.example --file hello.txt="hi there"
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use webfs_client::constants::{DEFAULT_BASE_PORT, DEFAULT_HOST, DEFAULT_ORIGIN, DEFAULT_PORT_SPREAD};
use webfs_client::{ClientConfig, ClientStatus, WebFsClient};
use webfs_kernel::MemoryFs;

#[derive(Parser, Debug)]
#[command(name = "webfs-client")]
#[command(about = "Serve an in-memory filesystem to a WebFS server")]
struct Cli {
    /// Origin to present; its host becomes the folder name on the drive
    #[arg(long, default_value = DEFAULT_ORIGIN)]
    origin: String,

    /// Server host
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// First port to probe
    #[arg(long, default_value_t = DEFAULT_BASE_PORT)]
    port: u16,

    /// Number of ports to probe
    #[arg(long, default_value_t = DEFAULT_PORT_SPREAD)]
    spread: u16,

    /// Seed a file, as PATH=CONTENTS (repeatable)
    #[arg(long = "file", value_name = "PATH=CONTENTS")]
    files: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn seed(fs: &MemoryFs, entry: &str) -> Result<()> {
    let (path, contents) = entry
        .split_once('=')
        .ok_or_else(|| anyhow!("expected PATH=CONTENTS, got {entry:?}"))?;
    fs.insert_file(path, contents)
        .with_context(|| format!("seeding {path}"))
}

async fn run(cli: Cli) -> Result<()> {
    let fs = Arc::new(MemoryFs::new());
    for entry in &cli.files {
        seed(&fs, entry)?;
    }

    let config = ClientConfig {
        host: cli.host,
        base_port: cli.port,
        port_spread: cli.spread,
        ..ClientConfig::new(cli.origin)
    };
    let client = WebFsClient::new(config, fs);
    let mut status = client.subscribe();
    client.enable();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                match &*status.borrow_and_update() {
                    ClientStatus::Connected { url } => tracing::info!(%url, "serving"),
                    ClientStatus::Connecting { url, attempt } => {
                        tracing::debug!(%url, attempt, "trying")
                    }
                    ClientStatus::Disconnected | ClientStatus::Disabled => {}
                }
            }
        }
    }
    tracing::info!("interrupt received, shutting down");
    client.disable().await;
    Ok(())
}
