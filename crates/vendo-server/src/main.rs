use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vendo_core::LedgerStore;

use vendo_server::api;

/// Coordinator server for a fleet of unattended dispensing units.
#[derive(Debug, Parser)]
#[command(name = "vendo-server", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "VENDO_BIND", default_value = "0.0.0.0:5000")]
    bind: SocketAddr,

    /// Path to the ledger database.
    #[arg(long, env = "VENDO_DB", default_value = "vendo.sqlite3")]
    db: PathBuf,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let store = LedgerStore::open(&args.db)
        .with_context(|| format!("opening ledger database at {}", args.db.display()))?;
    info!(db = %args.db.display(), "ledger store opened");

    let app = api::router(store);
    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    info!(addr = %args.bind, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
