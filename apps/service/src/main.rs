use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use clap::Parser;
use panda::{HistoryStore, MemoryStore, Monitor, SqlStore};
use tracing::info;

mod config;
mod error;
mod routes;

use config::Config;

/// Seconds between two scheduler passes
const CHECK_PERIOD_SECS: u64 = 60;

#[derive(Debug, Parser)]
#[command(version, about = "Trash Panda device monitoring service")]
struct Cli {
    /// Config file, defaults to $XDG_CONFIG_HOME/trashpanda/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for the HTTP API, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print the loaded configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logger::init(cli.debug);

    let mut config = Config::from_config(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    if cli.print_config {
        println!("{config}");
        return Ok(());
    }

    let store = open_store(&config).await?;
    let monitor = Arc::new(
        Monitor::from_config(&config.monitor, store)
            .await
            .context("Failed to load devices")?,
    );

    let checks = monitor.clone().start_periodic_checks(Duration::from_secs(CHECK_PERIOD_SECS));
    let result = run_server(&config, monitor).await;
    checks.abort();

    result
}

async fn open_store(config: &Config) -> Result<Arc<dyn HistoryStore>> {
    if config.database.memory {
        info!("Keeping history in memory");
        return Ok(Arc::new(MemoryStore::new()));
    }

    info!(path = %config.database.path, "Opening history database");
    let store = SqlStore::open(&config.database.path)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path))?;
    Ok(Arc::new(store))
}

async fn run_server(config: &Config, monitor: Arc<Monitor>) -> Result<()> {
    let addr = (config.server.bind.as_str(), config.server.port);
    info!("Starting HTTP API on {}:{}", addr.0, addr.1);

    let data = web::Data::from(monitor);
    HttpServer::new(move || App::new().app_data(data.clone()).configure(routes::routes))
        .bind(addr)?
        .run()
        .await?;

    Ok(())
}
