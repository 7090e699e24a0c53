//! pgrelay entrypoint.

use std::process::exit;

use clap::Parser;
use tokio::runtime::Builder;
use tracing::{error, info};

use pgrelay::backend::databases;
use pgrelay::cli::{self, Cli, Commands};
use pgrelay::config;
use pgrelay::frontend::Listener;
use pgrelay::net::tls;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    pgrelay::logger(args.log_format);

    if let Some(Commands::Configcheck) = args.command {
        if let Err(err) = cli::config_check(&args.config) {
            error!("{}", err);
            exit(1);
        }
        exit(0);
    }

    info!("🐘 pgrelay v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load(&args.config)?;
    tls::load()?;

    let runtime = Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async move { pgrelay(config).await })?;

    info!("🐘 pgrelay is shut down");

    Ok(())
}

async fn pgrelay(config: std::sync::Arc<config::ConfigAndPath>) -> Result<(), Box<dyn std::error::Error>> {
    databases::init()?;

    let general = &config.config.general;
    let mut listener = Listener::new(format!("{}:{}", general.host, general.port));
    listener.listen().await?;

    Ok(())
}
