// sudomesh-master: coordinator entry point

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sudomesh_core::Strategy;
use sudomesh_master::{api, LogSink, MasterConfig, MasterEngine};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "sudomesh-master", about = "Distributed Sudoku solver coordinator")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Bind address, overriding config and BIND_ADDR
    #[arg(long)]
    bind: Option<String>,

    /// Partitioning strategy (column | block)
    #[arg(long)]
    strategy: Option<Strategy>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => MasterConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path))?,
        None => MasterConfig::default(),
    };
    config.apply_env().context("applying environment overrides")?;
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if let Some(strategy) = cli.strategy {
        config.solve.strategy = strategy;
    }

    info!("starting sudomesh master");
    info!("bind address: {}", config.server.bind_address);
    info!("strategy: {}", config.solve.strategy);
    info!(
        "sweeps: dead after {:?}, sweep every {:?}, tick every {:?}",
        config.dead_after(),
        config.sweep_interval(),
        config.tick_interval()
    );

    let bind_address = config.server.bind_address.clone();
    let engine = MasterEngine::new(config, Arc::new(LogSink));
    let _background = engine.spawn_background();

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {}", bind_address))?;
    axum::serve(listener, api::router(engine))
        .await
        .context("serving HTTP")?;
    Ok(())
}
