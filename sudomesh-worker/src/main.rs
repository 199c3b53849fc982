// sudomesh-worker: worker entry point

use anyhow::Context;
use clap::Parser;
use sudomesh_core::SolverKind;
use sudomesh_worker::{Worker, WorkerConfig};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "sudomesh-worker", about = "Distributed Sudoku solver worker")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Master endpoint, overriding config and MASTER_URL
    #[arg(long)]
    master_url: Option<String>,

    /// Solver kernel (rulebased | backtracking | annealing)
    #[arg(long)]
    solver: Option<SolverKind>,

    /// Worker identity; generated when absent
    #[arg(long)]
    worker_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => WorkerConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path))?,
        None => WorkerConfig::default(),
    };
    config.apply_env().context("applying environment overrides")?;
    if let Some(url) = cli.master_url {
        config.master_url = url;
    }
    if let Some(solver) = cli.solver {
        config.solver = solver;
    }
    if let Some(id) = cli.worker_id {
        config.worker_id = id;
    }

    info!("master: {}", config.master_url);
    info!("solver: {}", config.solver);

    let worker = Worker::new(config).context("building worker")?;
    worker.run().await.context("worker loop")?;
    Ok(())
}
