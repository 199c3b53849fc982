// sudomesh-worker: worker process for the distributed Sudoku solver
// Pulls sub-jobs from the master, runs a block solver, posts results,
// and heartbeats in the background.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod client;
pub mod config;
pub mod error;
pub mod runner;

pub use client::MasterClient;
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use runner::Worker;
