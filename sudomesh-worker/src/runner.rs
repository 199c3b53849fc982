//! Worker poll/solve/submit loop
//!
//! A worker is single-threaded within its solve loop: it pulls one sub-job,
//! runs the configured kernel against the context snapshot, posts the
//! result, and polls again. A background task heartbeats independently so
//! long solves do not get the worker declared dead.

use std::sync::Arc;

use sudomesh_core::solver::{make_solver, BlockRequest, BlockSolver};
use sudomesh_core::wire::{QueueResponse, ResultSubmission};
use sudomesh_core::{Board, CoreError};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::client::MasterClient;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// One worker process
pub struct Worker {
    config: WorkerConfig,
    client: Arc<MasterClient>,
    solver: Arc<dyn BlockSolver>,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> WorkerResult<Self> {
        let client = Arc::new(MasterClient::new(&config)?);
        let solver: Arc<dyn BlockSolver> = make_solver(config.solver).into();
        Ok(Self {
            config,
            client,
            solver,
        })
    }

    /// Run until the process is killed
    pub async fn run(self) -> WorkerResult<()> {
        info!(
            worker = %self.config.worker_id,
            solver = self.solver.name(),
            master = %self.config.master_url,
            "worker starting"
        );
        self.spawn_heartbeat();

        loop {
            match self.client.fetch_sub_job(&self.config.worker_id).await {
                Ok(Some(sub_job)) => {
                    if let Err(err) = self.process(sub_job).await {
                        error!(error = %err, "failed to deliver result");
                        sleep(self.config.poll_idle()).await;
                    }
                }
                Ok(None) => sleep(self.config.poll_idle()).await,
                Err(err) => {
                    warn!(error = %err, "queue poll failed");
                    sleep(self.config.poll_idle()).await;
                }
            }
        }
    }

    fn spawn_heartbeat(&self) {
        let client = Arc::clone(&self.client);
        let worker_id = self.config.worker_id.clone();
        let period = self.config.heartbeat_period();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(err) = client.heartbeat(&worker_id).await {
                    warn!(error = %err, "heartbeat failed");
                }
            }
        });
    }

    /// Solve one sub-job and post the result
    async fn process(&self, sub_job: QueueResponse) -> WorkerResult<()> {
        let submission = match Self::solve(Arc::clone(&self.solver), &sub_job).await {
            Ok(submission) => submission,
            Err(WorkerError::Solver(CoreError::Infeasible)) => {
                info!(sub_job = %sub_job.id, "partition infeasible");
                ResultSubmission::infeasible(sub_job.id.clone())
            }
            Err(err) => {
                // Malformed payload or a kernel contract failure; nothing
                // useful to report, the master's sweeps will recover it.
                warn!(sub_job = %sub_job.id, error = %err, "skipping sub-job");
                return Ok(());
            }
        };
        let ack = self.client.submit_result(&submission).await?;
        info!(sub_job = %ack.id, status = ?ack.status, "result delivered");
        Ok(())
    }

    /// Run the kernel off the async runtime; backtracking can take a while
    async fn solve(
        solver: Arc<dyn BlockSolver>,
        sub_job: &QueueResponse,
    ) -> WorkerResult<ResultSubmission> {
        let context = Board::from_rows(sub_job.context_board.clone())
            .map_err(|e| WorkerError::Payload(e.to_string()))?;
        let values = sub_job.board.clone();
        let partition_index = sub_job.partition_index;
        let id = sub_job.id.clone();
        let iteration = sub_job.iteration;

        let solution = tokio::task::spawn_blocking(move || {
            solver.solve(&BlockRequest {
                partition_values: &values,
                context_board: &context,
                partition_index,
            })
        })
        .await
        .map_err(|e| WorkerError::Payload(format!("solver task aborted: {}", e)))??;

        Ok(ResultSubmission::solved(
            id,
            solution.values,
            solution.sure_mask,
            partition_index,
            iteration,
        ))
    }
}
