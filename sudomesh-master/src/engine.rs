//! Master coordination engine
//!
//! Owns the registry, dispatcher, metrics, and the result cache. HTTP
//! handlers are thin wrappers around the methods here; every state
//! transition happens under the owning job's mutex, and no lock is held
//! across an await point.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use sudomesh_core::partition::{
    open_partition_indices, partition_board, sub_jobs_for, SubJobId,
};
use sudomesh_core::wire::{
    AckStatus, GridResponse, JobResultResponse, JobStatus, QueueResponse, ResultAck,
    ResultSubmission, SolveResponse,
};
use sudomesh_core::{propagate, Board, JobId, PartitionIndex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregator::{
    clear_partitions, conflicting_partitions, rebuild_blueprint, tentative_board, RebuildOutcome,
};
use crate::config::MasterConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{MasterError, MasterResult};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::registry::{CompletedSubJob, Job, JobRegistry, JobState};
use crate::sink::SolutionSink;

/// Terminal outcome kept for client polling after the job record is
/// released; swept once older than the result TTL
#[derive(Debug, Clone)]
pub struct CachedOutcome {
    pub status: JobStatus,
    pub board: Option<Board>,
    pub cached_at: Instant,
}

/// Health report for the `/health` endpoint
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub active_jobs: usize,
    pub queued_sub_jobs: usize,
    pub workers: usize,
    pub metrics: MetricsSnapshot,
}

/// The coordination engine shared by all handlers and sweeps
pub struct MasterEngine {
    config: MasterConfig,
    registry: JobRegistry,
    dispatcher: Dispatcher,
    metrics: MetricsCollector,
    sink: Arc<dyn SolutionSink>,
    outcomes: DashMap<JobId, CachedOutcome>,
    jobs_accepted_total: AtomicU64,
    started_at: Instant,
}

impl MasterEngine {
    pub fn new(config: MasterConfig, sink: Arc<dyn SolutionSink>) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: JobRegistry::new(),
            dispatcher: Dispatcher::new(),
            metrics: MetricsCollector::new(),
            sink,
            outcomes: DashMap::new(),
            jobs_accepted_total: AtomicU64::new(0),
            started_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// Spawn the combine/stall tick, the dead-worker sweep, and the result
    /// cache sweep
    pub fn spawn_background(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let engine = Arc::clone(self);
        let mut tick = tokio::time::interval(self.config.tick_interval());
        handles.push(tokio::spawn(async move {
            loop {
                tick.tick().await;
                engine.tick();
            }
        }));

        let engine = Arc::clone(self);
        let mut sweep = tokio::time::interval(self.config.sweep_interval());
        handles.push(tokio::spawn(async move {
            loop {
                sweep.tick().await;
                engine.sweep_workers();
            }
        }));

        let engine = Arc::clone(self);
        let mut cache_sweep = tokio::time::interval(self.config.result_sweep_interval());
        handles.push(tokio::spawn(async move {
            loop {
                cache_sweep.tick().await;
                engine.sweep_outcomes();
            }
        }));

        handles
    }

    // ---- intake -----------------------------------------------------------

    /// Accept a puzzle, or reject it with a 400-mapped error.
    ///
    /// Puzzles solved by propagation alone complete inline without ever
    /// touching the queue.
    pub fn intake(&self, rows: Vec<Vec<u8>>) -> MasterResult<SolveResponse> {
        let mut board = Board::from_rows(rows).map_err(|e| {
            self.metrics.job_rejected();
            MasterError::from(e)
        })?;
        if !board.is_well_formed() {
            self.metrics.job_rejected();
            return Err(MasterError::InvalidBoard(
                "clue set violates Sudoku rules".to_string(),
            ));
        }
        if board.filled_cells() == 0 {
            // Nothing constrains an all-zero board, so workers could never
            // report a sure cell. Pre-solve the first block to seed.
            Self::seed_first_block(&mut board);
        }

        let initial = board.clone();
        let mut current = board;
        propagate(&mut current).map_err(|_| {
            self.metrics.job_rejected();
            MasterError::UnsolvableClues
        })?;

        let job_id = JobId::new();
        self.jobs_accepted_total.fetch_add(1, Ordering::Relaxed);
        self.metrics.job_accepted();

        if current.is_solved() {
            info!(job = %job_id, "solved at intake by propagation");
            self.sink.save(job_id, &current);
            self.metrics.job_completed();
            self.outcomes.insert(
                job_id,
                CachedOutcome {
                    status: JobStatus::Completed,
                    board: Some(current.clone()),
                    cached_at: Instant::now(),
                },
            );
            return Ok(SolveResponse {
                job_id: job_id.to_string(),
                status: JobStatus::Completed,
                partial_board: None,
                solved_board: Some(current.into_rows()),
            });
        }

        let mut job = Job::new(job_id, self.config.solve.strategy, initial, current);
        let sub_jobs = partition_board(&job.current_blueprint, job.strategy, job_id, 1, false);
        job.expected_sub_jobs = sub_jobs.len();
        let partial = job.current_blueprint.rows().to_vec();
        info!(
            job = %job_id,
            side = job.current_blueprint.side(),
            strategy = %job.strategy,
            sub_jobs = sub_jobs.len(),
            "job accepted"
        );
        self.registry.insert(job);
        self.metrics.sub_jobs_enqueued(sub_jobs.len());
        self.dispatcher.enqueue_all(sub_jobs);

        Ok(SolveResponse {
            job_id: job_id.to_string(),
            status: JobStatus::Processing,
            partial_board: Some(partial),
            solved_board: None,
        })
    }

    /// Fill the top-left block of an all-zero board with 1..=N
    fn seed_first_block(board: &mut Board) {
        let dims = board.block_dims();
        let mut value = 1u8;
        for row in 0..dims.rows {
            for col in 0..dims.cols {
                board.set(row, col, value);
                value += 1;
            }
        }
    }

    // ---- worker protocol --------------------------------------------------

    /// Hand the queue head to a worker; the pull doubles as a heartbeat
    pub fn pull_sub_job(&self, worker_id: &str) -> Option<QueueResponse> {
        let sub_job = self.dispatcher.pull(worker_id)?;
        self.metrics.sub_job_dispatched();
        Some(QueueResponse {
            id: sub_job.id.to_string(),
            board: sub_job.partition_values,
            partition_index: sub_job.partition_index,
            iteration: sub_job.iteration,
            context_board: sub_job.context_blueprint.into_rows(),
            is_requeue: sub_job.is_requeue,
        })
    }

    pub fn heartbeat(&self, worker_id: &str) {
        self.dispatcher.heartbeat(worker_id);
    }

    /// Ingest one worker result.
    ///
    /// The iteration check runs before any state mutation; stale results,
    /// duplicates, and results for released jobs are acknowledged as
    /// `queued` and dropped.
    pub fn submit_result(&self, submission: ResultSubmission) -> MasterResult<ResultAck> {
        let id = SubJobId::parse_str(&submission.id)
            .map_err(|e| MasterError::Parse(e.to_string()))?;
        let assignment = self.dispatcher.complete(id);

        let Some(entry) = self.registry.get(id.job) else {
            // Job already terminal or unknown; late results are normal.
            return Ok(ResultAck {
                id: submission.id,
                status: AckStatus::Queued,
            });
        };
        let mut job = entry.lock();
        if job.state.is_terminal() {
            return Ok(ResultAck {
                id: submission.id,
                status: AckStatus::Queued,
            });
        }

        if submission.unsolvable {
            self.metrics.result_unsolvable();
            return Ok(self.handle_unsolvable(&mut job, submission.id, assignment));
        }

        let values = submission
            .values
            .ok_or(MasterError::MissingField("values"))?;
        let sure_mask = submission
            .sure_mask
            .ok_or(MasterError::MissingField("sureMask"))?;
        let partition_index = submission
            .partition_index
            .ok_or(MasterError::MissingField("partitionIndex"))?;
        let iteration = submission
            .iteration
            .ok_or(MasterError::MissingField("iteration"))?;

        if iteration != job.iteration {
            debug!(
                sub_job = %id,
                got = iteration,
                expected = job.iteration,
                "dropping stale result"
            );
            self.metrics.result_stale();
            return Ok(ResultAck {
                id: submission.id,
                status: AckStatus::Queued,
            });
        }
        if job.has_completion_for(partition_index) {
            self.metrics.result_duplicate();
            return Ok(ResultAck {
                id: submission.id,
                status: AckStatus::Queued,
            });
        }

        let side = job.current_blueprint.side();
        let cells = partition_index.cells(side, job.current_blueprint.block_dims());
        if values.len() != cells.len() || sure_mask.len() != cells.len() {
            return Err(MasterError::Parse(format!(
                "partition {} expects {} values, got {}",
                partition_index,
                cells.len(),
                values.len()
            )));
        }
        let invalid = cells.iter().enumerate().any(|(i, &(row, col))| {
            values[i] as usize > side
                || (job.is_clue(row, col) && values[i] != job.initial_blueprint.get(row, col))
        });
        if invalid {
            // Clue mismatch or out-of-range value; discard and retry the
            // partition in a fresh round.
            warn!(sub_job = %id, partition = %partition_index, "discarding invalid partition result");
            self.requeue_selective(&mut job, vec![partition_index]);
            return Ok(ResultAck {
                id: submission.id,
                status: AckStatus::Queued,
            });
        }

        job.completed.push(CompletedSubJob {
            sub_job_id: id,
            partition_index,
            values,
            sure_mask,
            iteration,
        });
        self.metrics.result_accepted();

        match rebuild_blueprint(&mut job) {
            RebuildOutcome::Clean { filled } => {
                if filled > job.max_filled_seen {
                    job.max_filled_seen = filled;
                    job.last_progress_at = Instant::now();
                }
                self.check_completion(&mut job);
            }
            RebuildOutcome::Conflicted(overlay) => {
                let conflicts =
                    conflicting_partitions(&overlay, job.strategy, overlay.block_dims());
                if conflicts.is_empty() {
                    self.requeue_full(&mut job);
                } else {
                    self.requeue_selective(&mut job, conflicts);
                }
            }
            RebuildOutcome::Infeasible => self.requeue_full(&mut job),
        }

        Ok(ResultAck {
            id: submission.id,
            status: AckStatus::Received,
        })
    }

    fn handle_unsolvable(
        &self,
        job: &mut Job,
        wire_id: String,
        assignment: Option<crate::dispatcher::Assignment>,
    ) -> ResultAck {
        let queued = ResultAck {
            id: wire_id,
            status: AckStatus::Queued,
        };
        let Some(assignment) = assignment else {
            return queued;
        };
        if assignment.sub_job.iteration != job.iteration {
            self.metrics.result_stale();
            return queued;
        }
        if job.completed.is_empty() {
            // The context was the propagated clues alone; infeasibility here
            // means the puzzle itself has no completion.
            info!(job = %job.id, "worker reported pure-clue context infeasible");
            self.finish_unsolvable(job);
            return queued;
        }
        // Some sure cell misled the solver; retry the partition in a fresh
        // round against a refreshed blueprint.
        self.requeue_selective(job, vec![assignment.sub_job.partition_index]);
        queued
    }

    // ---- completion, conflicts, requeue -----------------------------------

    /// Terminal/combine check; runs after every accepted result and on the
    /// periodic tick
    fn check_completion(&self, job: &mut Job) {
        if job.state.is_terminal() {
            return;
        }
        if job.current_blueprint.is_solved() {
            let board = job.current_blueprint.clone();
            self.finish_solved(job, board);
            return;
        }
        if !job.iteration_returned() {
            return;
        }
        let tentative = tentative_board(job);
        if tentative.is_solved() {
            self.finish_solved(job, tentative);
            return;
        }
        let conflicts = conflicting_partitions(&tentative, job.strategy, tentative.block_dims());
        if conflicts.is_empty() {
            self.requeue_full(job);
        } else {
            self.requeue_selective(job, conflicts);
        }
    }

    /// Advance the iteration counter, tracking unproductive rounds
    fn bump_iteration(&self, job: &mut Job) {
        if job.max_filled_seen > job.filled_at_last_bump {
            job.unproductive_iterations = 0;
        } else {
            job.unproductive_iterations += 1;
        }
        job.filled_at_last_bump = job.max_filled_seen;
        job.iteration += 1;
        if job.unproductive_iterations >= self.config.solve.max_unproductive_iterations {
            warn!(
                job = %job.id,
                rounds = job.unproductive_iterations,
                "no sure-cell progress, abandoning job"
            );
            self.finish_abandoned(job);
        }
    }

    /// Requeue only the given partitions in a fresh iteration.
    ///
    /// Completions outside the set survive into the new iteration; the
    /// conflicted partitions lose their non-clue cells and are re-cut from
    /// the refreshed blueprint, together with any partition of the old
    /// round that never returned.
    fn requeue_selective(&self, job: &mut Job, conflicts: Vec<PartitionIndex>) {
        self.bump_iteration(job);
        if job.state.is_terminal() {
            return;
        }
        self.metrics.selective_requeue();

        job.completed
            .retain(|c| !conflicts.contains(&c.partition_index));
        for completion in &mut job.completed {
            completion.iteration = job.iteration;
        }
        clear_partitions(job, &conflicts);
        if !matches!(rebuild_blueprint(job), RebuildOutcome::Clean { .. }) {
            // Survivors still clash among themselves; start the round over.
            job.iteration -= 1;
            self.requeue_full(job);
            return;
        }

        let open = open_partition_indices(&job.current_blueprint, job.strategy);
        let to_queue: Vec<PartitionIndex> = open
            .into_iter()
            .filter(|p| !job.has_completion_for(*p))
            .collect();
        let sub_jobs = sub_jobs_for(
            &job.current_blueprint,
            &to_queue,
            job.id,
            job.iteration,
            true,
        );
        job.expected_sub_jobs = job.completed.len() + sub_jobs.len();
        info!(
            job = %job.id,
            iteration = job.iteration,
            requeued = sub_jobs.len(),
            kept = job.completed.len(),
            "selective requeue"
        );
        self.dispatcher.purge_stale(job.id, job.iteration);
        self.metrics.sub_jobs_enqueued(sub_jobs.len());
        self.dispatcher.enqueue_all(sub_jobs);
        self.check_completion(job);
    }

    /// Discard all completions and restart the round from the clues
    fn requeue_full(&self, job: &mut Job) {
        self.bump_iteration(job);
        if job.state.is_terminal() {
            return;
        }
        self.metrics.full_requeue();

        job.completed.clear();
        let mut board = job.initial_blueprint.clone();
        if propagate(&mut board).is_err() {
            self.finish_unsolvable(job);
            return;
        }
        job.current_blueprint = board;
        let sub_jobs = partition_board(
            &job.current_blueprint,
            job.strategy,
            job.id,
            job.iteration,
            true,
        );
        job.expected_sub_jobs = sub_jobs.len();
        info!(
            job = %job.id,
            iteration = job.iteration,
            sub_jobs = sub_jobs.len(),
            "full requeue"
        );
        self.dispatcher.purge_stale(job.id, job.iteration);
        self.metrics.sub_jobs_enqueued(sub_jobs.len());
        self.dispatcher.enqueue_all(sub_jobs);
    }

    fn finish_solved(&self, job: &mut Job, board: Board) {
        job.state = JobState::Solved;
        job.current_blueprint = board.clone();
        info!(job = %job.id, iteration = job.iteration, "job completed");
        self.sink.save(job.id, &board);
        self.metrics.job_completed();
        self.outcomes.insert(
            job.id,
            CachedOutcome {
                status: JobStatus::Completed,
                board: Some(board),
                cached_at: Instant::now(),
            },
        );
        self.release(job.id);
    }

    fn finish_unsolvable(&self, job: &mut Job) {
        job.state = JobState::Unsolvable;
        self.metrics.job_unsolvable();
        self.outcomes.insert(
            job.id,
            CachedOutcome {
                status: JobStatus::Unsolvable,
                board: None,
                cached_at: Instant::now(),
            },
        );
        self.release(job.id);
    }

    fn finish_abandoned(&self, job: &mut Job) {
        job.state = JobState::Abandoned;
        self.metrics.job_abandoned();
        self.outcomes.insert(
            job.id,
            CachedOutcome {
                status: JobStatus::Unsolvable,
                board: None,
                cached_at: Instant::now(),
            },
        );
        self.release(job.id);
    }

    fn release(&self, id: JobId) {
        self.registry.remove(id);
        self.dispatcher.purge_job(id);
    }

    // ---- sweeps -----------------------------------------------------------

    /// Combine/stall pass over every active job, 1 Hz by default
    pub fn tick(&self) {
        for entry in self.registry.all() {
            let mut job = entry.lock();
            if job.state.is_terminal() {
                continue;
            }
            self.check_completion(&mut job);
            if job.state.is_terminal() {
                continue;
            }
            let stall_after = self.config.stall_timeout(job.current_blueprint.side());
            if job.last_progress_at.elapsed() > stall_after
                && !job.iteration_returned()
                && self.dispatcher.queued_for(job.id) == 0
            {
                warn!(job = %job.id, iteration = job.iteration, "stall detected");
                self.metrics.stall_detected();
                job.last_progress_at = Instant::now();
                self.requeue_full(&mut job);
            }
        }
    }

    pub fn sweep_workers(&self) {
        let swept = self.dispatcher.sweep_dead_workers(self.config.dead_after());
        if swept > 0 {
            self.metrics.dead_workers_swept(swept);
        }
    }

    pub fn sweep_outcomes(&self) {
        let ttl = self.config.result_ttl();
        self.outcomes
            .retain(|_, outcome| outcome.cached_at.elapsed() < ttl);
    }

    // ---- client queries ---------------------------------------------------

    pub fn grid(&self, job_id: &str) -> MasterResult<GridResponse> {
        let id = JobId::parse_str(job_id)
            .map_err(|_| MasterError::JobNotFound(job_id.to_string()))?;
        if let Some(entry) = self.registry.get(id) {
            let job = entry.lock();
            return Ok(GridResponse {
                job_id: job_id.to_string(),
                partial_board: job.current_blueprint.rows().to_vec(),
            });
        }
        if let Some(outcome) = self.outcomes.get(&id) {
            if let Some(board) = &outcome.board {
                return Ok(GridResponse {
                    job_id: job_id.to_string(),
                    partial_board: board.rows().to_vec(),
                });
            }
        }
        Err(MasterError::JobNotFound(job_id.to_string()))
    }

    pub fn job_result(&self, job_id: &str) -> MasterResult<JobResultResponse> {
        let id = JobId::parse_str(job_id)
            .map_err(|_| MasterError::JobNotFound(job_id.to_string()))?;
        if let Some(entry) = self.registry.get(id) {
            let job = entry.lock();
            return Ok(JobResultResponse {
                job_id: Some(job_id.to_string()),
                solved_board: None,
                status: JobStatus::Processing,
                progress: Some(job.progress_percent()),
            });
        }
        if let Some(outcome) = self.outcomes.get(&id) {
            return Ok(JobResultResponse {
                job_id: Some(job_id.to_string()),
                solved_board: outcome.board.as_ref().map(|b| b.rows().to_vec()),
                status: outcome.status,
                progress: None,
            });
        }
        Err(MasterError::JobNotFound(job_id.to_string()))
    }

    pub fn total_jobs(&self) -> u64 {
        self.jobs_accepted_total.load(Ordering::Relaxed)
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            active_jobs: self.registry.len(),
            queued_sub_jobs: self.dispatcher.queue_len(),
            workers: self.dispatcher.worker_count(),
            metrics: self.metrics.snapshot(),
        }
    }
}
