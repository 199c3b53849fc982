//! Per-job state and the job registry
//!
//! Each job owns its record behind its own mutex; the registry itself is a
//! concurrent map so request handlers never serialise on unrelated jobs.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use sudomesh_core::partition::{PartitionIndex, SubJobId};
use sudomesh_core::{Board, JobId, Strategy};

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Sub-jobs outstanding
    Active,
    /// Valid full solution recovered
    Solved,
    /// Infeasible clues or no alternative left
    Unsolvable,
    /// Requeued repeatedly without progress
    Abandoned,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Active)
    }
}

/// A completed sub-job retained for the current iteration
#[derive(Debug, Clone)]
pub struct CompletedSubJob {
    pub sub_job_id: SubJobId,
    pub partition_index: PartitionIndex,
    pub values: Vec<u8>,
    pub sure_mask: Vec<bool>,
    pub iteration: u32,
}

/// Per-job record; owned by the registry, mutated under the job's mutex
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub strategy: Strategy,
    /// Original clues (plus the seed block for an empty intake); never
    /// overwritten
    pub initial_blueprint: Board,
    /// Best-known board: clues plus sure cells of the current iteration
    pub current_blueprint: Board,
    pub iteration: u32,
    /// Sub-jobs cut for the current iteration
    pub expected_sub_jobs: usize,
    pub completed: Vec<CompletedSubJob>,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
    pub last_progress_at: Instant,
    /// Highest filled-cell count the blueprint ever reached
    pub max_filled_seen: usize,
    /// `max_filled_seen` at the previous iteration bump
    pub filled_at_last_bump: usize,
    /// Consecutive requeue rounds without a new sure cell
    pub unproductive_iterations: u32,
}

impl Job {
    pub fn new(id: JobId, strategy: Strategy, initial: Board, current: Board) -> Self {
        let filled = current.filled_cells();
        Self {
            id,
            strategy,
            initial_blueprint: initial,
            current_blueprint: current,
            iteration: 1,
            expected_sub_jobs: 0,
            completed: Vec::new(),
            state: JobState::Active,
            started_at: Utc::now(),
            last_progress_at: Instant::now(),
            max_filled_seen: filled,
            filled_at_last_bump: filled,
            unproductive_iterations: 0,
        }
    }

    /// Whether a cell is an original clue
    pub fn is_clue(&self, row: usize, col: usize) -> bool {
        self.initial_blueprint.get(row, col) != 0
    }

    /// Percentage of filled blueprint cells, for client polling
    pub fn progress_percent(&self) -> u8 {
        let side = self.current_blueprint.side();
        let total = side * side;
        if total == 0 {
            return 0;
        }
        (self.current_blueprint.filled_cells() * 100 / total) as u8
    }

    /// Completion already recorded for a partition in the current iteration
    pub fn has_completion_for(&self, index: PartitionIndex) -> bool {
        self.completed.iter().any(|c| c.partition_index == index)
    }

    /// All sub-jobs cut for the current iteration have returned
    pub fn iteration_returned(&self) -> bool {
        self.expected_sub_jobs > 0 && self.completed.len() >= self.expected_sub_jobs
    }
}

/// Concurrent map of active jobs
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, Arc<Mutex<Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) -> Arc<Mutex<Job>> {
        let id = job.id;
        let entry = Arc::new(Mutex::new(job));
        self.jobs.insert(id, Arc::clone(&entry));
        entry
    }

    pub fn get(&self, id: JobId) -> Option<Arc<Mutex<Job>>> {
        self.jobs.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: JobId) {
        self.jobs.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Snapshot of all tracked jobs, safe to lock one at a time
    pub fn all(&self) -> Vec<Arc<Mutex<Job>>> {
        self.jobs
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
