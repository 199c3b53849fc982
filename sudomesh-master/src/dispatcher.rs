//! FIFO sub-job queue, pending-assignment tracking, and the worker table
//!
//! Pull and submit are O(1) critical sections behind one lock; the worker
//! table has its own. Heartbeats and assignment timestamps use the
//! monotonic clock, so wall-clock jumps cannot kill healthy workers.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sudomesh_core::partition::{SubJob, SubJobId};
use sudomesh_core::JobId;
use tracing::{debug, info};

/// A sub-job handed to a worker and not yet returned
#[derive(Debug, Clone)]
pub struct Assignment {
    pub sub_job: SubJob,
    pub worker_id: String,
    pub assigned_at: Instant,
}

#[derive(Debug, Default)]
struct DispatchState {
    queue: VecDeque<SubJob>,
    pending: HashMap<SubJobId, Assignment>,
}

/// Dispatcher: FIFO queue plus worker liveness
#[derive(Debug, Default)]
pub struct Dispatcher {
    state: Mutex<DispatchState>,
    workers: Mutex<HashMap<String, Instant>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append sub-jobs to the back of the queue
    pub fn enqueue_all(&self, sub_jobs: Vec<SubJob>) {
        let mut state = self.state.lock();
        for sub_job in sub_jobs {
            state.queue.push_back(sub_job);
        }
    }

    /// Pop the head of the queue for a worker.
    ///
    /// Records the assignment and counts the pull as a liveness signal.
    pub fn pull(&self, worker_id: &str) -> Option<SubJob> {
        self.heartbeat(worker_id);
        let mut state = self.state.lock();
        let sub_job = state.queue.pop_front()?;
        debug!(sub_job = %sub_job.id, worker = worker_id, "sub-job assigned");
        state.pending.insert(
            sub_job.id,
            Assignment {
                sub_job: sub_job.clone(),
                worker_id: worker_id.to_string(),
                assigned_at: Instant::now(),
            },
        );
        Some(sub_job)
    }

    /// Forget the pending assignment for a returned sub-job.
    ///
    /// `None` when nothing was pending under that ID (duplicate return, or
    /// the assignment was already swept); the caller still forwards the
    /// result to the aggregator.
    pub fn complete(&self, id: SubJobId) -> Option<Assignment> {
        self.state.lock().pending.remove(&id)
    }

    /// Record a worker liveness signal
    pub fn heartbeat(&self, worker_id: &str) {
        self.workers
            .lock()
            .insert(worker_id.to_string(), Instant::now());
    }

    /// Re-enqueue assignments of workers whose heartbeat expired.
    ///
    /// Returns the number of dead workers forgotten.
    pub fn sweep_dead_workers(&self, dead_after: Duration) -> usize {
        let now = Instant::now();
        let dead: Vec<String> = {
            let mut workers = self.workers.lock();
            let dead: Vec<String> = workers
                .iter()
                .filter(|(_, &last)| now.duration_since(last) > dead_after)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &dead {
                workers.remove(id);
            }
            dead
        };
        if dead.is_empty() {
            return 0;
        }

        let mut state = self.state.lock();
        let orphaned: Vec<SubJobId> = state
            .pending
            .iter()
            .filter(|(_, a)| dead.contains(&a.worker_id))
            .map(|(&id, _)| id)
            .collect();
        for id in orphaned {
            if let Some(assignment) = state.pending.remove(&id) {
                info!(
                    sub_job = %id,
                    worker = assignment.worker_id,
                    "re-enqueueing sub-job from dead worker"
                );
                state.queue.push_back(assignment.sub_job);
            }
        }
        dead.len()
    }

    /// Drop queued sub-jobs of a job older than the given iteration.
    ///
    /// Called on requeue so stale work is never delivered; assignments
    /// already held by workers cannot be revoked and their results are
    /// dropped by the iteration check instead.
    pub fn purge_stale(&self, job: JobId, current_iteration: u32) {
        let mut state = self.state.lock();
        state
            .queue
            .retain(|s| s.id.job != job || s.iteration >= current_iteration);
    }

    /// Drop all queued and pending sub-jobs of a terminated job
    pub fn purge_job(&self, job: JobId) {
        let mut state = self.state.lock();
        state.queue.retain(|s| s.id.job != job);
        state.pending.retain(|id, _| id.job != job);
    }

    /// Queued (undelivered) sub-jobs of one job
    pub fn queued_for(&self, job: JobId) -> usize {
        self.state
            .lock()
            .queue
            .iter()
            .filter(|s| s.id.job == job)
            .count()
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sudomesh_core::partition::{partition_board, Strategy};
    use sudomesh_core::Board;

    fn sub_jobs(job: JobId, count: usize) -> Vec<SubJob> {
        let mut jobs = partition_board(&Board::empty(9), Strategy::Column, job, 1, false);
        jobs.truncate(count);
        jobs
    }

    #[test]
    fn fifo_order_preserved() {
        let dispatcher = Dispatcher::new();
        let job = JobId::new();
        dispatcher.enqueue_all(sub_jobs(job, 3));
        assert_eq!(dispatcher.pull("w1").unwrap().id.seq, 1);
        assert_eq!(dispatcher.pull("w2").unwrap().id.seq, 2);
        assert_eq!(dispatcher.pull("w1").unwrap().id.seq, 3);
        assert!(dispatcher.pull("w1").is_none());
    }

    #[test]
    fn complete_clears_pending() {
        let dispatcher = Dispatcher::new();
        let job = JobId::new();
        dispatcher.enqueue_all(sub_jobs(job, 1));
        let pulled = dispatcher.pull("w1").unwrap();
        let assignment = dispatcher.complete(pulled.id).unwrap();
        assert_eq!(assignment.worker_id, "w1");
        assert!(dispatcher.complete(pulled.id).is_none());
    }

    #[test]
    fn dead_worker_assignments_requeued() {
        let dispatcher = Dispatcher::new();
        let job = JobId::new();
        dispatcher.enqueue_all(sub_jobs(job, 2));
        let first = dispatcher.pull("dying").unwrap();
        dispatcher.heartbeat("healthy");

        // Zero tolerance: anything not heartbeating this instant is dead.
        std::thread::sleep(Duration::from_millis(5));
        let swept = dispatcher.sweep_dead_workers(Duration::from_millis(1));
        assert_eq!(swept, 2);

        // The orphaned sub-job went to the back of the queue.
        assert_eq!(dispatcher.pull("w2").unwrap().id.seq, 2);
        assert_eq!(dispatcher.pull("w2").unwrap().id, first.id);
    }

    #[test]
    fn purge_stale_drops_old_iterations_only() {
        let dispatcher = Dispatcher::new();
        let job = JobId::new();
        let board = Board::empty(9);
        dispatcher.enqueue_all(partition_board(&board, Strategy::Column, job, 1, false));
        dispatcher.enqueue_all(partition_board(&board, Strategy::Column, job, 2, true));
        dispatcher.purge_stale(job, 2);
        assert_eq!(dispatcher.queue_len(), 9);
        assert!(dispatcher.pull("w").unwrap().is_requeue);
    }
}
