// sudomesh-master: coordination counters surfaced via /health

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counter snapshot for the health endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub jobs_accepted: u64,
    pub jobs_completed: u64,
    pub jobs_abandoned: u64,
    pub jobs_unsolvable: u64,
    pub jobs_rejected: u64,
    pub sub_jobs_enqueued: u64,
    pub sub_jobs_dispatched: u64,
    pub results_accepted: u64,
    pub results_stale: u64,
    pub results_duplicate: u64,
    pub results_unsolvable: u64,
    pub selective_requeues: u64,
    pub full_requeues: u64,
    pub stalls_detected: u64,
    pub dead_workers_swept: u64,
}

/// Lock-free counters updated from request handlers and sweeps
#[derive(Debug, Default)]
pub struct MetricsCollector {
    jobs_accepted: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_abandoned: AtomicU64,
    jobs_unsolvable: AtomicU64,
    jobs_rejected: AtomicU64,
    sub_jobs_enqueued: AtomicU64,
    sub_jobs_dispatched: AtomicU64,
    results_accepted: AtomicU64,
    results_stale: AtomicU64,
    results_duplicate: AtomicU64,
    results_unsolvable: AtomicU64,
    selective_requeues: AtomicU64,
    full_requeues: AtomicU64,
    stalls_detected: AtomicU64,
    dead_workers_swept: AtomicU64,
}

macro_rules! counter {
    ($bump:ident, $field:ident) => {
        pub fn $bump(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(job_accepted, jobs_accepted);
    counter!(job_completed, jobs_completed);
    counter!(job_abandoned, jobs_abandoned);
    counter!(job_unsolvable, jobs_unsolvable);
    counter!(job_rejected, jobs_rejected);
    counter!(sub_job_dispatched, sub_jobs_dispatched);
    counter!(result_accepted, results_accepted);
    counter!(result_stale, results_stale);
    counter!(result_duplicate, results_duplicate);
    counter!(result_unsolvable, results_unsolvable);
    counter!(selective_requeue, selective_requeues);
    counter!(full_requeue, full_requeues);
    counter!(stall_detected, stalls_detected);

    pub fn sub_jobs_enqueued(&self, count: usize) {
        self.sub_jobs_enqueued
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn dead_workers_swept(&self, count: usize) {
        self.dead_workers_swept
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_accepted: self.jobs_accepted.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_abandoned: self.jobs_abandoned.load(Ordering::Relaxed),
            jobs_unsolvable: self.jobs_unsolvable.load(Ordering::Relaxed),
            jobs_rejected: self.jobs_rejected.load(Ordering::Relaxed),
            sub_jobs_enqueued: self.sub_jobs_enqueued.load(Ordering::Relaxed),
            sub_jobs_dispatched: self.sub_jobs_dispatched.load(Ordering::Relaxed),
            results_accepted: self.results_accepted.load(Ordering::Relaxed),
            results_stale: self.results_stale.load(Ordering::Relaxed),
            results_duplicate: self.results_duplicate.load(Ordering::Relaxed),
            results_unsolvable: self.results_unsolvable.load(Ordering::Relaxed),
            selective_requeues: self.selective_requeues.load(Ordering::Relaxed),
            full_requeues: self.full_requeues.load(Ordering::Relaxed),
            stalls_detected: self.stalls_detected.load(Ordering::Relaxed),
            dead_workers_swept: self.dead_workers_swept.load(Ordering::Relaxed),
        }
    }
}
