//! Iteration, conflict, and recovery behaviour: selective requeue, stale
//! and duplicate results, dead workers, stalls, and abandonment

use std::sync::Arc;
use std::time::Duration;

use sudomesh_core::solver::{BacktrackingSolver, BlockRequest, BlockSolver};
use sudomesh_core::wire::{AckStatus, JobStatus, QueueResponse, ResultSubmission};
use sudomesh_core::{Board, PartitionIndex};
use sudomesh_master::{LogSink, MasterConfig, MasterEngine};

fn engine_with(config: MasterConfig) -> Arc<MasterEngine> {
    MasterEngine::new(config, Arc::new(LogSink))
}

fn engine() -> Arc<MasterEngine> {
    engine_with(MasterConfig::default())
}

/// 9×9 with a single anchor clue; every column stays open
fn single_clue_9x9() -> Vec<Vec<u8>> {
    let mut rows = vec![vec![0u8; 9]; 9];
    rows[8][8] = 1;
    rows
}

fn sparse_6x6() -> Vec<Vec<u8>> {
    let mut rows = vec![vec![0u8; 6]; 6];
    rows[0][0] = 1;
    rows[1][3] = 2;
    rows[3][1] = 3;
    rows[5][5] = 4;
    rows
}

/// A sure claim of `value` in the top cell of a column
fn sure_top_cell(job_id: &str, seq: u32, column: usize, value: u8, iteration: u32) -> ResultSubmission {
    let mut values = vec![0u8; 9];
    values[0] = value;
    let mut sure_mask = vec![false; 9];
    sure_mask[0] = true;
    ResultSubmission::solved(
        format!("{}.{}", job_id, seq),
        values,
        sure_mask,
        PartitionIndex::Column(column),
        iteration,
    )
}

fn solve_honestly(sub_job: &QueueResponse) -> ResultSubmission {
    let context = Board::from_rows(sub_job.context_board.clone()).unwrap();
    let solution = BacktrackingSolver
        .solve(&BlockRequest {
            partition_values: &sub_job.board,
            context_board: &context,
            partition_index: sub_job.partition_index,
        })
        .unwrap();
    ResultSubmission::solved(
        sub_job.id.clone(),
        solution.values,
        solution.sure_mask,
        sub_job.partition_index,
        sub_job.iteration,
    )
}

#[tokio::test]
async fn conflicting_sure_cells_start_a_second_iteration() {
    let engine = engine();
    let response = engine.intake(single_clue_9x9()).unwrap();
    let job_id = response.job_id;

    // Drain the first-iteration queue so the requeued work is observable.
    while engine.pull_sub_job("w1").is_some() {}

    // Two partitions disagree: both claim a sure 7 in row 0.
    let first = engine
        .submit_result(sure_top_cell(&job_id, 3, 2, 7, 1))
        .unwrap();
    assert_eq!(first.status, AckStatus::Received);
    let second = engine
        .submit_result(sure_top_cell(&job_id, 7, 6, 7, 1))
        .unwrap();
    assert_eq!(second.status, AckStatus::Received);

    // The conflicting overlay never reached the blueprint.
    let grid = engine.grid(&job_id).unwrap();
    assert_eq!(grid.partial_board[0][2], 0);
    assert_eq!(grid.partial_board[0][6], 0);
    assert_eq!(grid.partial_board[8][8], 1); // clue preserved

    // A fresh round was cut for the conflicted partitions.
    let requeued = engine.pull_sub_job("w1").unwrap();
    assert_eq!(requeued.iteration, 2);
    assert!(requeued.is_requeue);
}

#[tokio::test]
async fn stale_iteration_results_change_nothing() {
    let engine = engine();
    let response = engine.intake(single_clue_9x9()).unwrap();
    let job_id = response.job_id;
    while engine.pull_sub_job("w1").is_some() {}

    // Force iteration 2 via a conflict.
    engine
        .submit_result(sure_top_cell(&job_id, 3, 2, 7, 1))
        .unwrap();
    engine
        .submit_result(sure_top_cell(&job_id, 7, 6, 7, 1))
        .unwrap();

    // A straggler from iteration 1 arrives afterwards.
    let ack = engine
        .submit_result(sure_top_cell(&job_id, 1, 0, 5, 1))
        .unwrap();
    assert_eq!(ack.status, AckStatus::Queued);
    let grid = engine.grid(&job_id).unwrap();
    assert_eq!(grid.partial_board[0][0], 0);
}

#[tokio::test]
async fn monotone_sure_cells_within_an_iteration() {
    let engine = engine();
    let response = engine.intake(single_clue_9x9()).unwrap();
    let job_id = response.job_id;

    engine
        .submit_result(sure_top_cell(&job_id, 3, 2, 7, 1))
        .unwrap();
    assert_eq!(engine.grid(&job_id).unwrap().partial_board[0][2], 7);

    // An unrelated sure cell lands; the earlier one must not move.
    engine
        .submit_result(sure_top_cell(&job_id, 5, 4, 3, 1))
        .unwrap();
    let grid = engine.grid(&job_id).unwrap();
    assert_eq!(grid.partial_board[0][2], 7);
    assert_eq!(grid.partial_board[0][4], 3);
}

#[tokio::test]
async fn duplicate_results_are_dropped() {
    let engine = engine();
    let response = engine.intake(sparse_6x6()).unwrap();
    let job_id = response.job_id;

    let sub_job = engine.pull_sub_job("w1").unwrap();
    let submission = solve_honestly(&sub_job);
    let first = engine.submit_result(submission.clone()).unwrap();
    assert_eq!(first.status, AckStatus::Received);

    let before = engine.grid(&job_id).unwrap().partial_board;
    let second = engine.submit_result(submission).unwrap();
    assert_eq!(second.status, AckStatus::Queued);
    assert_eq!(engine.grid(&job_id).unwrap().partial_board, before);
}

#[tokio::test]
async fn dead_worker_sub_job_is_recovered() {
    let mut config = MasterConfig::default();
    config.timing.dead_after_ms = 50;
    let engine = engine_with(config);
    let response = engine.intake(sparse_6x6()).unwrap();
    let job_id = response.job_id;

    // The doomed worker takes one sub-job to the grave.
    let lost = engine.pull_sub_job("doomed").unwrap();
    let lost_partition = lost.partition_index;
    tokio::time::sleep(Duration::from_millis(80)).await;

    engine.heartbeat("survivor");
    engine.sweep_workers();

    // The orphaned partition comes back around; the survivor finishes.
    let mut recovered = false;
    for round in 0.. {
        assert!(round < 500, "job did not complete");
        let status = engine.job_result(&job_id).unwrap().status;
        if status != JobStatus::Processing {
            assert_eq!(status, JobStatus::Completed);
            break;
        }
        match engine.pull_sub_job("survivor") {
            Some(sub_job) => {
                recovered |= sub_job.partition_index == lost_partition;
                engine.submit_result(solve_honestly(&sub_job)).unwrap();
            }
            None => engine.tick(),
        }
    }
    assert!(recovered);
}

#[tokio::test]
async fn stalled_job_is_fully_requeued() {
    let mut config = MasterConfig::default();
    config.solve.stall_base_secs = 1;
    let engine = engine_with(config);
    engine.intake(sparse_6x6()).unwrap();

    // A worker drains the queue and disappears without submitting.
    while engine.pull_sub_job("vanisher").is_some() {}

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    engine.tick();

    let requeued = engine.pull_sub_job("w2").unwrap();
    assert_eq!(requeued.iteration, 2);
    assert!(requeued.is_requeue);
}

#[tokio::test]
async fn infeasible_report_against_pure_clues_marks_unsolvable() {
    let engine = engine();
    let response = engine.intake(sparse_6x6()).unwrap();
    let job_id = response.job_id;

    let sub_job = engine.pull_sub_job("w1").unwrap();
    engine
        .submit_result(ResultSubmission::infeasible(sub_job.id))
        .unwrap();

    let result = engine.job_result(&job_id).unwrap();
    assert_eq!(result.status, JobStatus::Unsolvable);
    assert!(result.solved_board.is_none());
}

#[tokio::test]
async fn unproductive_requeues_abandon_the_job() {
    let mut config = MasterConfig::default();
    config.solve.max_unproductive_iterations = 2;
    let engine = engine_with(config);
    let response = engine.intake(single_clue_9x9()).unwrap();
    let job_id = response.job_id;

    // The same conflict, round after round, never adds a sure cell.
    let mut rounds = 0;
    for iteration in 1..=10u32 {
        rounds = iteration;
        engine
            .submit_result(sure_top_cell(&job_id, 3, 2, 7, iteration))
            .unwrap();
        engine
            .submit_result(sure_top_cell(&job_id, 7, 6, 7, iteration))
            .unwrap();
        if engine.job_result(&job_id).unwrap().status != JobStatus::Processing {
            break;
        }
    }

    assert_eq!(rounds, 3);
    assert_eq!(
        engine.job_result(&job_id).unwrap().status,
        JobStatus::Unsolvable
    );
}
