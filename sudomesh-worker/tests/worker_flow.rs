//! Worker-to-master wire compatibility over a real HTTP socket

use std::sync::Arc;

use sudomesh_core::solver::{BacktrackingSolver, BlockRequest, BlockSolver};
use sudomesh_core::wire::{AckStatus, ResultSubmission};
use sudomesh_core::Board;
use sudomesh_master::{api, LogSink, MasterConfig, MasterEngine};
use sudomesh_worker::{MasterClient, WorkerConfig};

async fn serve_master() -> (Arc<MasterEngine>, String) {
    let engine = MasterEngine::new(MasterConfig::default(), Arc::new(LogSink));
    let app = api::router(Arc::clone(&engine));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (engine, format!("http://{}", addr))
}

fn sparse_6x6() -> Vec<Vec<u8>> {
    let mut rows = vec![vec![0u8; 6]; 6];
    rows[0][0] = 1;
    rows[1][3] = 2;
    rows[3][1] = 3;
    rows[5][5] = 4;
    rows
}

#[tokio::test]
async fn pull_solve_submit_round_trip() {
    let (engine, master_url) = serve_master().await;
    let config = WorkerConfig {
        master_url,
        ..WorkerConfig::default()
    };
    let client = MasterClient::new(&config).unwrap();

    // Empty queue is not an error.
    assert!(client.fetch_sub_job("w1").await.unwrap().is_none());
    client.heartbeat("w1").await.unwrap();

    let response = engine.intake(sparse_6x6()).unwrap();
    let sub_job = client.fetch_sub_job("w1").await.unwrap().unwrap();
    assert_eq!(sub_job.iteration, 1);
    assert!(!sub_job.is_requeue);
    assert!(sub_job.id.starts_with(&response.job_id));

    let context = Board::from_rows(sub_job.context_board.clone()).unwrap();
    let solution = BacktrackingSolver
        .solve(&BlockRequest {
            partition_values: &sub_job.board,
            context_board: &context,
            partition_index: sub_job.partition_index,
        })
        .unwrap();
    let ack = client
        .submit_result(&ResultSubmission::solved(
            sub_job.id.clone(),
            solution.values,
            solution.sure_mask,
            sub_job.partition_index,
            sub_job.iteration,
        ))
        .await
        .unwrap();
    assert_eq!(ack.id, sub_job.id);
    assert_eq!(ack.status, AckStatus::Received);
}

#[tokio::test]
async fn unreachable_master_exhausts_retries() {
    let config = WorkerConfig {
        // Reserved port with nothing listening.
        master_url: "http://127.0.0.1:9".to_string(),
        retry: sudomesh_worker::config::RetrySection {
            max_retries: 1,
            initial_delay_ms: 10,
            max_delay_ms: 20,
            multiplier: 2.0,
        },
        ..WorkerConfig::default()
    };
    let client = MasterClient::new(&config).unwrap();
    let err = client.fetch_sub_job("w1").await.unwrap_err();
    assert!(matches!(
        err,
        sudomesh_worker::WorkerError::RetryExhausted { attempts: 2, .. }
    ));
}
