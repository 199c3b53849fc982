//! HTTP surface
//!
//! Thin axum wrappers over [`MasterEngine`]; every state transition lives
//! in the engine. Wire shapes are defined in `sudomesh_core::wire`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use sudomesh_core::wire::{
    ErrorResponse, GridResponse, HeartbeatRequest, JobResultResponse, QueueResponse, ResultAck,
    ResultSubmission, SolveRequest, SolveResponse, StatusAck, TotalJobsResponse,
};

use crate::engine::{HealthResponse, MasterEngine};
use crate::error::MasterError;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Build the router over a shared engine
pub fn router(engine: Arc<MasterEngine>) -> Router {
    Router::new()
        .route("/solve", post(solve))
        .route("/queue", get(queue))
        .route("/result", post(submit_result))
        .route("/result/:job_id", get(job_result))
        .route("/FinalsolvedResults", get(final_solved_results))
        .route("/grid/:job_id", get(grid))
        .route("/heartbeat", post(heartbeat))
        .route("/totalJobs", get(total_jobs))
        .route("/health", get(health))
        .with_state(engine)
}

fn error_response(err: MasterError) -> ApiError {
    let status = match err {
        MasterError::InvalidBoard(_)
        | MasterError::UnsolvableClues
        | MasterError::MissingField(_)
        | MasterError::Parse(_) => StatusCode::BAD_REQUEST,
        MasterError::JobNotFound(_) | MasterError::QueueEmpty => StatusCode::NOT_FOUND,
        MasterError::Config(_) | MasterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Deserialise a request body, mapping missing/invalid fields to 400
fn parse_body<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| error_response(MasterError::Parse(e.to_string())))
}

async fn solve(
    State(engine): State<Arc<MasterEngine>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<SolveResponse>, ApiError> {
    let request: SolveRequest = parse_body(body)?;
    engine.intake(request.board).map(Json).map_err(error_response)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueQuery {
    worker_id: Option<String>,
}

async fn queue(
    State(engine): State<Arc<MasterEngine>>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<QueueResponse>, ApiError> {
    let worker_id = query
        .worker_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| error_response(MasterError::MissingField("workerId")))?;
    engine
        .pull_sub_job(&worker_id)
        .map(Json)
        .ok_or_else(|| error_response(MasterError::QueueEmpty))
}

async fn submit_result(
    State(engine): State<Arc<MasterEngine>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<ResultAck>, ApiError> {
    let submission: ResultSubmission = parse_body(body)?;
    engine
        .submit_result(submission)
        .map(Json)
        .map_err(error_response)
}

async fn heartbeat(
    State(engine): State<Arc<MasterEngine>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<StatusAck>, ApiError> {
    let request: HeartbeatRequest = parse_body(body)?;
    if request.worker_id.is_empty() {
        return Err(error_response(MasterError::MissingField("workerId")));
    }
    engine.heartbeat(&request.worker_id);
    Ok(Json(StatusAck::ok()))
}

async fn grid(
    State(engine): State<Arc<MasterEngine>>,
    Path(job_id): Path<String>,
) -> Result<Json<GridResponse>, ApiError> {
    engine.grid(&job_id).map(Json).map_err(error_response)
}

async fn job_result(
    State(engine): State<Arc<MasterEngine>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResultResponse>, ApiError> {
    engine.job_result(&job_id).map(Json).map_err(error_response)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalResultsQuery {
    job_id: Option<String>,
}

/// Legacy alias of `GET /result/:jobId` with the ID in the query string
async fn final_solved_results(
    State(engine): State<Arc<MasterEngine>>,
    Query(query): Query<FinalResultsQuery>,
) -> Result<Json<JobResultResponse>, ApiError> {
    let job_id = query
        .job_id
        .ok_or_else(|| error_response(MasterError::MissingField("jobId")))?;
    engine.job_result(&job_id).map(Json).map_err(error_response)
}

async fn total_jobs(State(engine): State<Arc<MasterEngine>>) -> Json<TotalJobsResponse> {
    Json(TotalJobsResponse {
        total_jobs: engine.total_jobs(),
    })
}

async fn health(State(engine): State<Arc<MasterEngine>>) -> Json<HealthResponse> {
    Json(engine.health())
}
