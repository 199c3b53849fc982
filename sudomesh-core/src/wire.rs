//! JSON wire types shared by the master's HTTP surface and the worker
//!
//! Boards travel as plain `int[][]` grids; field names are camelCase.
//! Requests are validated on ingress: optional fields exist only so a
//! malformed payload can be rejected with a useful message instead of a
//! deserialisation failure.

use serde::{Deserialize, Serialize};

use crate::partition::PartitionIndex;

/// Client puzzle submission (`POST /solve`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveRequest {
    pub board: Vec<Vec<u8>>,
}

/// Client-visible job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Unsolvable,
}

/// Intake response (`POST /solve`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_board: Option<Vec<Vec<u8>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solved_board: Option<Vec<Vec<u8>>>,
}

/// One sub-job handed to a worker (`GET /queue`).
///
/// `board` holds the partition's values in partition order; `contextBoard`
/// is the full blueprint snapshot the partition was cut from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueResponse {
    pub id: String,
    pub board: Vec<u8>,
    pub partition_index: PartitionIndex,
    pub iteration: u32,
    pub context_board: Vec<Vec<u8>>,
    pub is_requeue: bool,
}

/// Worker result submission (`POST /result`).
///
/// Either the solved form (`values`, `sureMask`, `partitionIndex`,
/// `iteration` all present) or the failure form (`unsolvable: true`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSubmission {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sure_mask: Option<Vec<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_index: Option<PartitionIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    #[serde(default)]
    pub unsolvable: bool,
}

impl ResultSubmission {
    /// Build the solved form
    pub fn solved(
        id: String,
        values: Vec<u8>,
        sure_mask: Vec<bool>,
        partition_index: PartitionIndex,
        iteration: u32,
    ) -> Self {
        Self {
            id,
            values: Some(values),
            sure_mask: Some(sure_mask),
            partition_index: Some(partition_index),
            iteration: Some(iteration),
            unsolvable: false,
        }
    }

    /// Build the failure form
    pub fn infeasible(id: String) -> Self {
        Self {
            id,
            values: None,
            sure_mask: None,
            partition_index: None,
            iteration: None,
            unsolvable: true,
        }
    }
}

/// Acknowledgement status for a result submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    /// Accepted into the current iteration
    Received,
    /// Dropped or deferred (stale iteration, duplicate, unknown sub-job)
    Queued,
}

/// Response to `POST /result`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultAck {
    pub id: String,
    pub status: AckStatus,
}

/// Worker liveness report (`POST /heartbeat`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub worker_id: String,
}

/// Plain acknowledgement body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusAck {
    pub status: String,
}

impl StatusAck {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Current blueprint of a job (`GET /grid/:jobId`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridResponse {
    pub job_id: String,
    pub partial_board: Vec<Vec<u8>>,
}

/// Final or in-flight result of a job (`GET /result/:jobId`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResultResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solved_board: Option<Vec<Vec<u8>>>,
    pub status: JobStatus,
    /// Percentage of filled cells while processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

/// Response to `GET /totalJobs`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalJobsResponse {
    pub total_jobs: u64,
}

/// Error body for 4xx responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_submission_failure_form() {
        let parsed: ResultSubmission =
            serde_json::from_str(r#"{"id":"abc.1","unsolvable":true}"#).unwrap();
        assert!(parsed.unsolvable);
        assert!(parsed.values.is_none());
    }

    #[test]
    fn result_submission_solved_form_round_trip() {
        let submission = ResultSubmission::solved(
            "abc.2".to_string(),
            vec![1, 2, 3],
            vec![true, false, true],
            PartitionIndex::Column(2),
            4,
        );
        let json = serde_json::to_string(&submission).unwrap();
        assert!(json.contains(r#""sureMask":[true,false,true]"#));
        assert!(json.contains(r#""partitionIndex":2"#));
        let parsed: ResultSubmission = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.iteration, Some(4));
        assert!(!parsed.unsolvable);
    }

    #[test]
    fn queue_response_field_names() {
        let response = QueueResponse {
            id: "job.1".to_string(),
            board: vec![0, 1],
            partition_index: PartitionIndex::Column(0),
            iteration: 1,
            context_board: vec![vec![0, 1], vec![1, 0]],
            is_requeue: false,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""contextBoard""#));
        assert!(json.contains(r#""isRequeue":false"#));
    }
}
