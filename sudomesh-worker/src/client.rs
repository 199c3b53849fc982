//! HTTP client to the master
//!
//! Thin reqwest wrapper with exponential-backoff retry on transient
//! failures. An empty queue (404) is not a failure.

use std::time::Duration;

use reqwest::StatusCode;
use sudomesh_core::wire::{HeartbeatRequest, QueueResponse, ResultAck, ResultSubmission, StatusAck};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::{RetrySection, WorkerConfig};
use crate::error::{is_retryable, WorkerError, WorkerResult};

/// Client for the master's worker endpoints
pub struct MasterClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetrySection,
}

impl MasterClient {
    pub fn new(config: &WorkerConfig) -> WorkerResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| WorkerError::Config(format!("building HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.master_url.trim_end_matches('/').to_string(),
            retry: config.retry.clone(),
        })
    }

    /// Pull the next sub-job; `None` when the queue is empty
    pub async fn fetch_sub_job(&self, worker_id: &str) -> WorkerResult<Option<QueueResponse>> {
        let url = format!("{}/queue", self.base_url);
        self.with_retry(|| async {
            let response = self
                .http
                .get(&url)
                .query(&[("workerId", worker_id)])
                .send()
                .await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let response = Self::check(response).await?;
            let sub_job: QueueResponse = response
                .json()
                .await
                .map_err(|e| WorkerError::Payload(e.to_string()))?;
            debug!(sub_job = %sub_job.id, "pulled sub-job");
            Ok(Some(sub_job))
        })
        .await
    }

    /// Post a result (solved or unsolvable form)
    pub async fn submit_result(&self, submission: &ResultSubmission) -> WorkerResult<ResultAck> {
        let url = format!("{}/result", self.base_url);
        self.with_retry(|| async {
            let response = self.http.post(&url).json(submission).send().await?;
            let response = Self::check(response).await?;
            response
                .json()
                .await
                .map_err(|e| WorkerError::Payload(e.to_string()))
        })
        .await
    }

    /// Report liveness
    pub async fn heartbeat(&self, worker_id: &str) -> WorkerResult<StatusAck> {
        let url = format!("{}/heartbeat", self.base_url);
        let body = HeartbeatRequest {
            worker_id: worker_id.to_string(),
        };
        self.with_retry(|| async {
            let response = self.http.post(&url).json(&body).send().await?;
            let response = Self::check(response).await?;
            response
                .json()
                .await
                .map_err(|e| WorkerError::Payload(e.to_string()))
        })
        .await
    }

    async fn check(response: reqwest::Response) -> WorkerResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(WorkerError::Http {
            status: status.as_u16(),
            message,
        })
    }

    /// Run a request with exponential backoff on transient errors
    async fn with_retry<F, Fut, T>(&self, mut f: F) -> WorkerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = WorkerResult<T>>,
    {
        let mut delay_ms = self.retry.initial_delay_ms;
        for attempt in 0..=self.retry.max_retries {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if !is_retryable(&err) => return Err(err),
                Err(err) if attempt >= self.retry.max_retries => {
                    return Err(WorkerError::RetryExhausted {
                        attempts: attempt + 1,
                        last: err.to_string(),
                    });
                }
                Err(err) => {
                    warn!(attempt, error = %err, "transient master error, retrying");
                    sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = (((delay_ms as f64) * self.retry.multiplier) as u64)
                        .min(self.retry.max_delay_ms);
                }
            }
        }
        // The loop always returns by the final attempt.
        Err(WorkerError::RetryExhausted {
            attempts: self.retry.max_retries + 1,
            last: "no attempt executed".to_string(),
        })
    }
}
