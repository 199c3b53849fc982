// sudomesh-worker: Configuration support

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sudomesh_core::SolverKind;
use uuid::Uuid;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Master endpoint, normally supplied via `MASTER_URL`
    pub master_url: String,
    /// Stable worker identity; generated when absent
    pub worker_id: String,
    /// Kernel used for pulled sub-jobs
    pub solver: SolverKind,
    /// Sleep between polls when the queue is empty
    pub poll_idle_ms: u64,
    /// Heartbeat period
    pub heartbeat_secs: u64,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub retry: RetrySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            master_url: "http://localhost:8080".to_string(),
            worker_id: format!("worker-{}", Uuid::new_v4()),
            solver: SolverKind::Backtracking,
            poll_idle_ms: 1_000,
            heartbeat_secs: 30,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            retry: RetrySection::default(),
        }
    }
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl WorkerConfig {
    /// Load config from a TOML file
    pub fn from_file(path: &str) -> WorkerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WorkerError::Config(format!("failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| WorkerError::Config(format!("failed to parse config file: {}", e)))
    }

    /// Apply environment overrides (`MASTER_URL`, `WORKER_ID`,
    /// `WORKER_SOLVER`)
    pub fn apply_env(&mut self) -> WorkerResult<()> {
        if let Ok(url) = env::var("MASTER_URL") {
            self.master_url = url;
        }
        if let Ok(id) = env::var("WORKER_ID") {
            self.worker_id = id;
        }
        if let Ok(kind) = env::var("WORKER_SOLVER") {
            self.solver = kind
                .parse()
                .map_err(|e| WorkerError::Config(format!("WORKER_SOLVER: {}", e)))?;
        }
        Ok(())
    }

    pub fn poll_idle(&self) -> Duration {
        Duration::from_millis(self.poll_idle_ms)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = WorkerConfig::default();
        assert_eq!(config.heartbeat_secs, 30);
        assert_eq!(config.solver, SolverKind::Backtracking);
        assert!(config.worker_id.starts_with("worker-"));
    }

    #[test]
    fn parses_partial_toml() {
        let config: WorkerConfig = toml::from_str(
            r#"
            master_url = "http://master:8080"
            solver = "annealing"
            "#,
        )
        .unwrap();
        assert_eq!(config.master_url, "http://master:8080");
        assert_eq!(config.solver, SolverKind::Annealing);
        assert_eq!(config.retry.max_retries, 3);
    }
}
