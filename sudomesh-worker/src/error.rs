// sudomesh-worker: Error types

use sudomesh_core::CoreError;
use thiserror::Error;

/// Worker result type
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Worker error types
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Master returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Malformed master payload: {0}")]
    Payload(String),

    #[error("Solver error: {0}")]
    Solver(#[from] CoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Retry exhausted after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: String },
}

impl From<reqwest::Error> for WorkerError {
    fn from(err: reqwest::Error) -> Self {
        WorkerError::Network(err.to_string())
    }
}

/// Transient errors worth retrying: connectivity failures and 5xx replies
pub fn is_retryable(err: &WorkerError) -> bool {
    match err {
        WorkerError::Network(_) => true,
        WorkerError::Http { status, .. } => *status >= 500,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_errors() {
        assert!(is_retryable(&WorkerError::Network("reset".to_string())));
        assert!(is_retryable(&WorkerError::Http {
            status: 503,
            message: "busy".to_string()
        }));
        assert!(!is_retryable(&WorkerError::Http {
            status: 400,
            message: "bad".to_string()
        }));
        assert!(!is_retryable(&WorkerError::Config("x".to_string())));
    }
}
