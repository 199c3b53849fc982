//! Error types for the master coordinator

use sudomesh_core::CoreError;
use thiserror::Error;

/// Result type for master operations
pub type MasterResult<T> = Result<T, MasterError>;

/// Master error types
#[derive(Error, Debug)]
pub enum MasterError {
    /// Submitted grid is not a valid board
    #[error("Invalid board: {0}")]
    InvalidBoard(String),

    /// Clue set admits no solution
    #[error("Unsolvable clues")]
    UnsolvableClues,

    /// Job is not tracked
    #[error("Job {0} not found")]
    JobNotFound(String),

    /// No sub-jobs are waiting for a worker
    #[error("No sub-jobs queued")]
    QueueEmpty,

    /// Required request field is absent
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Identifier or payload could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for MasterError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Infeasible => MasterError::UnsolvableClues,
            CoreError::MalformedBoard(msg) => MasterError::InvalidBoard(msg),
            CoreError::NoBlockDims(side) => {
                MasterError::InvalidBoard(format!("side {} has no block factorisation", side))
            }
            CoreError::InvalidClues => {
                MasterError::InvalidBoard("clue set violates Sudoku rules".to_string())
            }
            CoreError::Parse(msg) => MasterError::Parse(msg),
            CoreError::SolverContract(msg) => MasterError::Parse(msg),
        }
    }
}
