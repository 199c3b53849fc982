//! Error types for board and solver operations

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Error types for the board model and block solvers
#[derive(Error, Debug)]
pub enum CoreError {
    /// Board shape or values are invalid
    #[error("Malformed board: {0}")]
    MalformedBoard(String),

    /// Board side has no usable block factorisation
    #[error("Board side {0} has no block factorisation")]
    NoBlockDims(usize),

    /// Clue set already violates row/column/block uniqueness
    #[error("Clue set violates Sudoku rules")]
    InvalidClues,

    /// Constraint propagation emptied a candidate set
    #[error("Board is infeasible")]
    Infeasible,

    /// Identifier or payload could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Solver produced a payload that does not match the partition
    #[error("Solver contract violation: {0}")]
    SolverContract(String),
}
