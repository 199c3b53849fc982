//! Partitioning of a board into worker-sized sub-jobs
//!
//! A partition is either a single column (N×1) or a single block
//! (rBlk×cBlk). The partitioner emits one sub-job per partition that still
//! contains an empty cell; each sub-job snapshots the blueprint it was cut
//! from so workers solve against a consistent context.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::board::{BlockDims, Board};
use crate::error::{CoreError, CoreResult};

/// Partitioning strategy for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// One sub-job per column
    #[default]
    Column,
    /// One sub-job per block
    Block,
}

impl FromStr for Strategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "column" => Ok(Strategy::Column),
            "block" => Ok(Strategy::Block),
            other => Err(CoreError::Parse(format!("unknown strategy: {}", other))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Column => write!(f, "column"),
            Strategy::Block => write!(f, "block"),
        }
    }
}

/// Identifies one partition of a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartitionIndex {
    /// Column index
    Column(usize),
    /// Block coordinates
    #[serde(rename_all = "camelCase")]
    Block { block_row: usize, block_col: usize },
}

impl fmt::Display for PartitionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionIndex::Column(c) => write!(f, "col{}", c),
            PartitionIndex::Block {
                block_row,
                block_col,
            } => write!(f, "blk{}x{}", block_row, block_col),
        }
    }
}

impl PartitionIndex {
    /// Cell coordinates covered by this partition, in partition-value order
    pub fn cells(&self, side: usize, dims: BlockDims) -> Vec<(usize, usize)> {
        match *self {
            PartitionIndex::Column(col) => (0..side).map(|r| (r, col)).collect(),
            PartitionIndex::Block {
                block_row,
                block_col,
            } => {
                let mut cells = Vec::with_capacity(dims.rows * dims.cols);
                for r in block_row * dims.rows..(block_row + 1) * dims.rows {
                    for c in block_col * dims.cols..(block_col + 1) * dims.cols {
                        cells.push((r, c));
                    }
                }
                cells
            }
        }
    }
}

/// Unique identifier for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse_str(s: &str) -> CoreResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CoreError::Parse(format!("invalid job ID: {}", e)))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a sub-job, `{jobId}.{seq}` on the wire.
///
/// The sequence number restarts at 1 for every iteration of the owning job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubJobId {
    pub job: JobId,
    pub seq: u32,
}

impl SubJobId {
    pub fn parse_str(s: &str) -> CoreResult<Self> {
        let (job, seq) = s
            .rsplit_once('.')
            .ok_or_else(|| CoreError::Parse(format!("invalid sub-job ID: {}", s)))?;
        let seq = seq
            .parse::<u32>()
            .map_err(|e| CoreError::Parse(format!("invalid sub-job sequence: {}", e)))?;
        Ok(Self {
            job: JobId::parse_str(job)?,
            seq,
        })
    }
}

impl fmt::Display for SubJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.job, self.seq)
    }
}

/// One unit of work handed to a worker
#[derive(Debug, Clone)]
pub struct SubJob {
    pub id: SubJobId,
    pub partition_index: PartitionIndex,
    /// Values of the partition at creation time
    pub partition_values: Vec<u8>,
    pub iteration: u32,
    pub is_requeue: bool,
    /// Snapshot of the blueprint the partition was cut from
    pub context_blueprint: Board,
}

/// Read a partition's values out of a board
pub fn extract_partition(board: &Board, index: PartitionIndex) -> Vec<u8> {
    index
        .cells(board.side(), board.block_dims())
        .into_iter()
        .map(|(r, c)| board.get(r, c))
        .collect()
}

/// Write a partition's values back into a board.
///
/// Inverse of [`extract_partition`]; errors when the value count does not
/// match the partition size.
pub fn write_partition(board: &mut Board, index: PartitionIndex, values: &[u8]) -> CoreResult<()> {
    let cells = index.cells(board.side(), board.block_dims());
    if cells.len() != values.len() {
        return Err(CoreError::SolverContract(format!(
            "partition {} expects {} values, got {}",
            index,
            cells.len(),
            values.len()
        )));
    }
    for ((r, c), &v) in cells.into_iter().zip(values) {
        board.set(r, c, v);
    }
    Ok(())
}

/// All partition indices of a board under a strategy
pub fn all_partition_indices(board: &Board, strategy: Strategy) -> Vec<PartitionIndex> {
    let side = board.side();
    match strategy {
        Strategy::Column => (0..side).map(PartitionIndex::Column).collect(),
        Strategy::Block => {
            let dims = board.block_dims();
            let (vblocks, hblocks) = dims.block_grid(side);
            let mut out = Vec::with_capacity(vblocks * hblocks);
            for block_row in 0..vblocks {
                for block_col in 0..hblocks {
                    out.push(PartitionIndex::Block {
                        block_row,
                        block_col,
                    });
                }
            }
            out
        }
    }
}

/// Partition indices that still contain an empty cell
pub fn open_partition_indices(board: &Board, strategy: Strategy) -> Vec<PartitionIndex> {
    let dims = board.block_dims();
    all_partition_indices(board, strategy)
        .into_iter()
        .filter(|index| {
            index
                .cells(board.side(), dims)
                .into_iter()
                .any(|(r, c)| board.get(r, c) == 0)
        })
        .collect()
}

/// Cut sub-jobs for the given partitions of a blueprint.
///
/// Sequence numbers start at 1 and follow the order of `indices`.
pub fn sub_jobs_for(
    blueprint: &Board,
    indices: &[PartitionIndex],
    job: JobId,
    iteration: u32,
    is_requeue: bool,
) -> Vec<SubJob> {
    indices
        .iter()
        .enumerate()
        .map(|(i, &partition_index)| SubJob {
            id: SubJobId {
                job,
                seq: i as u32 + 1,
            },
            partition_index,
            partition_values: extract_partition(blueprint, partition_index),
            iteration,
            is_requeue,
            context_blueprint: blueprint.clone(),
        })
        .collect()
}

/// Cut sub-jobs for every open partition of a blueprint
pub fn partition_board(
    blueprint: &Board,
    strategy: Strategy,
    job: JobId,
    iteration: u32,
    is_requeue: bool,
) -> Vec<SubJob> {
    let indices = open_partition_indices(blueprint, strategy);
    sub_jobs_for(blueprint, &indices, job, iteration, is_requeue)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_board(side: usize) -> Board {
        let mut board = Board::empty(side);
        for r in 0..side {
            for c in 0..side {
                board.set(r, c, ((r * side + c) % side) as u8 + 1);
            }
        }
        board
    }

    #[test]
    fn partition_round_trip_columns() {
        let original = numbered_board(9);
        let mut rebuilt = Board::empty(9);
        for index in all_partition_indices(&original, Strategy::Column) {
            let values = extract_partition(&original, index);
            write_partition(&mut rebuilt, index, &values).unwrap();
        }
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn partition_round_trip_blocks() {
        let original = numbered_board(6);
        let mut rebuilt = Board::empty(6);
        for index in all_partition_indices(&original, Strategy::Block) {
            let values = extract_partition(&original, index);
            write_partition(&mut rebuilt, index, &values).unwrap();
        }
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn skips_filled_partitions() {
        let mut board = numbered_board(9);
        // Only column 4 keeps a gap.
        board.set(2, 4, 0);
        let jobs = partition_board(&board, Strategy::Column, JobId::new(), 1, false);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].partition_index, PartitionIndex::Column(4));
        assert_eq!(jobs[0].id.seq, 1);
    }

    #[test]
    fn sequence_numbers_restart_per_iteration() {
        let board = Board::empty(9);
        let job = JobId::new();
        let first = partition_board(&board, Strategy::Column, job, 1, false);
        let second = partition_board(&board, Strategy::Column, job, 2, true);
        assert_eq!(first.len(), 9);
        assert_eq!(second[0].id.seq, 1);
        assert!(second.iter().all(|s| s.is_requeue && s.iteration == 2));
    }

    #[test]
    fn block_sub_job_carries_subgrid_values() {
        let board = numbered_board(6); // blocks are 2×3
        let index = PartitionIndex::Block {
            block_row: 1,
            block_col: 1,
        };
        let values = extract_partition(&board, index);
        assert_eq!(values.len(), 6);
        assert_eq!(values[0], board.get(2, 3));
        assert_eq!(values[5], board.get(3, 5));
    }

    #[test]
    fn sub_job_id_wire_round_trip() {
        let id = SubJobId {
            job: JobId::new(),
            seq: 17,
        };
        let parsed = SubJobId::parse_str(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
        assert!(SubJobId::parse_str("not-an-id").is_err());
    }

    #[test]
    fn partition_index_wire_shapes() {
        let col = PartitionIndex::Column(3);
        assert_eq!(serde_json::to_string(&col).unwrap(), "3");
        let blk = PartitionIndex::Block {
            block_row: 1,
            block_col: 2,
        };
        assert_eq!(
            serde_json::to_string(&blk).unwrap(),
            r#"{"blockRow":1,"blockCol":2}"#
        );
        let parsed: PartitionIndex = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, col);
    }
}
