//! Blueprint aggregation and conflict localisation
//!
//! The blueprint is rebuilt from scratch on every accepted result: original
//! clues, then every sure cell of the current iteration, then propagation.
//! Sure overlays of distinct partitions are disjoint, which makes the
//! rebuild commutative and idempotent — submission order cannot change the
//! outcome. Provisional (non-sure) values never enter the blueprint; they
//! only participate in the tentative board used for the final combine.

use sudomesh_core::{propagate, BlockDims, Board, CoreError, PartitionIndex, Strategy};

use crate::registry::Job;

/// Result of rebuilding a job's blueprint from its completions
#[derive(Debug)]
pub enum RebuildOutcome {
    /// Blueprint replaced; holds the new filled-cell count
    Clean { filled: usize },
    /// Sure overlays clash in a row, column, or block; the blueprint was
    /// left untouched and the offending overlay board is returned for
    /// conflict localisation
    Conflicted(Board),
    /// Propagation of the overlay emptied a candidate set; no conflict is
    /// localisable
    Infeasible,
}

/// Overlay all sure cells of the current iteration onto the clues.
///
/// Clues take precedence; partitions are disjoint, so sure cells cannot
/// fight each other — only a row/column/block clash across partitions can
/// make the result ill-formed.
pub fn overlay_sure_cells(job: &Job) -> Board {
    let mut board = job.initial_blueprint.clone();
    let side = board.side();
    let dims = board.block_dims();
    for completion in &job.completed {
        let cells = completion.partition_index.cells(side, dims);
        for (i, &(row, col)) in cells.iter().enumerate() {
            let value = completion.values[i];
            if completion.sure_mask[i] && value != 0 && board.get(row, col) == 0 {
                board.set(row, col, value);
            }
        }
    }
    board
}

/// Rebuild `current_blueprint` from clues + sure cells + propagation
pub fn rebuild_blueprint(job: &mut Job) -> RebuildOutcome {
    let mut board = overlay_sure_cells(job);
    if !board.is_well_formed() {
        return RebuildOutcome::Conflicted(board);
    }
    match propagate(&mut board) {
        Ok(_) => {
            let filled = board.filled_cells();
            job.current_blueprint = board;
            RebuildOutcome::Clean { filled }
        }
        Err(CoreError::Infeasible) => RebuildOutcome::Infeasible,
        Err(_) => RebuildOutcome::Infeasible,
    }
}

/// Compose the tentative full board: blueprint first, then provisional
/// values of every completion into still-empty cells (first writer wins).
pub fn tentative_board(job: &Job) -> Board {
    let mut board = job.current_blueprint.clone();
    let side = board.side();
    let dims = board.block_dims();
    for completion in &job.completed {
        let cells = completion.partition_index.cells(side, dims);
        for (i, &(row, col)) in cells.iter().enumerate() {
            let value = completion.values[i];
            if value != 0 && board.get(row, col) == 0 {
                board.set(row, col, value);
            }
        }
    }
    board
}

/// Partitions implicated in a duplicated non-zero value.
///
/// Scans every row and column; each offending cell maps to its partition
/// under the job's strategy. Deterministic insertion order, no duplicates.
pub fn conflicting_partitions(
    board: &Board,
    strategy: Strategy,
    dims: BlockDims,
) -> Vec<PartitionIndex> {
    let side = board.side();
    let mut conflicts: Vec<PartitionIndex> = Vec::new();
    let mut offenders = |cells: &[(usize, usize)]| {
        let mut first_seen: Vec<Option<(usize, usize)>> = vec![None; side + 1];
        for &(row, col) in cells {
            let value = board.get(row, col) as usize;
            if value == 0 {
                continue;
            }
            match first_seen[value] {
                None => first_seen[value] = Some((row, col)),
                Some(original) => {
                    for cell in [original, (row, col)] {
                        let partition = partition_of(cell, strategy, dims);
                        if !conflicts.contains(&partition) {
                            conflicts.push(partition);
                        }
                    }
                }
            }
        }
    };
    for r in 0..side {
        let row_cells: Vec<(usize, usize)> = (0..side).map(|c| (r, c)).collect();
        offenders(&row_cells);
    }
    for c in 0..side {
        let col_cells: Vec<(usize, usize)> = (0..side).map(|r| (r, c)).collect();
        offenders(&col_cells);
    }
    conflicts
}

fn partition_of((row, col): (usize, usize), strategy: Strategy, dims: BlockDims) -> PartitionIndex {
    match strategy {
        Strategy::Column => PartitionIndex::Column(col),
        Strategy::Block => {
            let (block_row, block_col) = dims.block_of(row, col);
            PartitionIndex::Block {
                block_row,
                block_col,
            }
        }
    }
}

/// Zero every non-clue cell of the given partitions in the blueprint
pub fn clear_partitions(job: &mut Job, partitions: &[PartitionIndex]) {
    let side = job.current_blueprint.side();
    let dims = job.current_blueprint.block_dims();
    for &partition in partitions {
        for (row, col) in partition.cells(side, dims) {
            if !job.is_clue(row, col) {
                job.current_blueprint.set(row, col, 0);
            }
        }
    }
}
