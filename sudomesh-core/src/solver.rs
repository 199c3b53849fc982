//! Block solver kernels
//!
//! A [`BlockSolver`] receives one partition plus the full blueprint it was
//! cut from and returns the partition's values together with a parallel
//! sure mask. A `true` entry asserts the value is forced by the combined
//! row/column/block constraints of the context; anything a kernel merely
//! guessed stays `false` and is only used provisionally by the master.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::board::Board;
use crate::error::{CoreError, CoreResult};
use crate::partition::{extract_partition, write_partition, PartitionIndex};
use crate::propagate::propagate;

/// One partition handed to a kernel, with its context
#[derive(Debug)]
pub struct BlockRequest<'a> {
    /// Values of the partition at assignment time
    pub partition_values: &'a [u8],
    /// Blueprint snapshot the partition was cut from
    pub context_board: &'a Board,
    /// Which partition this is
    pub partition_index: PartitionIndex,
}

/// Kernel output: partition values plus certainty per cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSolution {
    pub values: Vec<u8>,
    pub sure_mask: Vec<bool>,
}

/// A pluggable solver for one partition
pub trait BlockSolver: Send + Sync {
    /// Kernel name, used in logs and configuration
    fn name(&self) -> &'static str;

    /// Solve one partition against its context.
    ///
    /// Contract: output lengths equal the partition length; already-filled
    /// cells are echoed with `sure = true`; `sure = true` on a previously
    /// empty cell means the value is forced, never guessed. Returns
    /// [`CoreError::Infeasible`] when the context admits no completion.
    fn solve(&self, req: &BlockRequest<'_>) -> CoreResult<BlockSolution>;
}

/// Kernel selection for worker configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// Constraint propagation only; everything it fills is sure
    RuleBased,
    /// Propagation plus depth-first search over the context board
    #[default]
    Backtracking,
    /// Propagation plus simulated annealing; useful for large N
    Annealing,
}

impl FromStr for SolverKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "rulebased" | "rules" => Ok(SolverKind::RuleBased),
            "backtracking" | "dfs" => Ok(SolverKind::Backtracking),
            "annealing" => Ok(SolverKind::Annealing),
            other => Err(CoreError::Parse(format!("unknown solver kind: {}", other))),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverKind::RuleBased => write!(f, "rulebased"),
            SolverKind::Backtracking => write!(f, "backtracking"),
            SolverKind::Annealing => write!(f, "annealing"),
        }
    }
}

/// Instantiate the kernel for a configured kind
pub fn make_solver(kind: SolverKind) -> Box<dyn BlockSolver> {
    match kind {
        SolverKind::RuleBased => Box::new(RuleBasedSolver),
        SolverKind::Backtracking => Box::new(BacktrackingSolver),
        SolverKind::Annealing => Box::new(AnnealingSolver::default()),
    }
}

/// Overlay the partition onto its context and propagate to a fixed point.
///
/// Returns the propagated context plus the sure mask for the partition:
/// cells that were already filled or got forced by propagation.
fn propagated_context(req: &BlockRequest<'_>) -> CoreResult<(Board, Vec<bool>)> {
    let mut context = req.context_board.clone();
    write_partition(&mut context, req.partition_index, req.partition_values)?;
    propagate(&mut context)?;

    let cells = req
        .partition_index
        .cells(context.side(), context.block_dims());
    let sure_mask = cells
        .iter()
        .map(|&(r, c)| context.get(r, c) != 0)
        .collect();
    Ok((context, sure_mask))
}

/// Propagation-only kernel.
///
/// Returns whatever naked/hidden singles force; untouched cells come back
/// as `0` with `sure = false`.
pub struct RuleBasedSolver;

impl BlockSolver for RuleBasedSolver {
    fn name(&self) -> &'static str {
        "rulebased"
    }

    fn solve(&self, req: &BlockRequest<'_>) -> CoreResult<BlockSolution> {
        let (context, sure_mask) = propagated_context(req)?;
        Ok(BlockSolution {
            values: extract_partition(&context, req.partition_index),
            sure_mask,
        })
    }
}

/// Propagation followed by depth-first search over the whole context.
///
/// Search-filled cells are guesses and stay `sure = false`.
pub struct BacktrackingSolver;

impl BacktrackingSolver {
    fn search(board: &mut Board) -> bool {
        let side = board.side();
        // Most-constrained empty cell first keeps the branching factor down.
        let mut target: Option<(usize, usize, Vec<u8>)> = None;
        for r in 0..side {
            for c in 0..side {
                if board.get(r, c) != 0 {
                    continue;
                }
                let candidates = board.candidates(r, c);
                if candidates.is_empty() {
                    return false;
                }
                let better = target
                    .as_ref()
                    .map(|(_, _, best)| candidates.len() < best.len())
                    .unwrap_or(true);
                if better {
                    let decided = candidates.len() == 1;
                    target = Some((r, c, candidates));
                    if decided {
                        // A forced cell cannot be beaten; stop scanning.
                        break;
                    }
                }
            }
        }
        let Some((row, col, candidates)) = target else {
            return true; // no empty cell left
        };
        for v in candidates {
            board.set(row, col, v);
            if Self::search(board) {
                return true;
            }
        }
        board.set(row, col, 0);
        false
    }
}

impl BlockSolver for BacktrackingSolver {
    fn name(&self) -> &'static str {
        "backtracking"
    }

    fn solve(&self, req: &BlockRequest<'_>) -> CoreResult<BlockSolution> {
        let (context, sure_mask) = propagated_context(req)?;
        let mut solved = context.clone();
        if !Self::search(&mut solved) {
            return Err(CoreError::Infeasible);
        }
        debug!(partition = %req.partition_index, "backtracking found a completion");
        Ok(BlockSolution {
            values: extract_partition(&solved, req.partition_index),
            sure_mask,
        })
    }
}

/// Simulated annealing over the context board.
///
/// Blocks are seeded with their missing values, then pairs inside a random
/// block are swapped under a geometric cooling schedule; the energy is the
/// number of row/column conflicts. Falls back to the propagated partition
/// when no restart reaches zero energy, so the kernel still never claims an
/// unforced cell as sure.
pub struct AnnealingSolver {
    pub max_sweeps: usize,
    pub restarts: usize,
    pub initial_temperature: f64,
    pub cooling: f64,
    seed: Option<u64>,
}

impl Default for AnnealingSolver {
    fn default() -> Self {
        Self {
            max_sweeps: 200_000,
            restarts: 4,
            initial_temperature: 3.0,
            cooling: 0.99997,
            seed: None,
        }
    }
}

impl AnnealingSolver {
    /// Deterministic variant for tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    fn anneal(&self, context: &Board, rng: &mut StdRng) -> Option<Board> {
        let side = context.side();
        let dims = context.block_dims();
        let (vblocks, hblocks) = dims.block_grid(side);

        // Free cells per block, and a board seeded so every block holds a
        // permutation of 1..=N.
        let mut board = context.clone();
        let mut free: Vec<Vec<(usize, usize)>> = Vec::new();
        for br in 0..vblocks {
            for bc in 0..hblocks {
                let index = PartitionIndex::Block {
                    block_row: br,
                    block_col: bc,
                };
                let cells = index.cells(side, dims);
                let mut missing: Vec<u8> = {
                    let mut present = vec![false; side + 1];
                    for &(r, c) in &cells {
                        present[board.get(r, c) as usize] = true;
                    }
                    (1..=side as u8).filter(|&v| !present[v as usize]).collect()
                };
                // Fisher-Yates
                for i in (1..missing.len()).rev() {
                    missing.swap(i, rng.gen_range(0..=i));
                }
                let holes: Vec<(usize, usize)> = cells
                    .into_iter()
                    .filter(|&(r, c)| context.get(r, c) == 0)
                    .collect();
                for (&(r, c), &v) in holes.iter().zip(missing.iter()) {
                    board.set(r, c, v);
                }
                free.push(holes);
            }
        }

        let swappable: Vec<usize> = (0..free.len()).filter(|&b| free[b].len() >= 2).collect();
        if swappable.is_empty() {
            return board.is_solved().then_some(board);
        }

        let mut energy = Self::energy(&board);
        let mut temperature = self.initial_temperature;
        for _ in 0..self.max_sweeps {
            if energy == 0 {
                return Some(board);
            }
            let block = &free[swappable[rng.gen_range(0..swappable.len())]];
            let a = block[rng.gen_range(0..block.len())];
            let b = block[rng.gen_range(0..block.len())];
            if a == b {
                continue;
            }
            let before = Self::cell_conflicts(&board, a) + Self::cell_conflicts(&board, b);
            let (va, vb) = (board.get(a.0, a.1), board.get(b.0, b.1));
            board.set(a.0, a.1, vb);
            board.set(b.0, b.1, va);
            let after = Self::cell_conflicts(&board, a) + Self::cell_conflicts(&board, b);
            let delta = after as i64 - before as i64;
            let accept = delta <= 0 || rng.gen::<f64>() < (-(delta as f64) / temperature).exp();
            if accept {
                energy = (energy as i64 + delta) as usize;
            } else {
                board.set(a.0, a.1, va);
                board.set(b.0, b.1, vb);
            }
            temperature *= self.cooling;
        }
        None
    }

    /// Conflicting row/column pairs of the whole board (blocks hold
    /// permutations, so they contribute nothing). Counting pairs keeps the
    /// incremental delta from [`Self::cell_conflicts`] exact.
    fn energy(board: &Board) -> usize {
        let side = board.side();
        let mut conflicts = 0;
        for r in 0..side {
            conflicts += Self::unit_conflicts((0..side).map(|c| board.get(r, c)), side);
        }
        for c in 0..side {
            conflicts += Self::unit_conflicts((0..side).map(|r| board.get(r, c)), side);
        }
        conflicts
    }

    fn unit_conflicts(values: impl Iterator<Item = u8>, side: usize) -> usize {
        let mut counts = vec![0usize; side + 1];
        for v in values {
            counts[v as usize] += 1;
        }
        counts[1..].iter().map(|&n| n * n.saturating_sub(1) / 2).sum()
    }

    /// Conflicts the cell participates in along its row and column
    fn cell_conflicts(board: &Board, (row, col): (usize, usize)) -> usize {
        let side = board.side();
        let v = board.get(row, col);
        let mut conflicts = 0;
        for c in 0..side {
            if c != col && board.get(row, c) == v {
                conflicts += 1;
            }
        }
        for r in 0..side {
            if r != row && board.get(r, col) == v {
                conflicts += 1;
            }
        }
        conflicts
    }
}

impl BlockSolver for AnnealingSolver {
    fn name(&self) -> &'static str {
        "annealing"
    }

    fn solve(&self, req: &BlockRequest<'_>) -> CoreResult<BlockSolution> {
        let (context, sure_mask) = propagated_context(req)?;
        if context.is_complete() {
            return Ok(BlockSolution {
                values: extract_partition(&context, req.partition_index),
                sure_mask,
            });
        }
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        for attempt in 0..self.restarts {
            if let Some(solved) = self.anneal(&context, &mut rng) {
                debug!(
                    partition = %req.partition_index,
                    attempt,
                    "annealing reached zero energy"
                );
                return Ok(BlockSolution {
                    values: extract_partition(&solved, req.partition_index),
                    sure_mask,
                });
            }
        }
        // Glassed out: report only what propagation forced.
        Ok(BlockSolution {
            values: extract_partition(&context, req.partition_index),
            sure_mask,
        })
    }
}
