//! Deterministic constraint propagation
//!
//! `propagate` fills naked singles (an empty cell with exactly one
//! candidate) and hidden singles (a value with exactly one home inside a
//! row, column, or block) until a fixed point. The pass never removes a
//! value and never invalidates a well-formed board; a cell whose candidate
//! set empties out signals infeasibility.

use tracing::trace;

use crate::board::Board;
use crate::error::{CoreError, CoreResult};

/// Run propagation to a fixed point.
///
/// Returns the number of cells filled. Idempotent: a second call on the
/// result fills nothing. Errors with [`CoreError::Infeasible`] when the
/// clues admit no completion of some cell.
pub fn propagate(board: &mut Board) -> CoreResult<usize> {
    let side = board.side();
    let mut filled = 0;
    // Each pass fills at least one cell or stops, so N² passes bound the loop.
    for _ in 0..side * side {
        let naked = fill_naked_singles(board)?;
        let hidden = fill_hidden_singles(board)?;
        filled += naked + hidden;
        if naked + hidden == 0 {
            break;
        }
    }
    if filled > 0 {
        trace!(filled, "propagation fixed point reached");
    }
    Ok(filled)
}

fn fill_naked_singles(board: &mut Board) -> CoreResult<usize> {
    let side = board.side();
    let mut filled = 0;
    for row in 0..side {
        for col in 0..side {
            if board.get(row, col) != 0 {
                continue;
            }
            let candidates = board.candidates(row, col);
            match candidates.as_slice() {
                [] => return Err(CoreError::Infeasible),
                [only] => {
                    board.set(row, col, *only);
                    filled += 1;
                }
                _ => {}
            }
        }
    }
    Ok(filled)
}

fn fill_hidden_singles(board: &mut Board) -> CoreResult<usize> {
    let side = board.side();
    let dims = board.block_dims();
    let mut filled = 0;

    let mut units: Vec<Vec<(usize, usize)>> = Vec::new();
    for r in 0..side {
        units.push((0..side).map(|c| (r, c)).collect());
    }
    for c in 0..side {
        units.push((0..side).map(|r| (r, c)).collect());
    }
    let (vblocks, hblocks) = dims.block_grid(side);
    for br in 0..vblocks {
        for bc in 0..hblocks {
            let mut cells = Vec::with_capacity(side);
            for r in br * dims.rows..(br + 1) * dims.rows {
                for c in bc * dims.cols..(bc + 1) * dims.cols {
                    cells.push((r, c));
                }
            }
            units.push(cells);
        }
    }

    for unit in &units {
        for value in 1..=side as u8 {
            if unit.iter().any(|&(r, c)| board.get(r, c) == value) {
                continue;
            }
            let mut homes = unit
                .iter()
                .filter(|&&(r, c)| board.get(r, c) == 0 && board.is_valid_placement(r, c, value));
            match (homes.next(), homes.next()) {
                (None, _) => return Err(CoreError::Infeasible),
                (Some(&(r, c)), None) => {
                    board.set(r, c, value);
                    filled += 1;
                }
                _ => {}
            }
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(rows: &[&[u8]]) -> Board {
        Board::from_rows(rows.iter().map(|r| r.to_vec()).collect()).unwrap()
    }

    #[test]
    fn fills_naked_single() {
        // Top-left cell sees 1..8 via its row, column, and block; 9 is forced.
        let mut b = board(&[
            &[0, 2, 3, 4, 5, 6, 7, 8, 0],
            &[4, 0, 0, 0, 0, 0, 0, 0, 0],
            &[7, 0, 0, 0, 0, 0, 0, 0, 0],
            &[1, 0, 0, 0, 0, 0, 0, 0, 0],
            &[0; 9],
            &[0; 9],
            &[0; 9],
            &[0; 9],
            &[0; 9],
        ]);
        propagate(&mut b).unwrap();
        assert_eq!(b.get(0, 0), 9);
    }

    #[test]
    fn fills_hidden_single() {
        // 1 fits nowhere else in the top-left block.
        let mut b = board(&[
            &[0, 0, 0, 0, 0, 0, 0, 0, 0],
            &[0, 0, 0, 1, 0, 0, 0, 0, 0],
            &[0, 0, 0, 0, 0, 0, 1, 0, 0],
            &[0, 1, 0, 0, 0, 0, 0, 0, 0],
            &[0; 9],
            &[0; 9],
            &[0, 0, 1, 0, 0, 0, 0, 0, 0],
            &[0; 9],
            &[0; 9],
        ]);
        propagate(&mut b).unwrap();
        assert_eq!(b.get(0, 0), 1);
    }

    #[test]
    fn idempotent_at_fixed_point() {
        let mut b = board(&[
            &[0, 2, 3, 4, 5, 6, 7, 8, 0],
            &[4, 0, 0, 0, 0, 0, 0, 0, 0],
            &[7, 0, 0, 0, 0, 0, 0, 0, 0],
            &[1, 0, 0, 0, 0, 0, 0, 0, 0],
            &[0; 9],
            &[0; 9],
            &[0; 9],
            &[0; 9],
            &[0; 9],
        ]);
        propagate(&mut b).unwrap();
        let snapshot = b.clone();
        let second = propagate(&mut b).unwrap();
        assert_eq!(second, 0);
        assert_eq!(b, snapshot);
    }

    #[test]
    fn detects_infeasible_cell() {
        // Cell (0, 0) sees all nine values.
        let mut b = board(&[
            &[0, 1, 2, 3, 4, 5, 6, 7, 8],
            &[9, 0, 0, 0, 0, 0, 0, 0, 0],
            &[0; 9],
            &[0; 9],
            &[0; 9],
            &[0; 9],
            &[0; 9],
            &[0; 9],
            &[0; 9],
        ]);
        assert!(matches!(propagate(&mut b), Err(CoreError::Infeasible)));
    }

    #[test]
    fn preserves_existing_values() {
        let mut b = board(&[
            &[5, 3, 0, 0, 7, 0, 0, 0, 0],
            &[6, 0, 0, 1, 9, 5, 0, 0, 0],
            &[0, 9, 8, 0, 0, 0, 0, 6, 0],
            &[8, 0, 0, 0, 6, 0, 0, 0, 3],
            &[4, 0, 0, 8, 0, 3, 0, 0, 1],
            &[7, 0, 0, 0, 2, 0, 0, 0, 6],
            &[0, 6, 0, 0, 0, 0, 2, 8, 0],
            &[0, 0, 0, 4, 1, 9, 0, 0, 5],
            &[0, 0, 0, 0, 8, 0, 0, 7, 9],
        ]);
        let before = b.clone();
        propagate(&mut b).unwrap();
        for r in 0..9 {
            for c in 0..9 {
                if before.get(r, c) != 0 {
                    assert_eq!(b.get(r, c), before.get(r, c));
                }
            }
        }
        assert!(b.is_well_formed());
    }
}
