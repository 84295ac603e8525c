//! Board engine with incremental win detection.
//!
//! Instead of rescanning the grid after every move, the board keeps one
//! accumulator per winnable line (three rows, three columns, the two
//! diagonals). Each accumulator tracks which mark has claimed cells on
//! its line and how many; once both marks have touched a line it can
//! never be won and is marked dead. Win checks are O(1) per move.

use super::types::{Cell, Mark};
use crate::error::GameError;
use tracing::instrument;

/// Side length of the board.
pub const SIZE: usize = 3;

/// Total number of cells.
pub const CELLS: usize = SIZE * SIZE;

/// Rows, columns, and the two diagonals.
const LINES: usize = 2 * SIZE + 2;

/// Accumulator index of the anti-diagonal (row == SIZE-1 - col).
const ANTI_DIAGONAL: usize = LINES - 2;

/// Accumulator index of the main diagonal (row == col).
const MAIN_DIAGONAL: usize = LINES - 1;

/// Outcome of a successfully applied move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The move completed a line; the mover has won.
    Win,
    /// The game continues (the caller checks for a full board).
    Continue,
}

/// Win-detection accumulator for a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    /// No mark has touched this line yet.
    Untouched,
    /// One mark holds `count` cells on this line.
    Claimed { mark: Mark, count: u8 },
    /// Both marks have touched this line; it can never be won.
    Dead,
}

/// State of one game: the cells, a move counter, and the per-line
/// accumulators. Mutated only through [`Board::apply`].
#[derive(Debug, Clone)]
pub struct Board {
    cells: [Cell; CELLS],
    moves: u8,
    lines: [LineState; LINES],
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self {
            cells: [Cell::Empty; CELLS],
            moves: 0,
            lines: [LineState::Untouched; LINES],
        }
    }

    /// Places `mark` at `pos` (row-major, 0-8).
    ///
    /// Returns [`MoveOutcome::Win`] the first time any line reaches
    /// three cells held by one mark, [`MoveOutcome::Continue`]
    /// otherwise. The board has no terminal state of its own; rejecting
    /// moves after a win is the session's job.
    ///
    /// # Errors
    ///
    /// Fails with [`GameError::OutOfRange`] or
    /// [`GameError::SquareOccupied`] without mutating anything.
    #[instrument(skip(self))]
    pub fn apply(&mut self, pos: usize, mark: Mark) -> Result<MoveOutcome, GameError> {
        if pos >= CELLS {
            return Err(GameError::OutOfRange);
        }
        if !self.cells[pos].is_empty() {
            return Err(GameError::SquareOccupied);
        }

        self.cells[pos] = Cell::Marked(mark);
        self.moves += 1;

        if self.feed_lines(pos, mark) {
            Ok(MoveOutcome::Win)
        } else {
            Ok(MoveOutcome::Continue)
        }
    }

    /// Feeds the accumulators crossing `pos`; true if one completed.
    fn feed_lines(&mut self, pos: usize, mark: Mark) -> bool {
        let (row, col) = (pos / SIZE, pos % SIZE);

        let mut won = self.feed(row, mark);
        won |= self.feed(SIZE + col, mark);
        if row == col {
            won |= self.feed(MAIN_DIAGONAL, mark);
        }
        if row == (SIZE - 1) - col {
            won |= self.feed(ANTI_DIAGONAL, mark);
        }
        won
    }

    /// Advances one accumulator; true if it reached a full line.
    fn feed(&mut self, line: usize, mark: Mark) -> bool {
        let next = match self.lines[line] {
            LineState::Dead => return false,
            LineState::Untouched => LineState::Claimed { mark, count: 1 },
            LineState::Claimed { mark: held, count } if held == mark => LineState::Claimed {
                mark,
                count: count + 1,
            },
            LineState::Claimed { .. } => LineState::Dead,
        };
        self.lines[line] = next;
        matches!(next, LineState::Claimed { count, .. } if count as usize >= SIZE)
    }

    /// True once every cell is occupied.
    pub fn is_full(&self) -> bool {
        self.moves as usize == CELLS
    }

    /// The mark whose turn it is, derived from move-count parity.
    pub fn current_mover(&self) -> Mark {
        if self.moves % 2 == 0 { Mark::X } else { Mark::O }
    }

    /// Number of moves applied so far.
    pub fn moves(&self) -> u8 {
        self.moves
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> &[Cell; CELLS] {
        &self.cells
    }

    /// Formats the board as a human-readable grid, for logs.
    pub fn display(&self) -> String {
        let mut grid = String::new();
        for row in 0..SIZE {
            for col in 0..SIZE {
                let symbol = match self.cells[row * SIZE + col] {
                    Cell::Empty => '_',
                    Cell::Marked(Mark::X) => 'X',
                    Cell::Marked(Mark::O) => 'O',
                };
                grid.push(symbol);
                if col < SIZE - 1 {
                    grid.push('|');
                }
            }
            if row < SIZE - 1 {
                grid.push('\n');
            }
        }
        grid
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}
