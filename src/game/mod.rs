//! Pure board engine for one tic-tac-toe game.

mod board;
mod types;

pub use board::{Board, CELLS, MoveOutcome, SIZE};
pub use types::{Cell, Mark};
