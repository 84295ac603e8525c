//! Error taxonomy for game and session operations.
//!
//! Every error here is non-fatal: it is reported to the offending
//! connection only and never reaches the other player.

use derive_more::{Display, Error};

/// Rule violations raised while validating or applying a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum GameError {
    /// Move targets a position outside the 3x3 grid.
    #[display("that position is off the board")]
    OutOfRange,
    /// Move targets a cell that has already been claimed.
    #[display("this seat is taken")]
    SquareOccupied,
    /// Move arrived from the player whose turn it is not.
    #[display("it's not your turn yet 😠")]
    NotYourTurn,
    /// Move arrived after the session reached a terminal state.
    #[display("game is over! Hit \"New Game\" to start another 🕹️")]
    GameOver,
}

/// Failures while creating, joining, or routing to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum SessionError {
    /// No live session is registered under the requested identifier.
    #[display("game not found! Hit \"New Game\" to start one")]
    SessionNotFound,
    /// Both player slots are already bound to other connections.
    #[display("can't join this game!")]
    SessionFull,
    /// The operating system refused to supply random bytes for an
    /// identifier. Aborts the one operation, never the process.
    #[display("cannot get random bytes")]
    IdGeneration,
}
