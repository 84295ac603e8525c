//! Crosswire - a real-time two-player tic-tac-toe server.
//!
//! Clients connect over a websocket, get paired into a session, and
//! exchange moves and chat through a central registry of sessions.
//!
//! # Architecture
//!
//! - **Game**: pure board engine with O(1) incremental win detection
//! - **Session**: actor owning one board and two player slots; a
//!   command worker serializes mutations, a fan-out worker delivers
//!   broadcasts
//! - **Registry**: process-wide directory of live sessions with
//!   idle-timeout teardown
//! - **Server**: the thin websocket/HTTP shell around the core

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cli;
mod error;
mod game;
mod message;
mod player;
mod registry;
mod server;
mod session;

pub use cli::Cli;
pub use error::{GameError, SessionError};
pub use game::{Board, CELLS, Cell, Mark, MoveOutcome, SIZE};
pub use message::{ClientCommand, Command, MessageType, ServerMessage};
pub use player::{Outbound, PlayerHandle};
pub use registry::Registry;
pub use server::router;
pub use session::{BindOrigin, SessionConfig, SessionHandle, SessionId};
