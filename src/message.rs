//! Wire types exchanged with clients over the websocket.
//!
//! Frames are JSON text in both directions. The inbound shape is the
//! client's command vocabulary; the outbound shape is a full snapshot
//! of the session plus a human-readable message, so the client never
//! has to track state deltas.

use crate::game::{CELLS, Cell};
use serde::{Deserialize, Serialize};

/// Command verb sent by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    /// Open a fresh session and bind as first mover.
    Create,
    /// Bind to an existing session by identifier.
    Join,
    /// Place a mark at `position`.
    Play,
    /// Send a chat line to the session.
    Talk,
    /// Ask for a rematch once the game is over.
    Rematch,
}

/// Inbound payload from a client.
///
/// Fields other than `command` are optional; each verb reads the ones
/// it needs and ignores the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCommand {
    /// The command verb.
    pub command: Command,
    /// Board position for [`Command::Play`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    /// Session identifier for [`Command::Join`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    /// Chat text for [`Command::Talk`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Classification of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    /// Routine state update or notice.
    Info,
    /// Something worth the user's attention, not an error.
    Warning,
    /// A rejected command; delivered to the offender only.
    Error,
    /// Free-text chat from the other player.
    Chat,
}

/// Outbound payload: one session snapshot plus a message.
///
/// The `char` field carries the recipient's own mark and is
/// personalized per connection at fan-out time; every other field is
/// identical for both recipients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Identifier of the session this snapshot describes.
    pub game_id: String,
    /// Identifier of the spawned rematch session, or empty.
    pub rematch_id: String,
    /// Cells in row-major order, encoded 0/1/2.
    pub board: [Cell; CELLS],
    /// Mark whose turn it is.
    pub current_player: Cell,
    /// The recipient's assigned mark, 0 if unassigned.
    #[serde(rename = "char")]
    pub mark: Cell,
    /// Human-readable message text, possibly empty.
    pub message: String,
    /// Classification of this message.
    pub message_type: MessageType,
    /// True once the game reached a win or draw.
    pub game_over: bool,
    /// Winning mark, 0 for none (in progress or draw).
    pub winner: Cell,
}

impl ServerMessage {
    /// Builds a reply for a connection with no session context:
    /// empty identifiers, a blank board, and no assigned mark.
    pub fn bare(message_type: MessageType, message: impl Into<String>) -> Self {
        Self {
            game_id: String::new(),
            rematch_id: String::new(),
            board: [Cell::Empty; CELLS],
            current_player: Cell::Empty,
            mark: Cell::Empty,
            message: message.into(),
            message_type,
            game_over: false,
            winner: Cell::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Mark;
    use serde_json::json;

    #[test]
    fn test_decode_play_command() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"command":"PLAY","position":4}"#).expect("valid frame");
        assert_eq!(cmd.command, Command::Play);
        assert_eq!(cmd.position, Some(4));
        assert_eq!(cmd.game_id, None);
    }

    #[test]
    fn test_decode_join_command() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"command":"JOIN","game_id":"abc123"}"#).expect("valid frame");
        assert_eq!(cmd.command, Command::Join);
        assert_eq!(cmd.game_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let result = serde_json::from_str::<ClientCommand>(r#"{"command":"DANCE"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_garbage_frame_is_rejected() {
        assert!(serde_json::from_str::<ClientCommand>("not json").is_err());
    }

    #[test]
    fn test_server_message_wire_shape() {
        let mut msg = ServerMessage::bare(MessageType::Info, "X has won!");
        msg.game_id = "abc123".into();
        msg.board[0] = Cell::Marked(Mark::X);
        msg.current_player = Cell::Marked(Mark::O);
        msg.mark = Cell::Marked(Mark::X);
        msg.game_over = true;
        msg.winner = Cell::Marked(Mark::X);

        let value = serde_json::to_value(&msg).expect("serializable");
        assert_eq!(
            value,
            json!({
                "game_id": "abc123",
                "rematch_id": "",
                "board": [1, 0, 0, 0, 0, 0, 0, 0, 0],
                "current_player": 2,
                "char": 1,
                "message": "X has won!",
                "message_type": "INFO",
                "game_over": true,
                "winner": 1,
            })
        );
    }

    #[test]
    fn test_message_type_encodes_uppercase() {
        assert_eq!(
            serde_json::to_value(MessageType::Chat).expect("serializable"),
            json!("CHAT")
        );
    }
}
