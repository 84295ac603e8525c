//! Session actor: one match between two connections.
//!
//! A session runs as two tasks. The command worker owns all mutable
//! game state and consumes a single command queue, so no two mutations
//! ever race. The fan-out worker consumes a broadcast queue and pushes
//! personalized copies of each snapshot to the recipients, so a slow
//! client write can never stall move validation. Closing both queues
//! is the only cancellation mechanism.

use crate::error::{GameError, SessionError};
use crate::game::{Board, Mark, MoveOutcome};
use crate::message::{MessageType, ServerMessage};
use crate::player::PlayerHandle;
use crate::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

/// Unique identifier for a session.
pub type SessionId = String;

/// Depth of the command and broadcast queues.
const QUEUE_DEPTH: usize = 32;

/// Notice broadcast when the idle timer fires.
const IDLE_NOTICE: &str = "Game terminated due to inactivity 💀 - Start a new one!";

/// Timeout policy and duration for session teardown.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// How long a session may sit idle before it is torn down.
    pub idle_timeout: Duration,
    /// Whether processing a command pushes the idle deadline back.
    /// The baseline policy is a fixed, non-resetting deadline.
    pub reset_on_activity: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(120),
            reset_on_activity: false,
        }
    }
}

/// How a connection came to be bound, which decides the greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOrigin {
    /// The connection opened this session.
    Create,
    /// The connection joined by identifier.
    Join,
    /// The connection was seeded into a rematch session; the rematch
    /// notice is broadcast by the old session instead of a greeting.
    Rematch,
}

/// Command processed by a session's worker.
enum SessionCommand {
    Bind {
        player: Arc<PlayerHandle>,
        origin: BindOrigin,
        reply: oneshot::Sender<Result<Mark, SessionError>>,
    },
    Move {
        player: Arc<PlayerHandle>,
        position: usize,
    },
    Chat {
        player: Arc<PlayerHandle>,
        text: String,
    },
    Rematch {
        player: Arc<PlayerHandle>,
    },
    Disconnect {
        player: Arc<PlayerHandle>,
    },
    Shutdown,
}

/// One snapshot plus the recipients captured at enqueue time.
struct Broadcast {
    message: ServerMessage,
    recipients: Vec<Arc<PlayerHandle>>,
}

/// Routing handle to a live session; what the registry stores and
/// connections send through. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// The session's identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Binds a connection to the first open slot and returns its mark.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionFull`] when both slots are taken or the
    /// connection is already bound here; [`SessionError::SessionNotFound`]
    /// when the session has been torn down.
    pub async fn bind(
        &self,
        player: Arc<PlayerHandle>,
        origin: BindOrigin,
    ) -> Result<Mark, SessionError> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(SessionCommand::Bind {
                player,
                origin,
                reply,
            })
            .await
            .map_err(|_| SessionError::SessionNotFound)?;
        answer.await.map_err(|_| SessionError::SessionNotFound)?
    }

    /// Queues a move for turn validation and application.
    pub async fn submit_move(
        &self,
        player: Arc<PlayerHandle>,
        position: usize,
    ) -> Result<(), SessionError> {
        self.send(SessionCommand::Move { player, position }).await
    }

    /// Queues a chat line for broadcast; permitted in any state.
    pub async fn submit_chat(
        &self,
        player: Arc<PlayerHandle>,
        text: String,
    ) -> Result<(), SessionError> {
        self.send(SessionCommand::Chat { player, text }).await
    }

    /// Marks the connection ready for a rematch.
    pub async fn request_rematch(&self, player: Arc<PlayerHandle>) -> Result<(), SessionError> {
        self.send(SessionCommand::Rematch { player }).await
    }

    /// Clears the connection's slot after its transport closed.
    pub async fn disconnect(&self, player: Arc<PlayerHandle>) -> Result<(), SessionError> {
        self.send(SessionCommand::Disconnect { player }).await
    }

    /// Asks the worker to tear the session down.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Shutdown).await
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::SessionNotFound)
    }
}

/// A bound player slot.
struct Slot {
    player: Arc<PlayerHandle>,
    rematch: bool,
}

impl Slot {
    fn new(player: Arc<PlayerHandle>) -> Self {
        Self {
            player,
            rematch: false,
        }
    }
}

/// Session state, owned exclusively by the command worker.
pub(crate) struct Session {
    id: SessionId,
    board: Board,
    player_x: Option<Slot>,
    player_o: Option<Slot>,
    over: bool,
    winner: Option<Mark>,
    rematch_id: Option<SessionId>,
    broadcasts: mpsc::Sender<Broadcast>,
    fan_out: JoinHandle<()>,
    registry: Registry,
    config: SessionConfig,
}

impl Session {
    /// Spawns the command worker and fan-out worker for a fresh
    /// session and returns its routing handle.
    pub(crate) fn launch(
        id: SessionId,
        registry: Registry,
        config: SessionConfig,
    ) -> SessionHandle {
        let (commands, command_queue) = mpsc::channel(QUEUE_DEPTH);
        let (broadcasts, broadcast_queue) = mpsc::channel(QUEUE_DEPTH);

        let fan_out = tokio::spawn(Self::run_fan_out(broadcast_queue));
        let session = Self {
            id: id.clone(),
            board: Board::new(),
            player_x: None,
            player_o: None,
            over: false,
            winner: None,
            rematch_id: None,
            broadcasts,
            fan_out,
            registry,
            config,
        };
        tokio::spawn(session.run(command_queue));

        SessionHandle { id, commands }
    }

    /// Command worker: serializes every mutation and drives the idle
    /// deadline.
    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!(session_id = %self.id, "session started");
        let idle = self.config.idle_timeout;
        let deadline = sleep(idle);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => {
                    warn!(session_id = %self.id, "idle timeout elapsed");
                    self.teardown(Some(IDLE_NOTICE)).await;
                    return;
                }
                command = commands.recv() => match command {
                    None | Some(SessionCommand::Shutdown) => {
                        info!(session_id = %self.id, "session shutting down");
                        self.teardown(None).await;
                        return;
                    }
                    Some(command) => {
                        self.handle(command).await;
                        if self.config.reset_on_activity {
                            deadline.as_mut().reset(Instant::now() + idle);
                        }
                    }
                }
            }
        }
    }

    /// Fan-out worker: personalizes and delivers each snapshot.
    /// Exits when the command worker drops the broadcast sender.
    async fn run_fan_out(mut queue: mpsc::Receiver<Broadcast>) {
        while let Some(broadcast) = queue.recv().await {
            for recipient in &broadcast.recipients {
                recipient.deliver(broadcast.message.clone());
            }
        }
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Bind {
                player,
                origin,
                reply,
            } => {
                let result = self.bind(player, origin).await;
                let _ = reply.send(result);
            }
            SessionCommand::Move { player, position } => self.submit_move(&player, position).await,
            SessionCommand::Chat { player, text } => self.submit_chat(&player, text).await,
            SessionCommand::Rematch { player } => self.request_rematch(&player).await,
            SessionCommand::Disconnect { player } => self.disconnect(&player).await,
            SessionCommand::Shutdown => unreachable!("handled by the worker loop"),
        }
    }

    /// Assigns the first open slot, X first, and greets the room.
    #[instrument(skip_all, fields(session_id = %self.id, origin = ?origin))]
    async fn bind(
        &mut self,
        player: Arc<PlayerHandle>,
        origin: BindOrigin,
    ) -> Result<Mark, SessionError> {
        if self.mark_of(&player).is_some() {
            warn!("connection tried to bind twice");
            return Err(SessionError::SessionFull);
        }

        let mark = if self.player_x.is_none() {
            self.player_x = Some(Slot::new(player.clone()));
            Mark::X
        } else if self.player_o.is_none() {
            self.player_o = Some(Slot::new(player.clone()));
            Mark::O
        } else {
            warn!("session already has two players");
            return Err(SessionError::SessionFull);
        };

        player.bind_to(self.id.clone(), mark);
        info!(%mark, "player bound");

        match origin {
            BindOrigin::Create => {
                self.send_to(
                    &player,
                    MessageType::Info,
                    format!("Created game (id={})", self.id),
                )
                .await;
            }
            BindOrigin::Join => {
                let greeting = match mark {
                    Mark::X => "You've joined the game! Share this page with someone to play against",
                    Mark::O => "You've joined the game! Let's go!",
                };
                self.send_to(&player, MessageType::Info, greeting).await;
                if let Some(peer) = self.counterpart(mark) {
                    self.send_to(
                        &peer,
                        MessageType::Info,
                        format!("{mark} has joined the game, let's go!"),
                    )
                    .await;
                }
            }
            BindOrigin::Rematch => {}
        }

        Ok(mark)
    }

    /// Validates and applies one move, then broadcasts the result.
    /// Rejections go to the offending connection only and never
    /// mutate the board.
    #[instrument(skip_all, fields(session_id = %self.id, position = position))]
    async fn submit_move(&mut self, player: &Arc<PlayerHandle>, position: usize) {
        let Some(mark) = self.mark_of(player) else {
            warn!("move from a connection not bound to this session");
            self.send_to(player, MessageType::Error, "you're not part of this game")
                .await;
            return;
        };

        if self.player_x.is_none() || self.player_o.is_none() {
            self.send_to(player, MessageType::Warning, "Wait for all players to join!")
                .await;
            return;
        }
        if self.over {
            warn!(%mark, "move after terminal state");
            self.send_to(player, MessageType::Error, GameError::GameOver.to_string())
                .await;
            return;
        }
        if mark != self.board.current_mover() {
            warn!(%mark, "move out of turn");
            self.send_to(player, MessageType::Error, GameError::NotYourTurn.to_string())
                .await;
            return;
        }

        match self.board.apply(position, mark) {
            Err(error) => {
                warn!(%mark, %error, "move rejected");
                self.send_to(player, MessageType::Error, error.to_string())
                    .await;
            }
            Ok(MoveOutcome::Win) => {
                self.over = true;
                self.winner = Some(mark);
                info!(%mark, board = %self.board.display(), "game won");
                self.broadcast(MessageType::Info, format!("{mark} has won!"))
                    .await;
            }
            Ok(MoveOutcome::Continue) if self.board.is_full() => {
                self.over = true;
                info!(board = %self.board.display(), "game drawn");
                self.broadcast(MessageType::Info, "Game over! It's a draw 😔")
                    .await;
            }
            Ok(MoveOutcome::Continue) => {
                debug!(%mark, board = %self.board.display(), "move applied");
                self.broadcast(MessageType::Info, "").await;
            }
        }
    }

    /// Relays a chat line to both players; no state change, allowed
    /// in any state including terminal.
    #[instrument(skip_all, fields(session_id = %self.id))]
    async fn submit_chat(&mut self, player: &Arc<PlayerHandle>, text: String) {
        if self.mark_of(player).is_none() {
            self.send_to(player, MessageType::Error, "you're not part of this game")
                .await;
            return;
        }
        self.broadcast(MessageType::Chat, text).await;
    }

    /// Marks the requester ready; spawns exactly one rematch session
    /// once both bound players are ready. Idempotent afterwards.
    #[instrument(skip_all, fields(session_id = %self.id))]
    async fn request_rematch(&mut self, player: &Arc<PlayerHandle>) {
        let Some(mark) = self.mark_of(player) else {
            self.send_to(player, MessageType::Error, "you're not part of this game")
                .await;
            return;
        };

        match mark {
            Mark::X => {
                if let Some(slot) = self.player_x.as_mut() {
                    slot.rematch = true;
                }
            }
            Mark::O => {
                if let Some(slot) = self.player_o.as_mut() {
                    slot.rematch = true;
                }
            }
        }

        let both_ready = matches!(&self.player_x, Some(slot) if slot.rematch)
            && matches!(&self.player_o, Some(slot) if slot.rematch);
        if !both_ready || self.rematch_id.is_some() {
            debug!(%mark, both_ready, "rematch request recorded");
            return;
        }

        // The requester is seeded as first mover of the new session;
        // the counterpart joins it via the broadcast rematch_id.
        match self
            .registry
            .create_seeded(player.clone(), BindOrigin::Rematch)
            .await
        {
            Ok(next) => {
                info!(rematch_id = %next.id(), "rematch session spawned");
                self.rematch_id = Some(next.id().clone());
                self.broadcast(MessageType::Info, "Rematch is on! A new game is ready")
                    .await;
            }
            Err(error) => {
                warn!(%error, "failed to spawn rematch session");
                self.send_to(player, MessageType::Error, error.to_string())
                    .await;
            }
        }
    }

    /// Clears the connection's slot. The session stays registered so
    /// the identifier can be rejoined until the idle timer fires.
    #[instrument(skip_all, fields(session_id = %self.id))]
    async fn disconnect(&mut self, player: &Arc<PlayerHandle>) {
        let mark = match (&self.player_x, &self.player_o) {
            (Some(slot), _) if PlayerHandle::same_as(&slot.player, player) => {
                self.player_x = None;
                Mark::X
            }
            (_, Some(slot)) if PlayerHandle::same_as(&slot.player, player) => {
                self.player_o = None;
                Mark::O
            }
            _ => return,
        };

        info!(%mark, "player left");
        if !self.over {
            self.broadcast(MessageType::Info, format!("{mark} has left the game..."))
                .await;
        }
    }

    /// Tears the session down: optionally broadcasts a final notice,
    /// drains the fan-out queue, force-closes bound connections, and
    /// removes the registry entry. Safe to race against an entry that
    /// was already evicted.
    async fn teardown(self, notice: Option<&str>) {
        if let Some(text) = notice {
            self.broadcast(MessageType::Warning, text).await;
        }

        let Session {
            id,
            player_x,
            player_o,
            broadcasts,
            fan_out,
            registry,
            ..
        } = self;

        // Dropping the sender lets the fan-out worker drain and exit;
        // awaiting it keeps the final notice ahead of the close.
        drop(broadcasts);
        let _ = fan_out.await;

        for slot in [player_x, player_o].into_iter().flatten() {
            slot.player.close();
        }
        registry.remove(&id);
        info!(session_id = %id, "session torn down");
    }

    /// The mark the given connection holds in this session, if any.
    fn mark_of(&self, player: &Arc<PlayerHandle>) -> Option<Mark> {
        match (&self.player_x, &self.player_o) {
            (Some(slot), _) if PlayerHandle::same_as(&slot.player, player) => Some(Mark::X),
            (_, Some(slot)) if PlayerHandle::same_as(&slot.player, player) => Some(Mark::O),
            _ => None,
        }
    }

    /// The handle bound opposite the given mark, if any.
    fn counterpart(&self, mark: Mark) -> Option<Arc<PlayerHandle>> {
        let slot = match mark.opponent() {
            Mark::X => self.player_x.as_ref(),
            Mark::O => self.player_o.as_ref(),
        };
        slot.map(|slot| slot.player.clone())
    }

    /// All currently bound handles.
    fn players(&self) -> Vec<Arc<PlayerHandle>> {
        [self.player_x.as_ref(), self.player_o.as_ref()]
            .into_iter()
            .flatten()
            .map(|slot| slot.player.clone())
            .collect()
    }

    /// Builds the outbound snapshot of this session's state.
    fn snapshot(&self, message_type: MessageType, message: String) -> ServerMessage {
        ServerMessage {
            game_id: self.id.clone(),
            rematch_id: self.rematch_id.clone().unwrap_or_default(),
            board: *self.board.cells(),
            current_player: self.board.current_mover().into(),
            mark: crate::game::Cell::Empty,
            message,
            message_type,
            game_over: self.over,
            winner: self.winner.into(),
        }
    }

    /// Enqueues a snapshot for every bound player.
    async fn broadcast(&self, message_type: MessageType, message: impl Into<String>) {
        self.enqueue(message_type, message.into(), self.players())
            .await;
    }

    /// Enqueues a snapshot for one recipient only.
    async fn send_to(
        &self,
        player: &Arc<PlayerHandle>,
        message_type: MessageType,
        message: impl Into<String>,
    ) {
        self.enqueue(message_type, message.into(), vec![player.clone()])
            .await;
    }

    async fn enqueue(
        &self,
        message_type: MessageType,
        message: String,
        recipients: Vec<Arc<PlayerHandle>>,
    ) {
        let broadcast = Broadcast {
            message: self.snapshot(message_type, message),
            recipients,
        };
        if self.broadcasts.send(broadcast).await.is_err() {
            debug!(session_id = %self.id, "broadcast queue closed");
        }
    }
}
