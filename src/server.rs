//! HTTP shell: websocket upgrade, static client, and the per-
//! connection read/write pumps.
//!
//! Everything here is transport plumbing. Decoded commands are routed
//! into the registry or the player's current session; all game logic
//! lives behind those queues.

use crate::message::{ClientCommand, Command, MessageType};
use crate::player::{Outbound, PlayerHandle};
use crate::registry::Registry;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

/// Builds the application router: the websocket endpoint at `/play`,
/// the static client under `/static`, and `index.html` at the root.
pub fn router(registry: Registry, static_dir: &Path) -> Router {
    Router::new()
        .route("/play", get(upgrade_handler))
        .nest_service("/static", ServeDir::new(static_dir))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// Accepts the websocket handshake and hands the socket to the
/// connection pumps.
async fn upgrade_handler(State(registry): State<Registry>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_connection(socket, registry))
}

/// Owns one client connection: splits the socket, spawns the writer,
/// runs the read loop, and performs disconnect cleanup exactly once
/// when the transport closes.
#[instrument(skip_all)]
async fn serve_connection(socket: WebSocket, registry: Registry) {
    info!("client connected");
    let (sink, stream) = socket.split();
    let (outbound, outbound_queue) = mpsc::unbounded_channel();
    let player = Arc::new(PlayerHandle::new(outbound));

    let writer = tokio::spawn(pump_outbound(sink, outbound_queue));
    pump_inbound(stream, &player, &registry).await;

    // Transport is gone: clear our slot in whichever session we were
    // last bound to. The session may already be torn down.
    if let Some(id) = player.session_id() {
        if let Some(session) = registry.lookup(&id) {
            let _ = session.disconnect(player.clone()).await;
        }
    }
    player.close();
    let _ = writer.await;
    info!("client disconnected");
}

/// Writer pump: serializes queued messages onto the socket until the
/// queue closes, a write fails, or a close is requested.
async fn pump_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(outbound) = queue.recv().await {
        match outbound {
            Outbound::Message(message) => match serde_json::to_string(&message) {
                Ok(payload) => {
                    if sink.send(Message::Text(payload.into())).await.is_err() {
                        debug!("write failed, stopping writer");
                        return;
                    }
                }
                Err(error) => warn!(%error, "failed to encode outbound message"),
            },
            Outbound::Close => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
        }
    }
}

/// Read pump: decodes frames and dispatches them until the client
/// goes away. Undecodable frames earn an error reply; the connection
/// stays open.
async fn pump_inbound(
    mut stream: SplitStream<WebSocket>,
    player: &Arc<PlayerHandle>,
    registry: &Registry,
) {
    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(error) => {
                debug!(%error, "read failed, closing connection");
                return;
            }
        };
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => return,
            // Pings are answered by axum; binary frames are not part
            // of the protocol.
            _ => continue,
        };

        match serde_json::from_str::<ClientCommand>(&text) {
            Ok(command) => dispatch(command, player, registry).await,
            Err(error) => {
                debug!(%error, "malformed frame");
                player.reply(MessageType::Error, "Invalid command");
            }
        }
    }
}

/// Routes one decoded command: CREATE and JOIN go to the registry,
/// everything else into the player's current session.
async fn dispatch(command: ClientCommand, player: &Arc<PlayerHandle>, registry: &Registry) {
    match command.command {
        Command::Create => {
            if let Err(error) = registry.create(player.clone()).await {
                warn!(%error, "create failed");
                player.reply(MessageType::Error, error.to_string());
            }
        }
        Command::Join => {
            let Some(game_id) = command.game_id else {
                player.reply(MessageType::Error, "missing game_id");
                return;
            };
            if let Err(error) = registry.join(&game_id, player.clone()).await {
                player.reply(MessageType::Error, error.to_string());
            }
        }
        Command::Play | Command::Talk | Command::Rematch => {
            let session = player
                .session_id()
                .and_then(|id| registry.lookup(&id));
            let Some(session) = session else {
                player.reply(MessageType::Error, "join or create a game first");
                return;
            };

            let sent = match command.command {
                Command::Play => {
                    let Some(position) = command.position else {
                        player.reply(MessageType::Error, "missing position");
                        return;
                    };
                    session.submit_move(player.clone(), position).await
                }
                Command::Talk => {
                    session
                        .submit_chat(player.clone(), command.message.unwrap_or_default())
                        .await
                }
                Command::Rematch => session.request_rematch(player.clone()).await,
                Command::Create | Command::Join => unreachable!("handled above"),
            };
            if let Err(error) = sent {
                player.reply(MessageType::Error, error.to_string());
            }
        }
    }
}
