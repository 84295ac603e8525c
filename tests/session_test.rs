//! Tests for session lifecycle, turn validation, rematch, and
//! idle-timeout teardown, driven through the registry and player
//! handles exactly as the websocket shell drives them.

use crosswire::{
    Cell, Mark, MessageType, Outbound, PlayerHandle, Registry, ServerMessage, SessionConfig,
    SessionError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

type Inbox = mpsc::UnboundedReceiver<Outbound>;

/// A fake connection: the handle sessions write to plus the inbox the
/// writer task would drain.
fn connect() -> (Arc<PlayerHandle>, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(PlayerHandle::new(tx)), rx)
}

fn registry() -> Registry {
    Registry::new(SessionConfig {
        idle_timeout: Duration::from_secs(5),
        reset_on_activity: false,
    })
}

/// Receives the next wire message, failing on silence or a close.
async fn recv(inbox: &mut Inbox) -> ServerMessage {
    match tokio::time::timeout(Duration::from_secs(1), inbox.recv()).await {
        Ok(Some(Outbound::Message(message))) => message,
        other => panic!("expected a message, got {other:?}"),
    }
}

/// Receives the next item expecting the transport close marker.
async fn recv_close(inbox: &mut Inbox) {
    match tokio::time::timeout(Duration::from_secs(1), inbox.recv()).await {
        Ok(Some(Outbound::Close)) => {}
        other => panic!("expected close, got {other:?}"),
    }
}

/// Creates a session with both players bound and greetings drained.
async fn paired_session(
    registry: &Registry,
) -> (
    crosswire::SessionHandle,
    (Arc<PlayerHandle>, Inbox),
    (Arc<PlayerHandle>, Inbox),
) {
    let (c1, mut rx1) = connect();
    let (c2, mut rx2) = connect();
    let session = registry.create(c1.clone()).await.expect("create session");
    registry
        .join(session.id(), c2.clone())
        .await
        .expect("join session");
    recv(&mut rx1).await; // created notice
    recv(&mut rx2).await; // join greeting
    recv(&mut rx1).await; // peer-joined notice
    (session, (c1, rx1), (c2, rx2))
}

#[tokio::test]
async fn test_create_assigns_x_and_join_assigns_o() {
    let registry = registry();
    let (c1, mut rx1) = connect();
    let session = registry.create(c1.clone()).await.expect("create session");

    assert_eq!(c1.mark(), Some(Mark::X));
    assert_eq!(c1.session_id().as_deref(), Some(session.id().as_str()));

    let created = recv(&mut rx1).await;
    assert_eq!(created.message_type, MessageType::Info);
    assert!(created.message.contains("Created game"));
    assert_eq!(&created.game_id, session.id());
    assert_eq!(created.mark, Cell::Marked(Mark::X));

    let (c2, mut rx2) = connect();
    let (_, mark) = registry
        .join(session.id(), c2.clone())
        .await
        .expect("join session");
    assert_eq!(mark, Mark::O);

    let greeting = recv(&mut rx2).await;
    assert!(greeting.message.contains("joined the game"));
    assert_eq!(greeting.mark, Cell::Marked(Mark::O));

    let notice = recv(&mut rx1).await;
    assert_eq!(notice.message_type, MessageType::Info);
    assert!(notice.message.contains("O has joined"));
}

#[tokio::test]
async fn test_third_connection_gets_session_full() {
    let registry = registry();
    let (session, _p1, _p2) = paired_session(&registry).await;

    let (c3, _rx3) = connect();
    let result = registry.join(session.id(), c3.clone()).await;
    assert!(matches!(result, Err(SessionError::SessionFull)));
    assert_eq!(c3.mark(), None);
}

#[tokio::test]
async fn test_same_connection_cannot_bind_twice() {
    let registry = registry();
    let (c1, _rx1) = connect();
    let session = registry.create(c1.clone()).await.expect("create session");

    let result = registry.join(session.id(), c1.clone()).await;
    assert!(matches!(result, Err(SessionError::SessionFull)));
}

#[tokio::test]
async fn test_join_unknown_id_fails() {
    let registry = registry();
    let (c1, _rx1) = connect();
    let result = registry.join("missing", c1).await;
    assert!(matches!(result, Err(SessionError::SessionNotFound)));
}

#[tokio::test]
async fn test_move_before_pairing_gets_warning() {
    let registry = registry();
    let (c1, mut rx1) = connect();
    let session = registry.create(c1.clone()).await.expect("create session");
    recv(&mut rx1).await; // created notice

    session.submit_move(c1, 0).await.expect("queued");
    let warning = recv(&mut rx1).await;
    assert_eq!(warning.message_type, MessageType::Warning);
    assert!(warning.message.contains("Wait for all players"));
    assert_eq!(warning.board, [Cell::Empty; 9]);
}

#[tokio::test]
async fn test_end_to_end_game_with_win() {
    let registry = registry();
    let (session, (c1, mut rx1), (c2, mut rx2)) = paired_session(&registry).await;

    // X opens at 0: both see the updated board and the turn passing.
    session.submit_move(c1.clone(), 0).await.expect("queued");
    for inbox in [&mut rx1, &mut rx2] {
        let update = recv(inbox).await;
        assert_eq!(update.message_type, MessageType::Info);
        assert_eq!(update.board[0], Cell::Marked(Mark::X));
        assert_eq!(update.current_player, Cell::Marked(Mark::O));
        assert!(!update.game_over);
    }

    // O contests the same cell: the offender alone hears about it.
    session.submit_move(c2.clone(), 0).await.expect("queued");
    let rejection = recv(&mut rx2).await;
    assert_eq!(rejection.message_type, MessageType::Error);
    assert!(rejection.message.contains("taken"));
    assert_eq!(rejection.board[0], Cell::Marked(Mark::X));
    assert!(rx1.try_recv().is_err(), "peer must not see the rejection");

    // Alternate until X completes the top row.
    for (player, pos) in [(&c2, 3), (&c1, 1), (&c2, 4)] {
        session.submit_move((*player).clone(), pos).await.expect("queued");
        recv(&mut rx1).await;
        recv(&mut rx2).await;
    }
    session.submit_move(c1.clone(), 2).await.expect("queued");
    for inbox in [&mut rx1, &mut rx2] {
        let finale = recv(inbox).await;
        assert!(finale.game_over);
        assert_eq!(finale.winner, Cell::Marked(Mark::X));
        assert!(finale.message.contains("X has won"));
    }

    // The game is terminal: any further move fails without mutation.
    session.submit_move(c2.clone(), 5).await.expect("queued");
    let over = recv(&mut rx2).await;
    assert_eq!(over.message_type, MessageType::Error);
    assert!(over.message.contains("over"));
    assert_eq!(over.board[5], Cell::Empty);
    assert!(rx1.try_recv().is_err());
}

#[tokio::test]
async fn test_out_of_turn_move_rejected() {
    let registry = registry();
    let (session, (_c1, mut rx1), (c2, mut rx2)) = paired_session(&registry).await;

    session.submit_move(c2, 4).await.expect("queued");
    let rejection = recv(&mut rx2).await;
    assert_eq!(rejection.message_type, MessageType::Error);
    assert!(rejection.message.contains("not your turn"));
    assert!(rx1.try_recv().is_err());
}

#[tokio::test]
async fn test_unbound_connection_cannot_move() {
    let registry = registry();
    let (session, (_c1, mut rx1), _p2) = paired_session(&registry).await;

    let (intruder, mut rx3) = connect();
    session.submit_move(intruder, 0).await.expect("queued");
    let rejection = recv(&mut rx3).await;
    assert_eq!(rejection.message_type, MessageType::Error);
    assert!(rx1.try_recv().is_err());
}

#[tokio::test]
async fn test_chat_reaches_both_players_any_time() {
    let registry = registry();
    let (session, (c1, mut rx1), (_c2, mut rx2)) = paired_session(&registry).await;

    session
        .submit_chat(c1.clone(), "gg incoming".into())
        .await
        .expect("queued");
    for inbox in [&mut rx1, &mut rx2] {
        let chat = recv(inbox).await;
        assert_eq!(chat.message_type, MessageType::Chat);
        assert_eq!(chat.message, "gg incoming");
    }
}

#[tokio::test]
async fn test_rematch_spawns_exactly_one_session() {
    let registry = registry();
    let (session, (c1, mut rx1), (c2, mut rx2)) = paired_session(&registry).await;

    // X wins quickly at {0, 1, 2}.
    for (player, pos) in [(&c1, 0), (&c2, 3), (&c1, 1), (&c2, 4), (&c1, 2)] {
        session.submit_move((*player).clone(), pos).await.expect("queued");
        recv(&mut rx1).await;
        recv(&mut rx2).await;
    }

    session.request_rematch(c1.clone()).await.expect("queued");
    session.request_rematch(c2.clone()).await.expect("queued");

    let notice = recv(&mut rx1).await;
    assert!(!notice.rematch_id.is_empty());
    assert_ne!(&notice.rematch_id, session.id());
    recv(&mut rx2).await;
    assert_eq!(registry.session_count(), 2);

    // The second requester was seeded into the fresh session.
    assert_eq!(c2.session_id().as_deref(), Some(notice.rematch_id.as_str()));
    assert_eq!(c2.mark(), Some(Mark::X));

    // Further requests are a no-op; flush with a chat to make sure
    // the command was processed before counting.
    session.request_rematch(c1.clone()).await.expect("queued");
    session.submit_chat(c1.clone(), "again!".into()).await.expect("queued");
    recv(&mut rx1).await;
    recv(&mut rx2).await;
    assert_eq!(registry.session_count(), 2);

    // The counterpart can join the rematch session by its id.
    let (c3, mut rx3) = connect();
    let (_, mark) = registry
        .join(&notice.rematch_id, c3)
        .await
        .expect("join rematch");
    assert_eq!(mark, Mark::O);
    recv(&mut rx3).await;
}

#[tokio::test]
async fn test_disconnect_notifies_peer_and_frees_slot() {
    let registry = registry();
    let (session, (_c1, mut rx1), (c2, _rx2)) = paired_session(&registry).await;

    session.disconnect(c2).await.expect("queued");
    let notice = recv(&mut rx1).await;
    assert_eq!(notice.message_type, MessageType::Info);
    assert!(notice.message.contains("O has left"));

    // The identifier is still joinable; the slot is open again.
    let (c3, _rx3) = connect();
    let (_, mark) = registry
        .join(session.id(), c3)
        .await
        .expect("rejoin after disconnect");
    assert_eq!(mark, Mark::O);
}

#[tokio::test]
async fn test_idle_timeout_tears_session_down() {
    let registry = Registry::new(SessionConfig {
        idle_timeout: Duration::from_millis(100),
        reset_on_activity: false,
    });
    let (c1, mut rx1) = connect();
    let session = registry.create(c1.clone()).await.expect("create session");
    let id = session.id().clone();
    recv(&mut rx1).await; // created notice

    tokio::time::sleep(Duration::from_millis(400)).await;

    let warning = recv(&mut rx1).await;
    assert_eq!(warning.message_type, MessageType::Warning);
    assert!(warning.message.contains("inactivity"));
    recv_close(&mut rx1).await;

    assert!(registry.lookup(&id).is_none());
    assert_eq!(registry.session_count(), 0);

    let (c2, _rx2) = connect();
    let result = registry.join(&id, c2).await;
    assert!(matches!(result, Err(SessionError::SessionNotFound)));
}

#[tokio::test]
async fn test_activity_extends_deadline_when_configured() {
    let registry = Registry::new(SessionConfig {
        idle_timeout: Duration::from_millis(300),
        reset_on_activity: true,
    });
    let (c1, mut rx1) = connect();
    let session = registry.create(c1.clone()).await.expect("create session");
    recv(&mut rx1).await; // created notice

    // Keep poking the session past the original deadline.
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        session
            .submit_chat(c1.clone(), "still here".into())
            .await
            .expect("queued");
        recv(&mut rx1).await;
    }
    assert_eq!(registry.session_count(), 1);
}

#[tokio::test]
async fn test_evict_closes_connections_and_is_idempotent() {
    let registry = registry();
    let (session, (_c1, mut rx1), (_c2, mut rx2)) = paired_session(&registry).await;
    let id = session.id().clone();

    registry.evict(&id).await;
    recv_close(&mut rx1).await;
    recv_close(&mut rx2).await;
    assert_eq!(registry.session_count(), 0);

    // Racing a second evict against the finished teardown is safe.
    registry.evict(&id).await;
    assert!(registry.lookup(&id).is_none());
}
