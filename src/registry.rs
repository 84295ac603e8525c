//! Process-wide directory of live sessions.
//!
//! The registry maps short random identifiers to session handles
//! behind one coarse mutex; contention is limited to session
//! creation, join, and eviction, never per-move traffic. It is
//! constructed once at startup and cloned into every connection
//! handler, never reached through a global.

use crate::error::SessionError;
use crate::game::Mark;
use crate::player::PlayerHandle;
use crate::session::{BindOrigin, Session, SessionConfig, SessionHandle, SessionId};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// Directory of live sessions. Cheap to clone; all clones share the
/// same mapping.
#[derive(Debug, Clone)]
pub struct Registry {
    sessions: Arc<Mutex<HashMap<SessionId, SessionHandle>>>,
    config: SessionConfig,
}

impl Registry {
    /// Creates an empty registry applying `config` to every session.
    #[instrument]
    pub fn new(config: SessionConfig) -> Self {
        info!(?config, "creating session registry");
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Opens a new session and binds the requester as first mover.
    ///
    /// # Errors
    ///
    /// [`SessionError::IdGeneration`] if the system refuses random
    /// bytes; the operation aborts without side effects.
    pub async fn create(&self, player: Arc<PlayerHandle>) -> Result<SessionHandle, SessionError> {
        self.create_seeded(player, BindOrigin::Create).await
    }

    /// Opens a new session seeded with `player` as first mover,
    /// greeting per `origin`. Used directly by sessions spawning a
    /// rematch.
    #[instrument(skip_all)]
    pub(crate) async fn create_seeded(
        &self,
        player: Arc<PlayerHandle>,
        origin: BindOrigin,
    ) -> Result<SessionHandle, SessionError> {
        let handle = {
            let mut sessions = self.sessions.lock().unwrap();
            // Regenerate on the (unlikely) identifier collision.
            let id = loop {
                let id = generate_game_id()?;
                if !sessions.contains_key(&id) {
                    break id;
                }
                debug!(session_id = %id, "identifier collision, regenerating");
            };
            let handle = Session::launch(id.clone(), self.clone(), self.config);
            sessions.insert(id, handle.clone());
            handle
        };

        info!(session_id = %handle.id(), "session created");
        // A freshly launched session always has an open first slot.
        handle.bind(player, origin).await?;
        Ok(handle)
    }

    /// Binds a connection to an existing session.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionNotFound`] for an unknown or torn-down
    /// identifier, [`SessionError::SessionFull`] when both slots are
    /// taken.
    #[instrument(skip(self, player))]
    pub async fn join(
        &self,
        id: &str,
        player: Arc<PlayerHandle>,
    ) -> Result<(SessionHandle, Mark), SessionError> {
        let handle = self.lookup(id).ok_or(SessionError::SessionNotFound)?;
        let mark = handle.bind(player, BindOrigin::Join).await?;
        info!(session_id = %id, %mark, "player joined session");
        Ok((handle, mark))
    }

    /// Looks up a live session by identifier.
    pub fn lookup(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    /// Removes a session and signals its worker to tear down. Calling
    /// this for an identifier that already vacated naturally is a
    /// no-op.
    #[instrument(skip(self))]
    pub async fn evict(&self, id: &str) {
        let handle = self.remove(id);
        match handle {
            Some(handle) => {
                warn!(session_id = %id, "evicting session");
                let _ = handle.shutdown().await;
            }
            None => debug!(session_id = %id, "evict for unknown session"),
        }
    }

    /// Drops the registry entry without signalling the worker; the
    /// worker calls this itself at the end of teardown.
    pub(crate) fn remove(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.lock().unwrap().remove(id)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

/// Generates a short URL-safe identifier from four random bytes.
///
/// # Errors
///
/// [`SessionError::IdGeneration`] when the operating system cannot
/// supply random bytes.
fn generate_game_id() -> Result<SessionId, SessionError> {
    let mut bytes = [0u8; 4];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|_| SessionError::IdGeneration)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
