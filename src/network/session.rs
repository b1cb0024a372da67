//! Match Session Management
//!
//! Each world match runs as its own task that exclusively owns its
//! [`WorldMatch`]. Joins, leaves, inbound data and control requests reach it
//! through one ordered queue; inbound data is buffered and handed to the next
//! tick as a batch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::messages::{MatchData, MatchMessage};
use crate::game::state::{OwnerKey, Presence, WorldState};
use crate::game::world::{Broadcast, JoinDecision, MatchError, Recipients, WorldMatch};
use crate::storage::StorageBackend;

/// Unique match identifier.
pub type MatchId = uuid::Uuid;

/// Queue depth of a session's command channel.
const COMMAND_BUFFER: usize = 1024;

/// Requests handled by a session task, in arrival order.
#[derive(Debug)]
pub enum SessionCommand {
    /// Join attempt; joins immediately when accepted.
    Join {
        /// Joining participant.
        presence: Presence,
        /// Decision.
        reply: oneshot::Sender<JoinDecision>,
    },
    /// Participant left.
    Leave {
        /// Departing participant.
        user_id: OwnerKey,
    },
    /// Inbound match data for the next tick.
    Data(MatchData),
    /// Control-plane signal.
    Signal {
        /// Signal payload.
        data: String,
        /// Echo.
        reply: oneshot::Sender<String>,
    },
    /// Save everything and stop.
    Terminate {
        /// Grace period granted by the host.
        grace_seconds: u32,
        /// Outcome of the final saves.
        reply: oneshot::Sender<Result<(), MatchError>>,
    },
}

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session task has stopped.
    #[error("session closed")]
    Closed,

    /// The match reported an error.
    #[error(transparent)]
    Match(#[from] MatchError),
}

/// Cloneable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: MatchId,
    label: String,
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Match identifier.
    pub fn id(&self) -> MatchId {
        self.id
    }

    /// Match label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the session task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Attempt to join; accepted presences are in the world when this returns.
    pub async fn join(&self, presence: Presence) -> Result<JoinDecision, SessionError> {
        self.request(|reply| SessionCommand::Join { presence, reply }).await
    }

    /// Announce that a participant left.
    pub async fn leave(&self, user_id: OwnerKey) -> Result<(), SessionError> {
        self.tx
            .send(SessionCommand::Leave { user_id })
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Queue inbound data for the next tick.
    pub async fn send(&self, data: MatchData) -> Result<(), SessionError> {
        self.tx
            .send(SessionCommand::Data(data))
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Send a control signal and wait for the echo.
    pub async fn signal(&self, data: String) -> Result<String, SessionError> {
        self.request(|reply| SessionCommand::Signal { data, reply }).await
    }

    /// Stop the session once every position has been written.
    pub async fn terminate(&self, grace_seconds: u32) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Terminate { grace_seconds, reply })
            .await?
            .map_err(SessionError::from)
    }
}

/// Start a new world match task.
pub fn spawn_session(storage: Arc<dyn StorageBackend>) -> (SessionHandle, JoinHandle<()>) {
    let id = uuid::Uuid::new_v4();
    let mut world = WorldMatch::new(storage);
    let init = world.init();

    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let handle = SessionHandle {
        id,
        label: init.label,
        tx,
    };

    let task = tokio::spawn(run_session(id, world, init.tick_rate, rx));
    info!("Match {} started at {} Hz", id, init.tick_rate);

    (handle, task)
}

/// The session loop. Ticks at a fixed rate; a slow tick delays the next one
/// instead of bursting to catch up.
async fn run_session(
    id: MatchId,
    mut world: WorldMatch,
    tick_rate: u32,
    mut rx: mpsc::Receiver<SessionCommand>,
) {
    let tick_duration = Duration::from_micros(1_000_000 / tick_rate.max(1) as u64);
    let mut tick_interval = interval(tick_duration);
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut batch: Vec<MatchData> = Vec::new();
    let mut unsaved: Vec<OwnerKey> = Vec::new();

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                if !unsaved.is_empty() {
                    let retry = std::mem::take(&mut unsaved);
                    unsaved = leave(&mut world, &retry).await;
                }

                let out = world.tick(std::mem::take(&mut batch)).await;
                deliver(world.state(), out);
            }
            cmd = rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("All handles to match {} dropped", id);
                    if let Err(e) = world.terminate(0).await {
                        warn!("Match {} stopped with unsaved players: {}", id, e);
                    }
                    break;
                };

                match cmd {
                    SessionCommand::Join { presence, reply } => {
                        let decision = world.join_attempt(&presence.user_id);
                        if decision.is_accepted() {
                            world.join(vec![presence]);
                        }
                        let _ = reply.send(decision);
                    }
                    SessionCommand::Leave { user_id } => {
                        let failed = leave(&mut world, &[user_id]).await;
                        unsaved.extend(failed);
                    }
                    SessionCommand::Data(data) => batch.push(data),
                    SessionCommand::Signal { data, reply } => {
                        let _ = reply.send(world.signal(data));
                    }
                    SessionCommand::Terminate { grace_seconds, reply } => {
                        let result = world.terminate(grace_seconds).await;
                        let _ = reply.send(result);
                        break;
                    }
                }
            }
        }
    }

    info!("Match {} stopped after {} ticks", id, world.current_tick());
}

/// Leave, returning the participants whose save failed.
async fn leave(world: &mut WorldMatch, departed: &[OwnerKey]) -> Vec<OwnerKey> {
    match world.leave(departed).await {
        Ok(()) => Vec::new(),
        Err(MatchError::Persistence { failed, source }) => {
            warn!("Will retry saving {} player(s): {}", failed.len(), source);
            failed
        }
    }
}

/// Hand a tick's broadcasts to the participants' connections.
fn deliver(state: &WorldState, broadcasts: Vec<Broadcast>) {
    for broadcast in broadcasts {
        let Broadcast {
            op_code,
            data,
            recipients,
            sender,
        } = broadcast;
        let message = MatchMessage { op_code, data, sender };

        match recipients {
            Recipients::All => {
                for presence in state.presences() {
                    send_to(presence, message.clone());
                }
            }
            Recipients::Only(owners) => {
                for owner in &owners {
                    if let Some(presence) = state.presence(owner) {
                        send_to(presence, message.clone());
                    }
                }
            }
        }
    }
}

fn send_to(presence: &Presence, message: MatchMessage) {
    match presence.sender.try_send(message) {
        Ok(()) => {}
        Err(TrySendError::Full(dropped)) => {
            warn!(
                "Outbound buffer full for {}, dropping opcode {}",
                presence.user_id, dropped.op_code
            );
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Connection of {} already closed", presence.user_id);
        }
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Manages all running world matches.
pub struct SessionManager {
    /// Running sessions.
    sessions: RwLock<BTreeMap<MatchId, SessionHandle>>,
    /// Storage shared by every match.
    storage: Arc<dyn StorageBackend>,
}

impl SessionManager {
    /// Create a session manager.
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            storage,
        }
    }

    /// Storage shared by every match.
    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Start a new match.
    pub async fn create_session(&self) -> SessionHandle {
        let (handle, _task) = spawn_session(self.storage.clone());
        self.sessions.write().await.insert(handle.id(), handle.clone());
        handle
    }

    /// Get a running match.
    pub async fn get_session(&self, id: &MatchId) -> Option<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(id)
            .filter(|h| !h.is_closed())
            .cloned()
    }

    /// Return the running world, starting one if there is none.
    pub async fn find_or_create(&self) -> SessionHandle {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, h| !h.is_closed());

        if let Some(handle) = sessions.values().next() {
            debug!("Found world {}", handle.id());
            return handle.clone();
        }

        let (handle, _task) = spawn_session(self.storage.clone());
        sessions.insert(handle.id(), handle.clone());
        info!("Created world {}", handle.id());
        handle
    }

    /// Number of tracked matches.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Forget matches whose task has stopped.
    pub async fn cleanup(&self) {
        self.sessions.write().await.retain(|_, h| !h.is_closed());
    }

    /// Terminate every match, waiting for their final saves.
    pub async fn terminate_all(&self, grace_seconds: u32) {
        let sessions = std::mem::take(&mut *self.sessions.write().await);

        for (id, handle) in sessions {
            match handle.terminate(grace_seconds).await {
                Ok(()) => info!("Match {} terminated", id),
                Err(e) => warn!("Match {} terminated with errors: {}", id, e),
            }
        }
    }
}
