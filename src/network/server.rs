//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//! Handles identity, RPCs, and routing between clients and world matches.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::game::messages::{MatchData, MatchMessage};
use crate::game::state::{OwnerKey, Presence};
use crate::game::world::JoinDecision;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
use crate::network::rpc;
use crate::network::session::{SessionError, SessionHandle, SessionManager};
use crate::storage::StorageBackend;

/// How long a closing connection may spend flushing its last messages.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Connected client, as seen by the server.
struct ConnectedClient {
    /// Declared identity (after hello).
    user_id: Option<OwnerKey>,
    /// Connection time.
    connected_at: Instant,
}

/// Per-connection state owned by the connection task.
struct Connection {
    addr: SocketAddr,
    session_id: uuid::Uuid,
    /// Owner key and username from hello.
    identity: Option<(OwnerKey, String)>,
    /// Match this connection has joined.
    joined: Option<SessionHandle>,
    /// Direct replies.
    msg_tx: mpsc::Sender<ServerMessage>,
    /// Match broadcasts; cloned into the presence on join.
    match_tx: mpsc::Sender<MatchMessage>,
}

impl Connection {
    async fn send(&self, msg: ServerMessage) {
        let _ = self.msg_tx.send(msg).await;
    }

    async fn send_error(&self, code: ErrorCode, message: impl Into<String>) {
        self.send(ServerMessage::Error(ServerError::new(code, message)))
            .await;
    }

    /// Leave the joined match, if any.
    async fn leave_match(&mut self) {
        let (Some(handle), Some((owner, _))) = (self.joined.take(), &self.identity) else {
            return;
        };

        match handle.leave(owner.clone()).await {
            Ok(()) => debug!("{} left match {}", owner, handle.id()),
            Err(e) => debug!("Match {} already gone for {}: {}", handle.id(), owner, e),
        }
    }
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Session manager.
    sessions: Arc<SessionManager>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, storage: Arc<dyn StorageBackend>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            sessions: Arc::new(SessionManager::new(storage)),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind and run the server until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server on an already bound listener.
    ///
    /// On shutdown every match is terminated before this returns.
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!(
            "World server v{} listening on {}",
            self.config.version,
            listener.local_addr()?
        );

        let cleanup_sessions = self.sessions.clone();
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_sessions).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr).await;
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        self.sessions
            .terminate_all(self.config.terminate_grace_secs)
            .await;

        Ok(())
    }

    /// Handle a new WebSocket connection.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let sessions = self.sessions.clone();
        let buffer = self.config.outbound_buffer;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        // Register before spawning so the connection limit sees it
        clients.write().await.insert(
            addr,
            ConnectedClient {
                user_id: None,
                connected_at: Instant::now(),
            },
        );

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    clients.write().await.remove(&addr);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(buffer);
            let (match_tx, mut match_rx) = mpsc::channel::<MatchMessage>(buffer);

            // Spawn message sender task
            let mut sender_task = tokio::spawn(async move {
                loop {
                    let msg = tokio::select! {
                        msg = msg_rx.recv() => match msg {
                            Some(msg) => msg,
                            None => break,
                        },
                        Some(msg) = match_rx.recv() => ServerMessage::from(msg),
                    };

                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            let mut conn = Connection {
                addr,
                session_id: uuid::Uuid::new_v4(),
                identity: None,
                joined: None,
                msg_tx,
                match_tx,
            };

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        conn.send_error(ErrorCode::InvalidInput, "Invalid message format").await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(&mut conn, client_msg, &clients, &sessions).await;
                            }
                            Some(Ok(Message::Binary(_))) => {
                                conn.send_error(ErrorCode::InvalidInput, "Binary frames are not supported").await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        conn.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            conn.leave_match().await;
            drop(conn);
            if tokio::time::timeout(FLUSH_TIMEOUT, &mut sender_task).await.is_err() {
                sender_task.abort();
            }

            if let Some(client) = clients.write().await.remove(&addr) {
                info!(
                    "Client {} ({}) cleaned up after {:?}",
                    addr,
                    client
                        .user_id
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "anonymous".to_string()),
                    client.connected_at.elapsed()
                );
            }
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        conn: &mut Connection,
        msg: ClientMessage,
        clients: &RwLock<BTreeMap<SocketAddr, ConnectedClient>>,
        sessions: &SessionManager,
    ) {
        match msg {
            ClientMessage::Hello { user_id, username } => {
                Self::handle_hello(conn, user_id, username, clients).await;
            }
            ClientMessage::Ping { timestamp } => {
                conn.send(ServerMessage::Pong {
                    timestamp,
                    server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
                })
                .await;
            }
            _ if conn.identity.is_none() => {
                conn.send_error(ErrorCode::NotIdentified, "Send hello first").await;
            }
            ClientMessage::Rpc { id, payload } => {
                let reply = match rpc::dispatch(sessions, &id, payload.as_deref()).await {
                    Ok(payload) => ServerMessage::RpcResult {
                        id,
                        payload: Some(payload),
                        error: None,
                    },
                    Err(e) => {
                        warn!("RPC {} from {} failed: {}", id, conn.addr, e);
                        ServerMessage::RpcResult {
                            id,
                            payload: None,
                            error: Some(e.to_string()),
                        }
                    }
                };
                conn.send(reply).await;
            }
            ClientMessage::MatchJoin { match_id } => {
                Self::handle_match_join(conn, &match_id, sessions).await;
            }
            ClientMessage::MatchData { op_code, data } => {
                Self::handle_match_data(conn, op_code, data).await;
            }
            ClientMessage::MatchLeave => {
                if conn.joined.is_none() {
                    conn.send_error(ErrorCode::NotInMatch, "Not in a match").await;
                } else {
                    conn.leave_match().await;
                }
            }
        }
    }

    async fn handle_hello(
        conn: &mut Connection,
        user_id: String,
        username: Option<String>,
        clients: &RwLock<BTreeMap<SocketAddr, ConnectedClient>>,
    ) {
        if user_id.trim().is_empty() {
            conn.send_error(ErrorCode::InvalidInput, "user_id must not be empty").await;
            return;
        }
        if conn.identity.is_some() {
            conn.send_error(ErrorCode::InvalidInput, "Already identified").await;
            return;
        }

        let owner = OwnerKey::new(user_id.clone());
        let username = username.unwrap_or(user_id);
        if let Some(client) = clients.write().await.get_mut(&conn.addr) {
            client.user_id = Some(owner.clone());
        }

        info!("{} identified as {} ({})", conn.addr, owner, username);
        conn.identity = Some((owner, username));
        conn.send(ServerMessage::Welcome {
            session_id: conn.session_id.to_string(),
        })
        .await;
    }

    async fn handle_match_join(conn: &mut Connection, match_id: &str, sessions: &SessionManager) {
        let Some((owner, username)) = conn.identity.clone() else {
            return;
        };
        if conn.joined.is_some() {
            conn.send_error(ErrorCode::AlreadyInMatch, "Already in a match").await;
            return;
        }

        let handle = match uuid::Uuid::parse_str(match_id) {
            Ok(id) => sessions.get_session(&id).await,
            Err(_) => None,
        };
        let Some(handle) = handle else {
            conn.send_error(ErrorCode::MatchNotFound, "Match not found").await;
            return;
        };

        let presence = Presence::new(owner.clone(), username, conn.match_tx.clone());
        match handle.join(presence).await {
            Ok(JoinDecision::Accept) => {
                info!("{} joined match {}", owner, handle.id());
                conn.send(ServerMessage::MatchJoined {
                    match_id: handle.id().to_string(),
                    label: handle.label().to_string(),
                })
                .await;
                conn.joined = Some(handle);
            }
            Ok(JoinDecision::Reject { reason }) => {
                info!("{} rejected from match {}: {}", owner, handle.id(), reason);
                conn.send(ServerMessage::MatchRejected { reason }).await;
            }
            Err(e) => {
                debug!("Join to match {} failed: {}", handle.id(), e);
                conn.send_error(ErrorCode::MatchNotFound, "Match not found").await;
            }
        }
    }

    async fn handle_match_data(conn: &mut Connection, op_code: i64, data: String) {
        let (Some(handle), Some((owner, _))) = (&conn.joined, &conn.identity) else {
            conn.send_error(ErrorCode::NotInMatch, "Not in a match").await;
            return;
        };

        let msg = MatchData::new(op_code, owner.clone(), data);
        if let Err(e) = handle.send(msg).await {
            debug!("Match {} gone: {}", handle.id(), e);
            conn.joined = None;
            conn.send_error(ErrorCode::NotInMatch, "Match has ended").await;
        }
    }

    /// Periodically forget matches whose task has stopped.
    async fn run_cleanup_loop(sessions: Arc<SessionManager>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;
            sessions.cleanup().await;
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }
}
