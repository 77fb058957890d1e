//! IPC server implementation

use buildmode_api::{
    ClientInfo, ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, Request, Response,
};
use buildmode_util::ClientId;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::{IpcError, IpcResult};

/// Request id used when a line cannot be parsed far enough to find one
pub const UNPARSEABLE_REQUEST_ID: u64 = 0;

/// Events buffered per subscriber before the oldest are dropped
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Message from the connection tasks to the service loop
#[derive(Debug)]
pub enum ServerMessage {
    Request {
        client_id: ClientId,
        request: Request,
    },
    ClientConnected {
        client_id: ClientId,
        info: ClientInfo,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

type ClientMap = Arc<RwLock<HashMap<ClientId, ClientHandle>>>;

/// IPC Server
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    clients: ClientMap,
    event_tx: broadcast::Sender<Event>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    message_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>>,
}

struct ClientHandle {
    info: ClientInfo,
    response_tx: mpsc::UnboundedSender<String>,
    subscribed: bool,
}

/// Map a peer UID to a role.
///
/// Root and the service's own user administer; any other local user is a
/// host integration. Peers without credentials only observe.
pub fn role_for_uid(uid: Option<u32>, service_uid: u32) -> ClientRole {
    match uid {
        Some(0) => ClientRole::Admin,
        Some(u) if u == service_uid => ClientRole::Admin,
        Some(_) => ClientRole::Host,
        None => ClientRole::Observer,
    }
}

impl IpcServer {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            clients: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            message_tx,
            message_rx: Arc::new(Mutex::new(Some(message_rx))),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket, replacing a stale one
    pub async fn start(&mut self) -> IpcResult<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Owner and group only
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;

        info!(path = %self.socket_path.display(), "IPC server listening");

        self.listener = Some(listener);

        Ok(())
    }

    /// Take the receiver for server messages. Only the first call gets it.
    pub async fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.message_rx.lock().await.take()
    }

    /// Accept connections until the task is dropped
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| IpcError::ServerError("Server not started".into()))?;

        let service_uid = nix::unistd::getuid().as_raw();

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = ClientId::new();
                    let uid = get_peer_uid(&stream);
                    let role = role_for_uid(uid, service_uid);

                    let mut info = ClientInfo::new(role);
                    info.client_id = client_id.clone();
                    if let Some(u) = uid {
                        info = info.with_uid(u);
                    }

                    debug!(client_id = %client_id, uid = ?uid, role = ?role, "Accepted connection");

                    self.handle_client(stream, client_id, info).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_client(&self, stream: UnixStream, client_id: ClientId, info: ClientInfo) {
        let (read_half, write_half) = stream.into_split();
        let (response_tx, response_rx) = mpsc::unbounded_channel::<String>();

        self.clients.write().await.insert(
            client_id.clone(),
            ClientHandle {
                info: info.clone(),
                response_tx,
                subscribed: false,
            },
        );

        let _ = self.message_tx.send(ServerMessage::ClientConnected {
            client_id: client_id.clone(),
            info,
        });

        tokio::spawn(read_requests(
            read_half,
            client_id.clone(),
            self.clients.clone(),
            self.message_tx.clone(),
        ));

        tokio::spawn(write_responses(
            write_half,
            client_id,
            self.clients.clone(),
            response_rx,
            self.event_tx.subscribe(),
        ));
    }

    /// Send a response to a specific client
    pub async fn send_response(&self, client_id: &ClientId, response: Response) -> IpcResult<()> {
        let json = serde_json::to_string(&response)?;

        let clients = self.clients.read().await;
        let handle = clients.get(client_id).ok_or(IpcError::ConnectionClosed)?;
        handle
            .response_tx
            .send(json)
            .map_err(|_| IpcError::ConnectionClosed)
    }

    /// Broadcast an event to all subscribed clients
    pub fn broadcast_event(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    pub async fn get_client_info(&self, client_id: &ClientId) -> Option<ClientInfo> {
        let clients = self.clients.read().await;
        clients.get(client_id).map(|h| h.info.clone())
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Remove the socket file
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reader half: parse NDJSON requests and forward them to the service.
///
/// Subscription changes are recorded here so events sent right after the
/// acknowledgement already reach the client. On EOF the client is
/// unregistered, which also closes its writer.
async fn read_requests(
    read_half: tokio::net::unix::OwnedReadHalf,
    client_id: ClientId,
    clients: ClientMap,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!(client_id = %client_id, "Client disconnected (EOF)");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                match serde_json::from_str::<Request>(trimmed) {
                    Ok(request) => {
                        let subscribe = match request.command {
                            Command::SubscribeEvents => Some(true),
                            Command::UnsubscribeEvents => Some(false),
                            _ => None,
                        };
                        if let Some(subscribed) = subscribe
                            && let Some(handle) = clients.write().await.get_mut(&client_id)
                        {
                            handle.subscribed = subscribed;
                        }

                        let _ = message_tx.send(ServerMessage::Request {
                            client_id: client_id.clone(),
                            request,
                        });
                    }
                    Err(e) => {
                        warn!(client_id = %client_id, error = %e, "Invalid request");
                        reject_line(&clients, &client_id, &e).await;
                    }
                }
            }
            Err(e) => {
                debug!(client_id = %client_id, error = %e, "Read error");
                break;
            }
        }
    }

    clients.write().await.remove(&client_id);
    let _ = message_tx.send(ServerMessage::ClientDisconnected { client_id });
}

async fn reject_line(clients: &ClientMap, client_id: &ClientId, error: &serde_json::Error) {
    let response = Response::error(
        UNPARSEABLE_REQUEST_ID,
        ErrorInfo::new(ErrorCode::InvalidRequest, format!("Malformed request: {}", error)),
    );
    let Ok(json) = serde_json::to_string(&response) else {
        return;
    };
    if let Some(handle) = clients.read().await.get(client_id) {
        let _ = handle.response_tx.send(json);
    }
}

/// Writer half: responses for this client plus broadcast events while
/// subscribed. A subscriber that falls behind gets an `EventsDropped`
/// notice in place of the events it missed.
async fn write_responses(
    mut writer: tokio::net::unix::OwnedWriteHalf,
    client_id: ClientId,
    clients: ClientMap,
    mut response_rx: mpsc::UnboundedReceiver<String>,
    mut event_rx: broadcast::Receiver<Event>,
) {
    loop {
        tokio::select! {
            // Responses first so a subscribe acknowledgement precedes events
            biased;

            response = response_rx.recv() => {
                // Sender dropped: the reader unregistered the client
                let Some(mut msg) = response else { break };
                msg.push('\n');
                if let Err(e) = writer.write_all(msg.as_bytes()).await {
                    debug!(client_id = %client_id, error = %e, "Write error");
                    break;
                }
            }

            event = event_rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(client_id = %client_id, skipped, "Client lagging, events dropped");
                        Event::new(EventPayload::EventsDropped { skipped })
                    }
                    Err(RecvError::Closed) => break,
                };

                let is_subscribed = clients
                    .read()
                    .await
                    .get(&client_id)
                    .is_some_and(|h| h.subscribed);
                if !is_subscribed {
                    continue;
                }

                match serde_json::to_string(&event) {
                    Ok(mut msg) => {
                        msg.push('\n');
                        if let Err(e) = writer.write_all(msg.as_bytes()).await {
                            debug!(client_id = %client_id, error = %e, "Event write error");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize event"),
                }
            }
        }
    }
}

/// Get peer UID from Unix socket
fn get_peer_uid(stream: &UnixStream) -> Option<u32> {
    use std::os::unix::io::AsFd;

    let fd = stream.as_fd();

    nix::sys::socket::getsockopt(&fd, nix::sys::socket::sockopt::PeerCredentials)
        .ok()
        .map(|cred| cred.uid())
}
