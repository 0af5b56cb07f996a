use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        ConnectInfo, Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use rampart_core::{ClientId, ConnectError, Session, SessionEvent, SUBPROTOCOL};

/// Close codes clients key their reconnect UI off of.
pub const CLOSE_INVALID_VERSION: u16 = 4000;
pub const CLOSE_SERVER_FULL: u16 = 4001;
pub const CLOSE_INVALID_NAME: u16 = 4002;

pub type SharedSession = Arc<Mutex<Session>>;
pub type SenderMap = Arc<DashMap<ClientId, mpsc::UnboundedSender<Vec<u8>>>>;

/// Shared state for the WebSocket routes and the tick driver.
#[derive(Clone)]
pub struct GatewayState {
    pub session: SharedSession,
    pub senders: SenderMap,
}

impl GatewayState {
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            senders: Arc::new(DashMap::new()),
        }
    }

    /// Admit a connection and register its outbound channel in one critical
    /// section, so a concurrent tick can never encode a frame for a client
    /// whose sender is not in the map yet. Dirty entries are marked sent at
    /// encode time; a frame dropped in that window would never be re-sent.
    pub async fn admit(
        &self,
        name: &str,
        secret: Option<&str>,
        remote_addr: &str,
    ) -> Result<(ClientId, mpsc::UnboundedReceiver<Vec<u8>>), ConnectError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = self.session.lock().await;
        let id = session.connect(name, secret, remote_addr)?;
        self.senders.insert(id, tx);
        Ok((id, rx))
    }
}

/// `name` or `name/secret` from the request path. An empty name is a
/// valid anonymous connect.
pub fn parse_resource(path: &str) -> (String, Option<String>) {
    let mut parts = path.splitn(2, '/');
    let name = parts.next().unwrap_or_default().to_string();
    let secret = parts
        .next()
        .filter(|secret| !secret.is_empty())
        .map(str::to_string);
    (name, secret)
}

/// WebSocket upgrade handler, mounted on both `/` and `/*path`.
pub async fn websocket_handler(
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
    path: Option<Path<String>>,
    State(state): State<GatewayState>,
) -> Response {
    let path = path.map(|Path(path)| path).unwrap_or_default();
    ws.protocols([SUBPROTOCOL])
        .on_upgrade(move |socket| handle_socket(socket, path, state, remote_addr))
}

async fn handle_socket(
    socket: WebSocket,
    path: String,
    state: GatewayState,
    remote_addr: SocketAddr,
) {
    // subprotocol negotiation happened during the upgrade; no agreement
    // means an incompatible client
    if socket.protocol().is_none() {
        warn!(%remote_addr, "closing connection without negotiated subprotocol");
        close(
            socket,
            CLOSE_INVALID_VERSION,
            format!("Invalid version, expected '{SUBPROTOCOL}'."),
        )
        .await;
        return;
    }

    let (name, secret) = parse_resource(&path);
    let admitted = state
        .admit(&name, secret.as_deref(), &remote_addr.to_string())
        .await;
    let (id, mut rx) = match admitted {
        Ok(admitted) => admitted,
        Err(ConnectError::CapacityExceeded) => {
            info!(%remote_addr, "refusing connection, server is full");
            close(socket, CLOSE_SERVER_FULL, "Server is full.".to_string()).await;
            return;
        }
        Err(ConnectError::ReservedName(_)) => {
            info!(%remote_addr, name, "refusing connection, reserved nickname");
            close(socket, CLOSE_INVALID_NAME, "Invalid nickname.".to_string()).await;
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = socket.split();

    // outbound frames are fire-and-forget; anything that never flushes is
    // superseded next tick because the dirty masks retry it
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::Binary(frame)).await.is_err() {
                break;
            }
        }
        debug!(%id, "sender task ended");
    });

    info!(%id, name, %remote_addr, "websocket connected");

    while let Some(received) = ws_rx.next().await {
        let message = match received {
            Ok(message) => message,
            Err(err) => {
                debug!(%id, error = %err, "websocket receive error");
                break;
            }
        };
        match message {
            Message::Binary(payload) => dispatch(&state, id, &payload).await,
            // some clients poke the server with text frames to get a tick
            Message::Text(text) => dispatch(&state, id, text.as_bytes()).await,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // dropping the sender stops the forwarder task
    state.senders.remove(&id);
    {
        let mut session = state.session.lock().await;
        session.disconnect(id);
        log_events(session.drain_events());
    }
    info!(%id, "websocket disconnected");
}

async fn dispatch(state: &GatewayState, id: ClientId, payload: &[u8]) {
    let (reply, events) = {
        let mut session = state.session.lock().await;
        (session.handle_message(id, payload), session.drain_events())
    };
    log_events(events);
    if let Some(frame) = reply {
        if let Some(sender) = state.senders.get(&id) {
            let _ = sender.send(frame);
        }
    }
}

pub fn log_events(events: Vec<SessionEvent>) {
    for event in events {
        match event {
            SessionEvent::TurnSeized { id, nickname } => {
                info!(%id, nickname, "turn seized");
            }
            SessionEvent::TurnEnded { id, reason } => {
                info!(%id, ?reason, "turn ended");
            }
        }
    }
}

async fn close(mut socket: WebSocket, code: u16, reason: String) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}
