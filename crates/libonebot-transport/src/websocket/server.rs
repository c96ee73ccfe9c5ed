//! WebSocket server transport.
//!
//! Accepts duplex connections on `GET /`, pushes events and heartbeats
//! to every attached peer and answers action requests inline on the
//! session they arrived on. Credentials are checked before the upgrade:
//! a bad token is answered with plain HTTP 401 and the handshake never
//! completes.

use crate::auth::{AuthQuery, authorize_request};
use crate::websocket::{
    FrameSink, PeerRegistry, WsFrame, attach_peer, fan_out, serve_peer, spawn_heartbeat,
};
use async_trait::async_trait;
use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::SinkExt;
use futures::StreamExt;
use futures::stream::SplitSink;
use libonebot_core::dispatcher::DispatcherHandle;
use libonebot_core::error::{TransportError, TransportResult};
use libonebot_core::model::Event;
use libonebot_core::supervisor::TaskSupervisor;
use libonebot_core::transport::{Transport, TransportKind};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Settings of the WebSocket server transport.
#[derive(Debug, Clone)]
pub struct WsServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer/query token required on every handshake, if set.
    pub access_token: Option<String>,
    pub enable_heartbeat: bool,
    /// Delay between heartbeat events, must be positive.
    pub heartbeat_interval: Duration,
}

impl Default for WsServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            access_token: None,
            enable_heartbeat: true,
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

impl WsServerConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_heartbeat(mut self, enabled: bool) -> Self {
        self.enable_heartbeat = enabled;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

// ─── Transport ────────────────────────────────────────────────────────────────

/// The WebSocket server transport.
#[derive(Debug)]
pub struct WsServer {
    config: WsServerConfig,
    dispatcher: OnceLock<DispatcherHandle>,
    registry: Arc<PeerRegistry>,
    supervisor: OnceLock<TaskSupervisor>,
    local_addr: OnceLock<SocketAddr>,
}

impl WsServer {
    pub fn new(config: WsServerConfig) -> TransportResult<Self> {
        if config.heartbeat_interval.is_zero() {
            return Err(TransportError::InvalidConfig(
                "heartbeat_interval must be positive".into(),
            ));
        }
        Ok(Self {
            config,
            dispatcher: OnceLock::new(),
            registry: PeerRegistry::new(),
            supervisor: OnceLock::new(),
            local_addr: OnceLock::new(),
        })
    }

    /// The actual bound address, available once started. With port 0
    /// this is where the OS put us.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Number of currently attached peers.
    pub fn peer_count(&self) -> usize {
        self.registry.count()
    }

    fn handle(&self) -> TransportResult<&DispatcherHandle> {
        self.dispatcher.get().ok_or(TransportError::NotBound)
    }
}

#[async_trait]
impl Transport for WsServer {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn bind(&self, dispatcher: DispatcherHandle) -> TransportResult<()> {
        self.dispatcher
            .set(dispatcher)
            .map_err(|_| TransportError::AlreadyBound)
    }

    async fn start(&self, supervisor: &TaskSupervisor) -> TransportResult<()> {
        let state = WsState {
            access_token: self.config.access_token.clone(),
            dispatcher: self.handle()?.clone(),
            registry: self.registry.clone(),
            token: supervisor.token(),
        };

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|err| TransportError::Bind {
                addr: addr.clone(),
                reason: err.to_string(),
            })?;
        let actual_addr = listener.local_addr()?;
        let _ = self.local_addr.set(actual_addr);
        let _ = self.supervisor.set(supervisor.clone());

        if self.config.enable_heartbeat {
            spawn_heartbeat(
                supervisor,
                self.registry.clone(),
                self.config.heartbeat_interval,
            );
        }

        let router = Router::new()
            .route("/", get(handle_upgrade))
            .with_state(state);

        info!(addr = %actual_addr, "WebSocket transport listening");
        let token = supervisor.token();
        supervisor.spawn(async move {
            let server = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            );
            tokio::select! {
                result = server => {
                    if let Err(err) = result {
                        error!(error = %err, "WebSocket server error");
                    }
                }
                () = token.cancelled() => {
                    info!(addr = %actual_addr, "WebSocket transport shutting down");
                }
            }
        });
        Ok(())
    }

    async fn emit_event(&self, event: &Event) -> TransportResult<()> {
        match self.supervisor.get() {
            Some(supervisor) => fan_out(supervisor, &self.registry, event),
            None => trace!(event_id = %event.id, "Event dropped, transport not started"),
        }
        Ok(())
    }
}

// ─── Session handling ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct WsState {
    access_token: Option<String>,
    dispatcher: DispatcherHandle,
    registry: Arc<PeerRegistry>,
    token: CancellationToken,
}

/// Axum handler for `GET /`. Authorization happens here, on the
/// handshake request: a rejected peer gets a 401 response and is never
/// upgraded.
async fn handle_upgrade(
    State(state): State<WsState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    if !authorize_request(state.access_token.as_deref(), &headers, &query) {
        debug!(remote_addr = %addr, "Rejected unauthorized WebSocket handshake");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    upgrade.on_upgrade(move |socket| serve_socket(state, addr, socket))
}

/// Runs one accepted socket: attach (connect event first), then the
/// listen loop until the peer leaves or shutdown fires.
async fn serve_socket(state: WsState, addr: SocketAddr, socket: WebSocket) {
    let (sink, stream) = socket.split();
    let sink: Arc<dyn FrameSink> = Arc::new(AxumSink {
        sink: Mutex::new(sink),
    });

    let peer = match attach_peer(
        &state.registry,
        addr.to_string(),
        sink,
        state.dispatcher.info(),
    )
    .await
    {
        Ok(peer) => peer,
        Err(err) => {
            debug!(remote_addr = %addr, error = %err, "WebSocket attach failed");
            return;
        }
    };

    let frames = stream.map(|item| {
        item.map(frame_from_message)
            .map_err(|err| TransportError::Io(err.to_string()))
    });
    serve_peer(frames, peer, state.registry, state.dispatcher, state.token).await;
}

struct AxumSink {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl FrameSink for AxumSink {
    async fn send(&self, frame: WsFrame) -> TransportResult<()> {
        let message = match frame {
            WsFrame::Text(text) => Message::Text(text.into()),
            WsFrame::Binary(bytes) => Message::Binary(bytes.into()),
            WsFrame::Close => Message::Close(None),
            WsFrame::Ignore => return Ok(()),
        };
        self.sink
            .lock()
            .await
            .send(message)
            .await
            .map_err(|err| TransportError::SendFailed(err.to_string()))
    }
}

fn frame_from_message(message: Message) -> WsFrame {
    match message {
        Message::Text(text) => WsFrame::Text(text.as_str().to_owned()),
        Message::Binary(bytes) => WsFrame::Binary(bytes.to_vec()),
        Message::Close(_) => WsFrame::Close,
        Message::Ping(_) | Message::Pong(_) => WsFrame::Ignore,
    }
}
