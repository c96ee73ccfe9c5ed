//! Reverse WebSocket transport.
//!
//! Dials out to a WebSocket host and keeps exactly one session alive:
//! the first attempt happens immediately, every failed dial or ended
//! session is followed by a `reconnect_interval` pause, and the loop
//! only stops on shutdown. The handshake identifies the implementation
//! through `User-Agent` and `Sec-WebSocket-Protocol` and carries the
//! access token as a bearer credential when one is configured.

use crate::websocket::{
    FrameSink, PeerRegistry, WsFrame, attach_peer, fan_out, serve_peer, spawn_heartbeat,
};
use async_trait::async_trait;
use futures::SinkExt;
use futures::StreamExt;
use futures::stream::SplitSink;
use libonebot_core::dispatcher::DispatcherHandle;
use libonebot_core::error::{TransportError, TransportResult};
use libonebot_core::model::{Event, ImplInfo};
use libonebot_core::supervisor::TaskSupervisor;
use libonebot_core::transport::{Transport, TransportKind};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL, USER_AGENT};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Settings of the reverse WebSocket transport.
#[derive(Debug, Clone)]
pub struct WsReverseConfig {
    /// The `ws://` or `wss://` URL of the host to dial.
    pub url: String,
    /// Sent as `Authorization: Bearer` on the handshake, if set.
    pub access_token: Option<String>,
    /// Pause between a failed dial or ended session and the next
    /// attempt, must be positive.
    pub reconnect_interval: Duration,
    pub enable_heartbeat: bool,
    /// Delay between heartbeat events, must be positive.
    pub heartbeat_interval: Duration,
}

impl WsReverseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: None,
            reconnect_interval: Duration::from_secs(5),
            enable_heartbeat: true,
            heartbeat_interval: Duration::from_secs(5),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
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

/// The reverse WebSocket transport.
#[derive(Debug)]
pub struct WsReverse {
    config: WsReverseConfig,
    dispatcher: OnceLock<DispatcherHandle>,
    registry: Arc<PeerRegistry>,
    supervisor: OnceLock<TaskSupervisor>,
}

impl WsReverse {
    pub fn new(config: WsReverseConfig) -> TransportResult<Self> {
        if config.reconnect_interval.is_zero() {
            return Err(TransportError::InvalidConfig(
                "reconnect_interval must be positive".into(),
            ));
        }
        if config.heartbeat_interval.is_zero() {
            return Err(TransportError::InvalidConfig(
                "heartbeat_interval must be positive".into(),
            ));
        }
        config
            .url
            .as_str()
            .into_client_request()
            .map_err(|err| TransportError::InvalidConfig(format!("invalid url: {err}")))?;
        Ok(Self {
            config,
            dispatcher: OnceLock::new(),
            registry: PeerRegistry::new(),
            supervisor: OnceLock::new(),
        })
    }

    /// Whether a session is currently established.
    pub fn is_connected(&self) -> bool {
        self.registry.count() > 0
    }

    fn handle(&self) -> TransportResult<&DispatcherHandle> {
        self.dispatcher.get().ok_or(TransportError::NotBound)
    }
}

#[async_trait]
impl Transport for WsReverse {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocketReverse
    }

    fn bind(&self, dispatcher: DispatcherHandle) -> TransportResult<()> {
        self.dispatcher
            .set(dispatcher)
            .map_err(|_| TransportError::AlreadyBound)
    }

    async fn start(&self, supervisor: &TaskSupervisor) -> TransportResult<()> {
        let dispatcher = self.handle()?.clone();
        let _ = self.supervisor.set(supervisor.clone());

        if self.config.enable_heartbeat {
            spawn_heartbeat(
                supervisor,
                self.registry.clone(),
                self.config.heartbeat_interval,
            );
        }

        let config = self.config.clone();
        let registry = self.registry.clone();
        let token = supervisor.token();
        info!(url = %config.url, "Reverse WebSocket transport started");
        supervisor.spawn(async move {
            while !token.is_cancelled() {
                match connect_once(&config, &dispatcher, &registry, &token).await {
                    Ok(true) => info!(url = %config.url, "WebSocket session ended"),
                    Ok(false) => break,
                    Err(err) => {
                        debug!(url = %config.url, error = %err, "WebSocket dial failed");
                    }
                }
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(config.reconnect_interval) => {}
                }
            }
            debug!(url = %config.url, "Reverse WebSocket transport stopped");
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

/// The handshake request: the configured URL plus the identifying
/// headers of this implementation.
fn build_request(
    config: &WsReverseConfig,
    info: &ImplInfo,
) -> TransportResult<tokio_tungstenite::tungstenite::handshake::client::Request> {
    let invalid = |err: &dyn std::fmt::Display| {
        TransportError::InvalidConfig(format!("invalid handshake header: {err}"))
    };
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|err| TransportError::InvalidConfig(format!("invalid url: {err}")))?;
    let headers = request.headers_mut();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&info.user_agent()).map_err(|err| invalid(&err))?,
    );
    headers.insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_str(&info.ws_subprotocol()).map_err(|err| invalid(&err))?,
    );
    if let Some(token) = &config.access_token {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|err| invalid(&err))?,
        );
    }
    Ok(request)
}

/// One dial and, if it succeeds, one full session. Returns `Ok(false)`
/// when shutdown interrupted the dial, `Ok(true)` when a session ran to
/// its end.
async fn connect_once(
    config: &WsReverseConfig,
    dispatcher: &DispatcherHandle,
    registry: &Arc<PeerRegistry>,
    token: &CancellationToken,
) -> TransportResult<bool> {
    let request = build_request(config, dispatcher.info())?;
    let socket = tokio::select! {
        () = token.cancelled() => return Ok(false),
        result = connect_async(request) => {
            result.map_err(|err| TransportError::Io(err.to_string()))?.0
        }
    };
    info!(url = %config.url, "Connected to WebSocket host");

    let (sink, stream) = socket.split();
    let sink: Arc<dyn FrameSink> = Arc::new(TungsteniteSink {
        sink: Mutex::new(sink),
    });
    let peer = attach_peer(registry, config.url.clone(), sink, dispatcher.info()).await?;
    let frames = stream.map(|item| {
        item.map(frame_from_message)
            .map_err(|err| TransportError::Io(err.to_string()))
    });
    serve_peer(
        frames,
        peer,
        registry.clone(),
        dispatcher.clone(),
        token.clone(),
    )
    .await;
    Ok(true)
}

struct TungsteniteSink {
    sink: Mutex<SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>>,
}

#[async_trait]
impl FrameSink for TungsteniteSink {
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
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => WsFrame::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libonebot_core::dispatcher::ActionDispatcher;
    use libonebot_core::model::Bot;
    use parking_lot::Mutex as SyncMutex;
    use serde_json::Value;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{
        Request as ServerRequest, Response as ServerResponse,
    };

    fn test_transport(url: String, interval_ms: u64) -> (Arc<ActionDispatcher>, WsReverse) {
        let dispatcher =
            ActionDispatcher::new(ImplInfo::new("test-impl", "0.1.0"), vec![Bot::new("qq", "1")]);
        let config = WsReverseConfig::new(url)
            .with_access_token("tok")
            .with_reconnect_interval(Duration::from_millis(interval_ms))
            .with_heartbeat(false);
        let transport = WsReverse::new(config).unwrap();
        transport.bind(DispatcherHandle::new(&dispatcher)).unwrap();
        (dispatcher, transport)
    }

    #[test]
    fn invalid_configuration_rejected() {
        let bad_url = WsReverse::new(WsReverseConfig::new("not a url"));
        assert!(matches!(
            bad_url.unwrap_err(),
            TransportError::InvalidConfig(_)
        ));

        let zero_interval = WsReverse::new(
            WsReverseConfig::new("ws://127.0.0.1:1/")
                .with_reconnect_interval(Duration::ZERO),
        );
        assert!(matches!(
            zero_interval.unwrap_err(),
            TransportError::InvalidConfig(_)
        ));
    }

    #[test]
    fn handshake_request_carries_identity_and_token() {
        let config = WsReverseConfig::new("ws://127.0.0.1:1/").with_access_token("tok");
        let info = ImplInfo::new("test-impl", "0.1.0");
        let request = build_request(&config, &info).unwrap();
        let headers = request.headers();
        let agent = headers[USER_AGENT].to_str().unwrap();
        assert!(agent.starts_with("OneBot/12 libonebot/"));
        assert!(agent.ends_with("test-impl/0.1.0"));
        assert_eq!(headers[SEC_WEBSOCKET_PROTOCOL], "12.test-impl");
        assert_eq!(headers[AUTHORIZATION], "Bearer tok");
    }

    #[tokio::test]
    async fn redials_until_accepted_and_after_session_end() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_dispatcher, transport) = test_transport(format!("ws://{addr}/"), 50);

        let seen_protocol: Arc<SyncMutex<Option<String>>> = Arc::new(SyncMutex::new(None));
        let seen_clone = seen_protocol.clone();
        let host = tokio::spawn(async move {
            // refuse the first three dials outright
            for _ in 0..3 {
                let (socket, _) = listener.accept().await.unwrap();
                drop(socket);
            }

            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_hdr_async(socket, |req: &ServerRequest, mut resp: ServerResponse| {
                let protocol = req.headers().get(SEC_WEBSOCKET_PROTOCOL).cloned();
                if let Some(protocol) = protocol {
                    *seen_clone.lock() = protocol.to_str().ok().map(str::to_owned);
                    // agree to the offered subprotocol
                    resp.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
                }
                Ok(resp)
            })
            .await
            .unwrap();

            // the first frame of the session is the connect event
            let connect: Value = match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
                other => panic!("expected text frame, got {other:?}"),
            };
            assert_eq!(connect["detail_type"], "connect");
            assert_eq!(connect["version"]["impl"], "test-impl");

            ws.send(Message::Text(
                r#"{"action": "get_version", "params": {}, "echo": "r1"}"#.into(),
            ))
            .await
            .unwrap();
            let response: Value = match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
                other => panic!("expected text frame, got {other:?}"),
            };
            assert_eq!(response["retcode"], 0);
            assert_eq!(response["echo"], "r1");

            // end the session; the transport must come back on its own
            ws.close(None).await.unwrap();
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_hdr_async(socket, |req: &ServerRequest, mut resp: ServerResponse| {
                if let Some(protocol) = req.headers().get(SEC_WEBSOCKET_PROTOCOL).cloned() {
                    resp.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
                }
                Ok(resp)
            })
            .await
            .unwrap();
            let reconnect: Value = match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
                other => panic!("expected text frame, got {other:?}"),
            };
            assert_eq!(reconnect["detail_type"], "connect");
        });

        let supervisor = TaskSupervisor::new();
        transport.start(&supervisor).await.unwrap();

        host.await.unwrap();
        assert_eq!(seen_protocol.lock().as_deref(), Some("12.test-impl"));
        supervisor.shutdown().await;
    }
}
