//! HTTP server transport.
//!
//! Stateless request/response: each `POST /` carries one action request
//! and returns one action response, in the body encoding the request
//! used. Events are not pushed; with polling enabled they accumulate in
//! a bounded FIFO buffer drained by the `get_latest_events` meta-action
//! this transport registers at bind time.

use crate::auth::{AuthQuery, authorize_request};
use crate::codec::WireFormat;
use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use libonebot_core::dispatcher::{DispatcherHandle, into_handler};
use libonebot_core::error::{TransportError, TransportResult};
use libonebot_core::model::Event;
use libonebot_core::schema::{ActionSchema, ParamSpec, ParamType};
use libonebot_core::supervisor::TaskSupervisor;
use libonebot_core::transport::{Transport, TransportKind};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::net::TcpListener;
use tracing::{debug, error, info, trace};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Settings of the HTTP server transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Bearer/query token required on every request, if set.
    pub access_token: Option<String>,
    /// Whether events are buffered for `get_latest_events`.
    pub event_enabled: bool,
    /// Capacity of the event buffer; the oldest event is evicted on
    /// overflow.
    pub event_buffer_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            access_token: None,
            event_enabled: true,
            event_buffer_size: 16,
        }
    }
}

impl HttpConfig {
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

    pub fn with_events(mut self, enabled: bool) -> Self {
        self.event_enabled = enabled;
        self
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }
}

// ─── Event buffer ─────────────────────────────────────────────────────────────

/// Bounded FIFO of pending events.
///
/// `push` never blocks: when the buffer is full the oldest event is
/// dropped to make room. Draining removes events for good.
#[derive(Debug)]
pub struct EventBuffer {
    capacity: usize,
    queue: Mutex<VecDeque<Event>>,
}

impl EventBuffer {
    /// Creates a buffer holding at most `capacity` events (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, event: Event) {
        let mut queue = self.queue.lock();
        if queue.len() == self.capacity
            && let Some(dropped) = queue.pop_front()
        {
            debug!(event_id = %dropped.id, "Event buffer full, dropping oldest");
        }
        queue.push_back(event);
    }

    /// Removes and returns up to `limit` events in arrival order;
    /// `limit == 0` means all of them.
    pub fn drain(&self, limit: usize) -> Vec<Event> {
        let mut queue = self.queue.lock();
        let take = if limit == 0 {
            queue.len()
        } else {
            limit.min(queue.len())
        };
        queue.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

// ─── Transport ────────────────────────────────────────────────────────────────

/// The HTTP server transport.
#[derive(Debug)]
pub struct HttpServer {
    config: HttpConfig,
    dispatcher: OnceLock<DispatcherHandle>,
    buffer: Option<Arc<EventBuffer>>,
    local_addr: OnceLock<SocketAddr>,
}

impl HttpServer {
    pub fn new(config: HttpConfig) -> TransportResult<Self> {
        if config.event_enabled && config.event_buffer_size == 0 {
            return Err(TransportError::InvalidConfig(
                "event_buffer_size must be positive when events are enabled".into(),
            ));
        }
        let buffer = config
            .event_enabled
            .then(|| Arc::new(EventBuffer::new(config.event_buffer_size)));
        Ok(Self {
            config,
            dispatcher: OnceLock::new(),
            buffer,
            local_addr: OnceLock::new(),
        })
    }

    /// The actual bound address, available once started. With port 0
    /// this is where the OS put us.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    fn handle(&self) -> TransportResult<&DispatcherHandle> {
        self.dispatcher.get().ok_or(TransportError::NotBound)
    }
}

#[async_trait]
impl Transport for HttpServer {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn bind(&self, dispatcher: DispatcherHandle) -> TransportResult<()> {
        if let Some(buffer) = &self.buffer {
            let buffer = buffer.clone();
            dispatcher.register_action(
                ActionSchema::new("get_latest_events")
                    .param(ParamSpec::optional("limit", ParamType::Integer).with_default(json!(0)))
                    // accepted for compatibility; long polling is not implemented
                    .param(
                        ParamSpec::optional("timeout", ParamType::Integer).with_default(json!(0)),
                    ),
                into_handler(move |ctx| {
                    let buffer = buffer.clone();
                    async move {
                        let limit = ctx.param_i64("limit").unwrap_or(0).max(0) as usize;
                        let events: Vec<Value> =
                            buffer.drain(limit).iter().map(Event::payload).collect();
                        Ok(Value::Array(events))
                    }
                }),
            );
        }
        self.dispatcher
            .set(dispatcher)
            .map_err(|_| TransportError::AlreadyBound)
    }

    async fn start(&self, supervisor: &TaskSupervisor) -> TransportResult<()> {
        let state = HttpState {
            access_token: self.config.access_token.clone(),
            dispatcher: self.handle()?.clone(),
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

        let router = Router::new()
            .route("/", post(handle_action))
            .with_state(state);

        info!(addr = %actual_addr, "HTTP transport listening");
        let token = supervisor.token();
        supervisor.spawn(async move {
            let server = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            );
            tokio::select! {
                result = server => {
                    if let Err(err) = result {
                        error!(error = %err, "HTTP server error");
                    }
                }
                () = token.cancelled() => {
                    info!(addr = %actual_addr, "HTTP transport shutting down");
                }
            }
        });
        Ok(())
    }

    async fn emit_event(&self, event: &Event) -> TransportResult<()> {
        match &self.buffer {
            Some(buffer) => {
                buffer.push(event.clone());
                trace!(event_id = %event.id, buffered = buffer.len(), "Buffered event");
            }
            None => trace!(event_id = %event.id, "Event dropped, polling disabled"),
        }
        Ok(())
    }
}

// ─── Request handling ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct HttpState {
    access_token: Option<String>,
    dispatcher: DispatcherHandle,
}

/// Axum handler for `POST /`.
///
/// Rejection ladder: bad credentials → 401, unknown content type → 415,
/// undecodable body → 200 with a retcode 10001 body. Everything else is
/// dispatched and answered in the request's own encoding.
async fn handle_action(
    State(state): State<HttpState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorize_request(state.access_token.as_deref(), &headers, &query) {
        debug!(remote_addr = %addr, "Rejected unauthorized HTTP request");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let format = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(WireFormat::from_content_type);
    let Some(format) = format else {
        debug!(remote_addr = %addr, "Rejected HTTP request with unsupported content type");
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    };

    let response = match format.decode_request(&body) {
        Ok(request) => {
            trace!(remote_addr = %addr, action = %request.action, "Dispatching HTTP action");
            state.dispatcher.dispatch(request).await
        }
        Err(failure) => failure,
    };

    match format.encode_response(&response) {
        Ok(bytes) => ([(header::CONTENT_TYPE, format.content_type())], bytes).into_response(),
        Err(err) => {
            error!(error = %err, "Failed to encode HTTP response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
