//! The transport contract.
//!
//! Transports live in their own crate; this module defines the trait
//! they implement and the kind tag used for config and logging.

use crate::dispatcher::DispatcherHandle;
use crate::error::TransportResult;
use crate::model::Event;
use crate::supervisor::TaskSupervisor;
use async_trait::async_trait;
use std::fmt;

/// Which OneBot Connect flavor a transport speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// HTTP server, events polled via `get_latest_events`.
    Http,
    /// HTTP client pushing events to a configured URL.
    HttpWebhook,
    /// WebSocket server.
    WebSocket,
    /// WebSocket client dialing out to a configured URL.
    WebSocketReverse,
}

impl TransportKind {
    /// Whether events are pushed to peers as they happen.
    ///
    /// The plain HTTP transport buffers instead, so payloads that only
    /// make sense as pushes (like `meta.status_update`) skip it.
    pub fn is_push(&self) -> bool {
        !matches!(self, TransportKind::Http)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Http => "http",
            TransportKind::HttpWebhook => "http-webhook",
            TransportKind::WebSocket => "ws",
            TransportKind::WebSocketReverse => "ws-reverse",
        };
        f.write_str(name)
    }
}

/// One OneBot Connect transport.
///
/// An implementation owns a set of transports, all serving the same
/// dispatcher. The lifecycle is bind, then start, then any number of
/// [`Transport::emit_event`] calls until the supervisor is cancelled.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Wires the transport to the action dispatcher.
    ///
    /// Called exactly once, before [`Transport::start`]. Transports may
    /// register transport-owned actions here, like the HTTP transport's
    /// `get_latest_events`.
    fn bind(&self, dispatcher: DispatcherHandle) -> TransportResult<()>;

    /// Binds listeners and spawns serving loops under the supervisor.
    ///
    /// Returns once the transport is ready for traffic; the loops keep
    /// running until the supervisor's token fires.
    async fn start(&self, supervisor: &TaskSupervisor) -> TransportResult<()>;

    /// Delivers one event to this transport's peers.
    ///
    /// Push transports send it out, the HTTP transport buffers it. A
    /// failing peer must not fail the others; per-peer errors are
    /// logged and swallowed, only transport-wide faults surface.
    async fn emit_event(&self, event: &Event) -> TransportResult<()>;
}
