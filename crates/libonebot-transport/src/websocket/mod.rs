//! WebSocket transports.
//!
//! The server ([`server::WsServer`]) and the reverse client
//! ([`reverse::WsReverse`]) share everything but the way a socket comes
//! into existence: a registry of attached peers, one listen loop per
//! peer, event fan-out as independent tasks and an optional heartbeat
//! scheduler. Text frames carry JSON, binary frames msgpack, and a
//! response always uses the framing of its request.

pub mod reverse;
pub mod server;

use crate::codec::{WireFormat, encode_event};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use libonebot_core::dispatcher::DispatcherHandle;
use libonebot_core::error::TransportResult;
use libonebot_core::model::{Event, ImplInfo};
use libonebot_core::supervisor::TaskSupervisor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

// ─── Frames ───────────────────────────────────────────────────────────────────

/// The subset of WebSocket traffic the protocol cares about.
///
/// Both socket stacks (axum for the server, tungstenite for the reverse
/// client) are mapped onto this before reaching shared code.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WsFrame {
    Text(String),
    Binary(Vec<u8>),
    /// The peer is closing the session.
    Close,
    /// Control traffic (ping/pong), nothing to do.
    Ignore,
}

/// The send half of one peer, type-erased over the socket stack.
#[async_trait]
pub(crate) trait FrameSink: Send + Sync {
    async fn send(&self, frame: WsFrame) -> TransportResult<()>;
}

// ─── Peers ────────────────────────────────────────────────────────────────────

/// One attached duplex peer.
pub(crate) struct WsPeer {
    id: u64,
    remote: String,
    sink: Arc<dyn FrameSink>,
}

impl WsPeer {
    pub(crate) fn new(id: u64, remote: impl Into<String>, sink: Arc<dyn FrameSink>) -> Arc<Self> {
        Arc::new(Self {
            id,
            remote: remote.into(),
            sink,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn remote(&self) -> &str {
        &self.remote
    }

    pub(crate) async fn send(&self, frame: WsFrame) -> TransportResult<()> {
        self.sink.send(frame).await
    }

    /// Events always go out as JSON text.
    pub(crate) async fn send_event(&self, event: &Event) -> TransportResult<()> {
        self.send(WsFrame::Text(encode_event(event)?)).await
    }
}

impl std::fmt::Debug for WsPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsPeer")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .finish()
    }
}

/// The set of attached peers, shared across accept loops, listen loops,
/// fan-out and heartbeat.
///
/// Fan-out iterates over a snapshot, so a peer attaching or detaching
/// mid-delivery neither corrupts the set nor skips other peers.
#[derive(Debug, Default)]
pub(crate) struct PeerRegistry {
    next_id: AtomicU64,
    peers: Mutex<HashMap<u64, Arc<WsPeer>>>,
}

impl PeerRegistry {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn insert(&self, peer: Arc<WsPeer>) {
        self.peers.lock().insert(peer.id(), peer);
    }

    pub(crate) fn deregister(&self, id: u64) -> bool {
        self.peers.lock().remove(&id).is_some()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<WsPeer>> {
        self.peers.lock().values().cloned().collect()
    }

    pub(crate) fn count(&self) -> usize {
        self.peers.lock().len()
    }
}

/// Takes a fresh socket through the attach protocol: the connect
/// meta-event is the very first frame on the wire, and only then does
/// the peer become visible to fan-out and heartbeat.
pub(crate) async fn attach_peer(
    registry: &PeerRegistry,
    remote: impl Into<String>,
    sink: Arc<dyn FrameSink>,
    info: &ImplInfo,
) -> TransportResult<Arc<WsPeer>> {
    let peer = WsPeer::new(registry.allocate_id(), remote, sink);
    peer.send_event(&Event::meta_connect(info.version_payload()))
        .await?;
    registry.insert(peer.clone());
    info!(peer = %peer.remote(), peers = registry.count(), "WebSocket peer attached");
    Ok(peer)
}

// ─── Listen loop ──────────────────────────────────────────────────────────────

/// Serves one peer until it disconnects, errors or shutdown fires, then
/// removes it from the registry.
///
/// Frames are handled strictly one at a time: the response to frame N
/// is sent before frame N+1 is even read.
pub(crate) async fn serve_peer<S>(
    mut frames: S,
    peer: Arc<WsPeer>,
    registry: Arc<PeerRegistry>,
    dispatcher: DispatcherHandle,
    token: CancellationToken,
) where
    S: Stream<Item = TransportResult<WsFrame>> + Unpin + Send,
{
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            next = frames.next() => match next {
                Some(Ok(frame)) => {
                    if !handle_frame(&peer, &dispatcher, frame).await {
                        break;
                    }
                }
                Some(Err(err)) => {
                    debug!(peer = %peer.remote(), error = %err, "WebSocket receive failed");
                    break;
                }
                None => break,
            },
        }
    }
    registry.deregister(peer.id());
    info!(peer = %peer.remote(), peers = registry.count(), "WebSocket peer detached");
}

/// Decodes, dispatches and answers one frame. Returns false when the
/// session is over.
async fn handle_frame(peer: &WsPeer, dispatcher: &DispatcherHandle, frame: WsFrame) -> bool {
    let (format, bytes) = match frame {
        WsFrame::Text(text) => (WireFormat::Json, text.into_bytes()),
        WsFrame::Binary(bytes) => (WireFormat::MsgPack, bytes),
        WsFrame::Close => return false,
        WsFrame::Ignore => return true,
    };

    let response = match format.decode_request(&bytes) {
        Ok(request) => {
            trace!(peer = %peer.remote(), action = %request.action, "Dispatching WebSocket action");
            dispatcher.dispatch(request).await
        }
        Err(failure) => failure,
    };

    let outgoing = match format {
        WireFormat::Json => match serde_json::to_string(&response) {
            Ok(text) => WsFrame::Text(text),
            Err(err) => {
                error!(error = %err, "Failed to encode WebSocket response");
                return true;
            }
        },
        WireFormat::MsgPack => match format.encode_response(&response) {
            Ok(bytes) => WsFrame::Binary(bytes),
            Err(err) => {
                error!(error = %err, "Failed to encode WebSocket response");
                return true;
            }
        },
    };

    if let Err(err) = peer.send(outgoing).await {
        debug!(peer = %peer.remote(), error = %err, "WebSocket send failed");
        return false;
    }
    true
}

// ─── Fan-out and heartbeat ────────────────────────────────────────────────────

/// Pushes one event to every attached peer as independent supervised
/// tasks. A failing peer only costs itself its delivery.
pub(crate) fn fan_out(supervisor: &TaskSupervisor, registry: &PeerRegistry, event: &Event) {
    for peer in registry.snapshot() {
        let event = event.clone();
        supervisor.spawn(async move {
            if let Err(err) = peer.send_event(&event).await {
                debug!(peer = %peer.remote(), error = %err, "Event push failed");
            }
        });
    }
}

/// Starts the repeating heartbeat task: push to all peers, then wait
/// one interval, until shutdown cancels the pending wait.
pub(crate) fn spawn_heartbeat(
    supervisor: &TaskSupervisor,
    registry: Arc<PeerRegistry>,
    interval: Duration,
) {
    let token = supervisor.token();
    let fan_out_supervisor = supervisor.clone();
    let interval_ms = interval.as_millis() as i64;
    info!(interval_ms, "Heartbeat started");
    supervisor.spawn(async move {
        loop {
            fan_out(
                &fan_out_supervisor,
                &registry,
                &Event::meta_heartbeat(interval_ms),
            );
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }
        debug!("Heartbeat stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use libonebot_core::dispatcher::ActionDispatcher;
    use libonebot_core::error::TransportError;
    use libonebot_core::model::{Bot, EventKind};
    use serde_json::Value;

    struct MockSink {
        fail: bool,
        frames: Mutex<Vec<WsFrame>>,
    }

    impl MockSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                frames: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                frames: Mutex::new(Vec::new()),
            })
        }

        fn texts(&self) -> Vec<String> {
            self.frames
                .lock()
                .iter()
                .filter_map(|frame| match frame {
                    WsFrame::Text(text) => Some(text.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl FrameSink for MockSink {
        async fn send(&self, frame: WsFrame) -> TransportResult<()> {
            if self.fail {
                return Err(TransportError::SendFailed("mock sink".into()));
            }
            self.frames.lock().push(frame);
            Ok(())
        }
    }

    fn test_info() -> ImplInfo {
        ImplInfo::new("test-impl", "0.1.0")
    }

    fn test_dispatcher() -> (Arc<ActionDispatcher>, DispatcherHandle) {
        let dispatcher = ActionDispatcher::new(test_info(), vec![Bot::new("qq", "1")]);
        let handle = DispatcherHandle::new(&dispatcher);
        (dispatcher, handle)
    }

    #[tokio::test]
    async fn attach_sends_connect_before_registering() {
        let registry = PeerRegistry::new();
        let sink = MockSink::new();
        let peer = attach_peer(&registry, "test", sink.clone(), &test_info())
            .await
            .unwrap();
        assert_eq!(registry.count(), 1);

        let first: Value = serde_json::from_str(&sink.texts()[0]).unwrap();
        assert_eq!(first["type"], "meta");
        assert_eq!(first["detail_type"], "connect");
        assert_eq!(first["version"]["impl"], "test-impl");

        registry.deregister(peer.id());
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn failed_connect_send_does_not_register() {
        let registry = PeerRegistry::new();
        let err = attach_peer(&registry, "test", MockSink::failing(), &test_info())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::SendFailed(_)));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn serve_peer_answers_in_frame_order_and_framing() {
        let (_dispatcher, handle) = test_dispatcher();
        let registry = PeerRegistry::new();
        let sink = MockSink::new();
        let peer = attach_peer(&registry, "test", sink.clone(), &test_info())
            .await
            .unwrap();

        let get_status = rmp_serde::to_vec_named(&serde_json::json!({
            "action": "get_status",
            "params": {},
        }))
        .unwrap();
        let frames = stream::iter(vec![
            Ok(WsFrame::Text(
                r#"{"action": "get_version", "params": {}, "echo": "1"}"#.into(),
            )),
            Ok(WsFrame::Ignore),
            Ok(WsFrame::Binary(get_status)),
            Ok(WsFrame::Text("garbage".into())),
            Ok(WsFrame::Close),
        ]);

        serve_peer(
            frames,
            peer,
            registry.clone(),
            handle,
            CancellationToken::new(),
        )
        .await;

        // peer removed once the session ends
        assert_eq!(registry.count(), 0);

        let frames = sink.frames.lock().clone();
        // connect, then one response per request frame
        assert_eq!(frames.len(), 4);
        let version: Value = match &frames[1] {
            WsFrame::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        };
        assert_eq!(version["retcode"], 0);
        assert_eq!(version["echo"], "1");

        let status: Value = match &frames[2] {
            WsFrame::Binary(bytes) => rmp_serde::from_slice(bytes).unwrap(),
            other => panic!("expected binary frame, got {other:?}"),
        };
        assert_eq!(status["retcode"], 0);
        assert_eq!(status["data"]["good"], true);

        let bad: Value = match &frames[3] {
            WsFrame::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        };
        assert_eq!(bad["retcode"], 10001);
    }

    #[tokio::test]
    async fn fan_out_survives_a_failing_peer() {
        let registry = PeerRegistry::new();
        let healthy_a = MockSink::new();
        let healthy_b = MockSink::new();
        attach_peer(&registry, "a", healthy_a.clone(), &test_info())
            .await
            .unwrap();
        attach_peer(&registry, "b", healthy_b.clone(), &test_info())
            .await
            .unwrap();
        // a sink that fails after attach
        let broken = WsPeer::new(registry.allocate_id(), "c", MockSink::failing());
        registry.insert(broken);

        let supervisor = TaskSupervisor::new();
        fan_out(
            &supervisor,
            &registry,
            &Event::new(EventKind::Notice, "friend_increase"),
        );
        supervisor.shutdown().await;

        for sink in [&healthy_a, &healthy_b] {
            let texts = sink.texts();
            // connect plus the fanned-out event
            assert_eq!(texts.len(), 2);
            let event: Value = serde_json::from_str(&texts[1]).unwrap();
            assert_eq!(event["detail_type"], "friend_increase");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_ticks_until_cancelled() {
        let registry = PeerRegistry::new();
        let sink = MockSink::new();
        attach_peer(&registry, "a", sink.clone(), &test_info())
            .await
            .unwrap();

        let supervisor = TaskSupervisor::new();
        spawn_heartbeat(&supervisor, registry.clone(), Duration::from_secs(5));

        // beats at t=0, t=5 and t=10
        tokio::time::sleep(Duration::from_secs(11)).await;
        let beats: Vec<Value> = sink
            .texts()
            .iter()
            .skip(1) // connect event
            .map(|text| serde_json::from_str(text).unwrap())
            .collect();
        assert_eq!(beats.len(), 3);
        assert_eq!(beats[0]["detail_type"], "heartbeat");
        assert_eq!(beats[0]["interval"], 5000);

        // cancellation interrupts the pending wait
        supervisor.shutdown().await;
        let settled = sink.texts().len();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(sink.texts().len(), settled);
    }
}
