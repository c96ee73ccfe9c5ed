//! The implementation container.
//!
//! [`OneBotImpl`] ties the pieces together: one dispatcher, one or more
//! transports, a task supervisor and the user's lifecycle hooks. It is
//! assembled through [`OneBotImplBuilder`], which fails fast on
//! configurations that could never serve traffic.

use crate::dispatcher::{
    ActionContext, ActionDispatcher, ActionHandler, DispatcherHandle, into_handler,
};
use crate::error::{BuildError, TransportResult};
use crate::lifecycle::Lifecycle;
use crate::model::{Bot, BotSelf, Event, ImplInfo};
use crate::schema::ActionSchema;
use crate::supervisor::TaskSupervisor;
use crate::transport::{Transport, TransportKind};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

// =====================================================================
// Builder
// =====================================================================

/// Assembles an [`OneBotImpl`].
pub struct OneBotImplBuilder {
    info: ImplInfo,
    bots: Vec<Bot>,
    transports: Vec<Arc<dyn Transport>>,
    actions: Vec<(ActionSchema, ActionHandler)>,
    lifecycle: Lifecycle,
}

impl OneBotImplBuilder {
    fn new(info: ImplInfo) -> Self {
        Self {
            info,
            bots: Vec::new(),
            transports: Vec::new(),
            actions: Vec::new(),
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn bot(mut self, bot: Bot) -> Self {
        self.bots.push(bot);
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transports.push(Arc::new(transport));
        self
    }

    /// Attaches an already shared transport.
    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Registers an action handler together with its parameter schema.
    pub fn action<F, Fut>(mut self, schema: ActionSchema, handler: F) -> Self
    where
        F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.actions.push((schema, into_handler(handler)));
        self
    }

    pub fn on_startup<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lifecycle.on_startup(hook);
        self
    }

    pub fn on_shutdown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lifecycle.on_shutdown(hook);
        self
    }

    /// Builds the implementation.
    ///
    /// Fails when no bot or no transport is attached, or an action was
    /// registered under an empty name. A second transport of an already
    /// attached kind is dropped with a warning; each kind serves once.
    pub fn build(self) -> Result<OneBotImpl, BuildError> {
        if self.bots.is_empty() {
            return Err(BuildError::NoBots);
        }
        if self.transports.is_empty() {
            return Err(BuildError::NoTransports);
        }

        let mut seen = HashSet::new();
        let mut transports = Vec::with_capacity(self.transports.len());
        for transport in self.transports {
            if seen.insert(transport.kind()) {
                transports.push(transport);
            } else {
                warn!(kind = %transport.kind(), "Duplicate transport kind, dropping");
            }
        }

        let dispatcher = ActionDispatcher::new(self.info, self.bots);
        for (schema, handler) in self.actions {
            dispatcher.register(schema, handler)?;
        }

        Ok(OneBotImpl {
            inner: Arc::new(Inner {
                dispatcher,
                transports,
                supervisor: TaskSupervisor::new(),
                lifecycle: self.lifecycle,
            }),
        })
    }
}

// =====================================================================
// Implementation
// =====================================================================

struct Inner {
    dispatcher: Arc<ActionDispatcher>,
    transports: Vec<Arc<dyn Transport>>,
    supervisor: TaskSupervisor,
    lifecycle: Lifecycle,
}

/// A running (or runnable) OneBot implementation.
///
/// Cheap to clone; clones share all state. The typical flow is
/// `builder(..).build()?`, then [`OneBotImpl::start`], then any number
/// of [`OneBotImpl::emit`] calls from the platform glue, and finally
/// [`OneBotImpl::shutdown`].
#[derive(Clone)]
pub struct OneBotImpl {
    inner: Arc<Inner>,
}

impl OneBotImpl {
    pub fn builder(info: ImplInfo) -> OneBotImplBuilder {
        OneBotImplBuilder::new(info)
    }

    pub fn info(&self) -> &ImplInfo {
        self.inner.dispatcher.info()
    }

    pub fn dispatcher(&self) -> &Arc<ActionDispatcher> {
        &self.inner.dispatcher
    }

    pub fn dispatcher_handle(&self) -> DispatcherHandle {
        DispatcherHandle::new(&self.inner.dispatcher)
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.inner.supervisor
    }

    /// Binds and starts every transport, then runs the startup hooks.
    pub async fn start(&self) -> TransportResult<()> {
        for transport in &self.inner.transports {
            transport.bind(self.dispatcher_handle())?;
            transport.start(&self.inner.supervisor).await?;
            info!(kind = %transport.kind(), "Transport started");
        }
        self.inner.lifecycle.startup().await;
        Ok(())
    }

    /// Stops every supervised task, waits for them, then runs the
    /// shutdown hooks.
    pub async fn shutdown(&self) {
        info!("Shutting down");
        self.inner.supervisor.shutdown().await;
        self.inner.lifecycle.shutdown().await;
    }

    /// Pushes an event through every attached transport.
    ///
    /// Deliveries run as independent supervised tasks; a slow or failing
    /// transport never delays the others.
    pub fn emit(&self, event: Event) {
        self.emit_filtered(event, |_| true);
    }

    /// Pushes an event through the transports of the given kinds only.
    pub fn emit_to(&self, event: Event, kinds: &[TransportKind]) {
        self.emit_filtered(event, |kind| kinds.contains(&kind));
    }

    fn emit_filtered(&self, event: Event, keep: impl Fn(TransportKind) -> bool) {
        for transport in &self.inner.transports {
            if !keep(transport.kind()) {
                continue;
            }
            let transport = transport.clone();
            let event = event.clone();
            self.inner.supervisor.spawn(async move {
                if let Err(err) = transport.emit_event(&event).await {
                    warn!(
                        kind = %transport.kind(),
                        event_id = %event.id,
                        error = %err,
                        "Event delivery failed",
                    );
                }
            });
        }
    }

    /// Flips one bot's online flag and announces the new status.
    ///
    /// The `meta.status_update` event only goes to push transports; the
    /// polling HTTP buffer never carries it. Returns false when the
    /// selector matches no registered bot.
    pub fn update_bot_status(&self, selector: &BotSelf, online: bool) -> bool {
        let Some(bot) = self.inner.dispatcher.find_bot(selector) else {
            warn!(
                platform = %selector.platform,
                user_id = %selector.user_id,
                "Status update for unknown bot",
            );
            return false;
        };
        bot.set_online(online);
        info!(bot_id = %bot.id(), online, "Bot status updated");
        let event = Event::meta_status_update(self.inner.dispatcher.status_payload());
        self.emit_filtered(event, |kind| kind.is_push());
        true
    }

    /// Sets the implementation-level health flag reported by `get_status`.
    pub fn set_good(&self, good: bool) {
        self.inner.dispatcher.set_good(good);
    }
}

impl std::fmt::Debug for OneBotImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneBotImpl")
            .field("impl", &self.info().name)
            .field("bots", &self.inner.dispatcher.bots().len())
            .field("transports", &self.inner.transports.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::model::EventKind;
    use crate::schema::ActionSchema;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockTransport {
        kind: TransportKind,
        fail: bool,
        bound: AtomicBool,
        seen: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn new(kind: TransportKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail: false,
                bound: AtomicBool::new(false),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(kind: TransportKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail: true,
                bound: AtomicBool::new(false),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        fn bind(&self, _dispatcher: DispatcherHandle) -> TransportResult<()> {
            self.bound.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn start(&self, _supervisor: &TaskSupervisor) -> TransportResult<()> {
            Ok(())
        }

        async fn emit_event(&self, event: &Event) -> TransportResult<()> {
            if self.fail {
                return Err(TransportError::SendFailed("mock failure".into()));
            }
            self.seen.lock().push(event.detail_type.clone());
            Ok(())
        }
    }

    fn info() -> ImplInfo {
        ImplInfo::new("test-impl", "0.1.0")
    }

    #[test]
    fn build_requires_bots_and_transports() {
        let err = OneBotImpl::builder(info())
            .transport_arc(MockTransport::new(TransportKind::Http))
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::NoBots));

        let err = OneBotImpl::builder(info())
            .bot(Bot::new("qq", "1"))
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::NoTransports));
    }

    #[test]
    fn empty_action_name_fails_build() {
        let err = OneBotImpl::builder(info())
            .bot(Bot::new("qq", "1"))
            .transport_arc(MockTransport::new(TransportKind::Http))
            .action(ActionSchema::new(""), |_ctx| async move {
                Ok(Value::Null)
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::EmptyActionName));
    }

    #[tokio::test]
    async fn duplicate_transport_kinds_are_dropped() {
        let first = MockTransport::new(TransportKind::WebSocket);
        let second = MockTransport::new(TransportKind::WebSocket);
        let ob = OneBotImpl::builder(info())
            .bot(Bot::new("qq", "1"))
            .transport_arc(first.clone())
            .transport_arc(second.clone())
            .build()
            .unwrap();

        ob.start().await.unwrap();
        assert!(first.bound.load(Ordering::SeqCst));
        assert!(!second.bound.load(Ordering::SeqCst));
        ob.shutdown().await;
    }

    #[tokio::test]
    async fn emit_survives_one_failing_transport() {
        let healthy = MockTransport::new(TransportKind::WebSocket);
        let broken = MockTransport::failing(TransportKind::HttpWebhook);
        let ob = OneBotImpl::builder(info())
            .bot(Bot::new("qq", "1"))
            .transport_arc(broken)
            .transport_arc(healthy.clone())
            .build()
            .unwrap();

        ob.emit(Event::new(EventKind::Notice, "friend_increase"));
        // shutdown waits for the fan-out tasks
        ob.shutdown().await;
        assert_eq!(*healthy.seen.lock(), vec!["friend_increase"]);
    }

    #[tokio::test]
    async fn status_update_skips_the_polling_transport() {
        let poll = MockTransport::new(TransportKind::Http);
        let push = MockTransport::new(TransportKind::WebSocket);
        let ob = OneBotImpl::builder(info())
            .bot(Bot::new("qq", "1"))
            .transport_arc(poll.clone())
            .transport_arc(push.clone())
            .build()
            .unwrap();

        assert!(ob.update_bot_status(&BotSelf::new("qq", "1"), false));
        assert!(!ob.update_bot_status(&BotSelf::new("qq", "404"), false));
        ob.shutdown().await;

        assert!(poll.seen.lock().is_empty());
        assert_eq!(*push.seen.lock(), vec!["status_update"]);
        assert!(!ob.dispatcher().bots()[0].is_online());
    }

    #[tokio::test]
    async fn lifecycle_hooks_wrap_the_run() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let up = order.clone();
        let down = order.clone();
        let ob = OneBotImpl::builder(info())
            .bot(Bot::new("qq", "1"))
            .transport_arc(MockTransport::new(TransportKind::Http))
            .on_startup(move || {
                let up = up.clone();
                async move { up.lock().push("up") }
            })
            .on_shutdown(move || {
                let down = down.clone();
                async move { down.lock().push("down") }
            })
            .build()
            .unwrap();

        ob.start().await.unwrap();
        ob.shutdown().await;
        assert_eq!(*order.lock(), vec!["up", "down"]);
    }

    #[tokio::test]
    async fn status_payload_reflects_good_flag() {
        let ob = OneBotImpl::builder(info())
            .bot(Bot::new("qq", "1"))
            .transport_arc(MockTransport::new(TransportKind::Http))
            .build()
            .unwrap();

        let resp = ob
            .dispatcher()
            .handle(serde_json::from_value(json!({"action": "get_status", "params": {}})).unwrap())
            .await;
        assert_eq!(resp.data["good"], true);

        ob.set_good(false);
        let resp = ob
            .dispatcher()
            .handle(serde_json::from_value(json!({"action": "get_status", "params": {}})).unwrap())
            .await;
        assert_eq!(resp.data["good"], false);
    }
}
