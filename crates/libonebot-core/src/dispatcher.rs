//! Action registration and dispatch.
//!
//! [`ActionDispatcher`] is the single point every transport routes
//! through: it resolves the target bot, validates parameters against
//! the action's declared schema and invokes the handler, turning every
//! possible failure into a structured [`ActionResponse`]. No handler
//! error, panic included, crosses the transport boundary.

use crate::error::{ActionError, BuildError};
use crate::model::{ActionRequest, ActionResponse, Bot, BotSelf, ImplInfo};
use crate::schema::ActionSchema;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

// =====================================================================
// Handlers
// =====================================================================

/// Everything a handler gets to see for one invocation.
///
/// `params` have already been validated: required parameters are
/// present with the declared type and defaults are filled in.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// The bot the action targets.
    pub bot: Bot,
    /// Validated action parameters.
    pub params: Map<String, Value>,
}

impl ActionContext {
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(Value::as_str)
    }

    pub fn param_i64(&self, name: &str) -> Option<i64> {
        self.param(name).and_then(Value::as_i64)
    }
}

/// A type-erased action handler.
///
/// Returning an [`ActionError`] inside the `anyhow::Error` passes its
/// retcode through to the response; any other error becomes a 20002.
pub type ActionHandler =
    Arc<dyn Fn(ActionContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Wraps an async closure into an [`ActionHandler`].
pub fn into_handler<F, Fut>(f: F) -> ActionHandler
where
    F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

#[derive(Clone)]
struct RegisteredAction {
    schema: ActionSchema,
    handler: ActionHandler,
}

// =====================================================================
// Dispatcher
// =====================================================================

/// The action engine of one implementation.
///
/// Holds the fixed bot set, the registered actions and the
/// implementation-level health flag. Built-in meta-actions
/// (`get_version`, `get_status`, `get_supported_actions`) are
/// registered on construction and can be overwritten like any other
/// action.
pub struct ActionDispatcher {
    info: ImplInfo,
    bots: Vec<Bot>,
    actions: RwLock<HashMap<String, RegisteredAction>>,
    good: AtomicBool,
}

impl ActionDispatcher {
    pub fn new(info: ImplInfo, bots: Vec<Bot>) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            info,
            bots,
            actions: RwLock::new(HashMap::new()),
            good: AtomicBool::new(true),
        });
        dispatcher.register_builtins();
        dispatcher
    }

    pub fn info(&self) -> &ImplInfo {
        &self.info
    }

    pub fn bots(&self) -> &[Bot] {
        &self.bots
    }

    pub fn find_bot(&self, selector: &BotSelf) -> Option<Bot> {
        self.bots.iter().find(|bot| bot.matches(selector)).cloned()
    }

    /// Implementation-level health, the `good` field of `get_status`.
    pub fn is_good(&self) -> bool {
        self.good.load(Ordering::Relaxed)
    }

    pub fn set_good(&self, good: bool) {
        self.good.store(good, Ordering::Relaxed);
    }

    /// The `get_status` payload: aggregate health plus one entry per bot.
    pub fn status_payload(&self) -> Value {
        json!({
            "good": self.is_good(),
            "bots": self.bots.iter().map(Bot::status_payload).collect::<Vec<_>>(),
        })
    }

    /// Registered action names, sorted.
    pub fn supported_actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Registers an action. Re-registration overwrites silently; the
    /// only invalid name is the empty one.
    pub fn register(
        &self,
        schema: ActionSchema,
        handler: ActionHandler,
    ) -> Result<(), BuildError> {
        if schema.action().is_empty() {
            return Err(BuildError::EmptyActionName);
        }
        self.insert(schema, handler);
        Ok(())
    }

    fn insert(&self, schema: ActionSchema, handler: ActionHandler) {
        let name = schema.action().to_owned();
        debug!(action = %name, "Registered action");
        self.actions
            .write()
            .insert(name, RegisteredAction { schema, handler });
    }

    fn register_builtins(self: &Arc<Self>) {
        let info = self.info.clone();
        self.insert(
            ActionSchema::new("get_version"),
            into_handler(move |_ctx| {
                let version = info.version_payload();
                async move { Ok(version) }
            }),
        );

        let weak = Arc::downgrade(self);
        self.insert(
            ActionSchema::new("get_status"),
            into_handler(move |_ctx| {
                let weak = weak.clone();
                async move {
                    let dispatcher = upgrade(&weak)?;
                    Ok(dispatcher.status_payload())
                }
            }),
        );

        let weak = Arc::downgrade(self);
        self.insert(
            ActionSchema::new("get_supported_actions"),
            into_handler(move |_ctx| {
                let weak = weak.clone();
                async move {
                    let dispatcher = upgrade(&weak)?;
                    Ok(json!(dispatcher.supported_actions()))
                }
            }),
        );
    }

    // =================================================================
    // Dispatch
    // =================================================================

    /// Handles one action request.
    ///
    /// Never fails: every outcome, including handler panics, comes back
    /// as an [`ActionResponse`] carrying the request's `echo`.
    pub async fn handle(&self, request: ActionRequest) -> ActionResponse {
        let echo = request.echo.clone();
        self.dispatch(request).await.with_echo(echo)
    }

    async fn dispatch(&self, request: ActionRequest) -> ActionResponse {
        let registered = self.actions.read().get(&request.action).cloned();
        let Some(registered) = registered else {
            debug!(action = %request.action, "Unsupported action");
            return ActionError::unsupported_action(format!(
                "action not supported: {}",
                request.action
            ))
            .into();
        };

        let bot = match self.resolve_bot(request.self_.as_ref()) {
            Ok(bot) => bot,
            Err(err) => {
                debug!(action = %request.action, retcode = err.retcode, "Bot resolution failed");
                return err.into();
            }
        };

        let mut params = request.params;
        if let Err(err) = registered.schema.validate(&mut params) {
            debug!(
                action = %request.action,
                retcode = err.retcode,
                reason = %err.message,
                "Rejected action params",
            );
            return err.into();
        }

        let ctx = ActionContext { bot, params };
        match AssertUnwindSafe((registered.handler)(ctx)).catch_unwind().await {
            Ok(Ok(data)) => ActionResponse::ok(data),
            Ok(Err(err)) => match err.downcast::<ActionError>() {
                Ok(action_err) => action_err.into(),
                Err(other) => {
                    error!(action = %request.action, error = %other, "Action handler failed");
                    ActionError::internal("internal handler error").into()
                }
            },
            Err(panic) => {
                error!(
                    action = %request.action,
                    reason = panic_reason(panic.as_ref()),
                    "Action handler panicked",
                );
                ActionError::internal("internal handler error").into()
            }
        }
    }

    fn resolve_bot(&self, selector: Option<&BotSelf>) -> Result<Bot, ActionError> {
        match selector {
            None if self.bots.len() > 1 => Err(ActionError::who_am_i(
                "multiple bots available, request must carry `self`",
            )),
            None => self
                .bots
                .first()
                .cloned()
                .ok_or_else(|| ActionError::who_am_i("no bots registered")),
            Some(selector) => self.find_bot(selector).ok_or_else(|| {
                ActionError::unknown_self(format!(
                    "unknown bot: {}:{}",
                    selector.platform, selector.user_id
                ))
            }),
        }
    }
}

fn upgrade(weak: &Weak<ActionDispatcher>) -> anyhow::Result<Arc<ActionDispatcher>> {
    weak.upgrade()
        .ok_or_else(|| anyhow::anyhow!("implementation is shutting down"))
}

fn panic_reason(panic: &(dyn Any + Send)) -> &str {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        reason
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        reason
    } else {
        "non-string panic payload"
    }
}

// =====================================================================
// Handle
// =====================================================================

/// A transport's reference to the dispatcher.
///
/// Weak on purpose: transports outlive the dispatcher during shutdown
/// teardown, and a dead handle answers with a failed response instead
/// of keeping the whole implementation alive.
#[derive(Clone)]
pub struct DispatcherHandle {
    inner: Weak<ActionDispatcher>,
    info: ImplInfo,
}

impl DispatcherHandle {
    pub fn new(dispatcher: &Arc<ActionDispatcher>) -> Self {
        Self {
            inner: Arc::downgrade(dispatcher),
            info: dispatcher.info.clone(),
        }
    }

    /// Implementation identity, available even after the dispatcher is
    /// gone. Transports use it for headers and the connect event.
    pub fn info(&self) -> &ImplInfo {
        &self.info
    }

    pub async fn dispatch(&self, request: ActionRequest) -> ActionResponse {
        match self.inner.upgrade() {
            Some(dispatcher) => dispatcher.handle(request).await,
            None => {
                let echo = request.echo;
                ActionResponse::failed(
                    crate::retcode::INTERNAL_HANDLER_ERROR,
                    "implementation is shutting down",
                )
                .with_echo(echo)
            }
        }
    }

    /// Registers a transport-owned action, like the HTTP transport's
    /// `get_latest_events`. Failures are logged, not fatal.
    pub fn register_action(&self, schema: ActionSchema, handler: ActionHandler) {
        match self.inner.upgrade() {
            Some(dispatcher) => {
                if let Err(err) = dispatcher.register(schema, handler) {
                    warn!(error = %err, "Ignoring invalid action registration");
                }
            }
            None => warn!(
                action = %schema.action(),
                "Dropping action registration, dispatcher is gone",
            ),
        }
    }
}

impl std::fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("impl", &self.info.name)
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
