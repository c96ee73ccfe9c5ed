//! Startup and shutdown hooks.

use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;

/// A type-erased lifecycle hook.
pub type HookFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Ordered startup and shutdown hooks.
///
/// Transports register their background loops here (heartbeat, reverse
/// dialers) and implementations can add their own, e.g. to connect to
/// the platform on startup. Startup hooks run in registration order
/// before any transport accepts traffic; shutdown hooks run in
/// registration order after the transports stopped.
#[derive(Clone, Default)]
pub struct Lifecycle {
    on_startup: Vec<HookFn>,
    on_shutdown: Vec<HookFn>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_startup<F, Fut>(&mut self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_startup.push(Arc::new(move || Box::pin(hook())));
    }

    pub fn on_shutdown<F, Fut>(&mut self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_shutdown.push(Arc::new(move || Box::pin(hook())));
    }

    pub async fn startup(&self) {
        debug!(hooks = self.on_startup.len(), "Running startup hooks");
        for hook in &self.on_startup {
            hook().await;
        }
    }

    pub async fn shutdown(&self) {
        debug!(hooks = self.on_shutdown.len(), "Running shutdown hooks");
        for hook in &self.on_shutdown {
            hook().await;
        }
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("on_startup", &self.on_startup.len())
            .field("on_shutdown", &self.on_shutdown.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn hooks_run_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut lifecycle = Lifecycle::new();

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            lifecycle.on_startup(move || {
                let order = order.clone();
                async move {
                    order.lock().push(tag);
                }
            });
        }

        lifecycle.startup().await;
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }
}
