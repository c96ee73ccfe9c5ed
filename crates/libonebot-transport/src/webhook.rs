//! HTTP webhook transport.
//!
//! A pure client: every event becomes one outbound POST to the
//! configured URL. The receiving application may piggy-back action
//! requests on a 200 response; they are dispatched in order and their
//! responses discarded, since there is no channel to return them on.

use crate::codec::{WireFormat, encode_event};
use async_trait::async_trait;
use libonebot_core::dispatcher::DispatcherHandle;
use libonebot_core::error::{TransportError, TransportResult};
use libonebot_core::model::{ActionRequest, Event};
use libonebot_core::supervisor::TaskSupervisor;
use libonebot_core::transport::{Transport, TransportKind};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{ClientBuilder, StatusCode, Url};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Settings of the webhook transport.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Where events are POSTed to.
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub access_token: Option<String>,
    /// Total per-delivery timeout; zero disables the timeout.
    pub timeout: Duration,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: None,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The HTTP webhook transport.
#[derive(Debug)]
pub struct HttpWebhook {
    config: WebhookConfig,
    client: reqwest::Client,
    dispatcher: OnceLock<DispatcherHandle>,
}

impl HttpWebhook {
    pub fn new(config: WebhookConfig) -> TransportResult<Self> {
        config
            .url
            .parse::<Url>()
            .map_err(|err| TransportError::InvalidConfig(format!("webhook url: {err}")))?;

        let mut builder = ClientBuilder::new();
        if !config.timeout.is_zero() {
            builder = builder.timeout(config.timeout);
        }
        let client = builder
            .build()
            .map_err(|err| TransportError::Io(err.to_string()))?;

        Ok(Self {
            config,
            client,
            dispatcher: OnceLock::new(),
        })
    }

    fn handle(&self) -> TransportResult<&DispatcherHandle> {
        self.dispatcher.get().ok_or(TransportError::NotBound)
    }

    /// Parses a 200 response body as a batch of action requests and
    /// dispatches them in order.
    async fn run_piggyback(
        &self,
        handle: &DispatcherHandle,
        response: reqwest::Response,
    ) -> TransportResult<()> {
        let format = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(WireFormat::from_content_type)
            .ok_or_else(|| {
                TransportError::Codec("piggy-back response without a usable content type".into())
            })?;

        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::SendFailed(err.to_string()))?;
        let batch: Value = match format {
            WireFormat::Json => serde_json::from_slice(&body)
                .map_err(|err| TransportError::Codec(format!("malformed piggy-back body: {err}")))?,
            WireFormat::MsgPack => rmp_serde::from_slice(&body)
                .map_err(|err| TransportError::Codec(format!("malformed piggy-back body: {err}")))?,
        };
        let Some(items) = batch.as_array() else {
            return Err(TransportError::Codec(
                "piggy-back body is not an array".into(),
            ));
        };

        for item in items {
            match serde_json::from_value::<ActionRequest>(item.clone()) {
                Ok(request) => {
                    let response = handle.dispatch(request).await;
                    trace!(
                        retcode = response.retcode,
                        "Discarded piggy-backed action response",
                    );
                }
                Err(err) => debug!(error = %err, "Skipping malformed piggy-backed action"),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpWebhook {
    fn kind(&self) -> TransportKind {
        TransportKind::HttpWebhook
    }

    fn bind(&self, dispatcher: DispatcherHandle) -> TransportResult<()> {
        self.dispatcher
            .set(dispatcher)
            .map_err(|_| TransportError::AlreadyBound)
    }

    async fn start(&self, _supervisor: &TaskSupervisor) -> TransportResult<()> {
        self.handle()?;
        info!(url = %self.config.url, "HTTP webhook ready");
        Ok(())
    }

    /// One POST per event.
    ///
    /// 204 means delivered. 200 means delivered with piggy-backed
    /// actions to run. Anything else, including timeouts and malformed
    /// piggy-back bodies, is a delivery failure and is not retried.
    async fn emit_event(&self, event: &Event) -> TransportResult<()> {
        let handle = self.handle()?;
        let info = handle.info();

        let mut request = self
            .client
            .post(&self.config.url)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, info.user_agent())
            .header("X-OneBot-Version", &info.onebot_version)
            .header("X-Impl", &info.name)
            .body(encode_event(event)?);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        trace!(url = %self.config.url, event_id = %event.id, "Delivering event");
        let response = request
            .send()
            .await
            .map_err(|err| TransportError::SendFailed(err.to_string()))?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            StatusCode::OK => self.run_piggyback(handle, response).await,
            status => Err(TransportError::SendFailed(format!(
                "webhook returned {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Bytes;
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use libonebot_core::dispatcher::{ActionDispatcher, into_handler};
    use libonebot_core::model::{Bot, EventKind, ImplInfo};
    use libonebot_core::schema::ActionSchema;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    #[derive(Clone)]
    struct Stub {
        status: StatusCode,
        content_type: &'static str,
        body: Vec<u8>,
        seen_headers: Arc<Mutex<Vec<HeaderMap>>>,
    }

    impl Stub {
        fn new(status: StatusCode) -> Self {
            Self {
                status,
                content_type: "application/json",
                body: Vec::new(),
                seen_headers: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
            self.body = body.into();
            self
        }
    }

    async fn answer(stub: Stub, headers: HeaderMap, _body: Bytes) -> impl IntoResponse {
        stub.seen_headers.lock().push(headers);
        (
            stub.status,
            [(CONTENT_TYPE, stub.content_type)],
            stub.body.clone(),
        )
    }

    async fn stub_server(stub: Stub) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new().route(
            "/",
            post(move |headers: HeaderMap, body: Bytes| answer(stub.clone(), headers, body)),
        );
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn bound_webhook(addr: SocketAddr) -> (Arc<ActionDispatcher>, HttpWebhook) {
        let dispatcher =
            ActionDispatcher::new(ImplInfo::new("test-impl", "0.1.0"), vec![Bot::new("qq", "1")]);
        let webhook =
            HttpWebhook::new(WebhookConfig::new(format!("http://{addr}/")).with_access_token("tok"))
                .unwrap();
        webhook.bind(DispatcherHandle::new(&dispatcher)).unwrap();
        (dispatcher, webhook)
    }

    fn heartbeat() -> Event {
        Event::new(EventKind::Meta, "heartbeat")
    }

    #[test]
    fn invalid_url_is_rejected() {
        let err = HttpWebhook::new(WebhookConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, TransportError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn no_content_means_delivered_and_headers_are_set() {
        let stub = Stub::new(StatusCode::NO_CONTENT);
        let seen = stub.seen_headers.clone();
        let addr = stub_server(stub).await;
        let (_dispatcher, webhook) = bound_webhook(addr);

        webhook.emit_event(&heartbeat()).await.unwrap();

        let headers = seen.lock();
        let sent = headers.first().unwrap();
        assert_eq!(sent["x-onebot-version"], "12");
        assert_eq!(sent["x-impl"], "test-impl");
        assert_eq!(sent[AUTHORIZATION.as_str()], "Bearer tok");
        let ua = sent[USER_AGENT.as_str()].to_str().unwrap();
        assert!(ua.starts_with("OneBot/12 "));
        assert!(ua.ends_with("test-impl/0.1.0"));
    }

    #[tokio::test]
    async fn piggybacked_actions_are_dispatched_in_order() {
        let batch = json!([
            {"action": "mark", "params": {}, "echo": "p1"},
            "not an action request",
            {"action": "definitely_unknown", "params": {}},
        ]);
        let addr = stub_server(
            Stub::new(StatusCode::OK).with_body(serde_json::to_vec(&batch).unwrap()),
        )
        .await;
        let (dispatcher, webhook) = bound_webhook(addr);

        let marks = Arc::new(AtomicUsize::new(0));
        let counter = marks.clone();
        dispatcher
            .register(
                ActionSchema::new("mark"),
                into_handler(move |_ctx| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(Value::Null)
                    }
                }),
            )
            .unwrap();

        webhook.emit_event(&heartbeat()).await.unwrap();
        assert_eq!(marks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unexpected_status_is_a_delivery_failure() {
        let addr = stub_server(Stub::new(StatusCode::INTERNAL_SERVER_ERROR)).await;
        let (_dispatcher, webhook) = bound_webhook(addr);
        let err = webhook.emit_event(&heartbeat()).await.unwrap_err();
        assert!(matches!(err, TransportError::SendFailed(_)));
    }

    #[tokio::test]
    async fn malformed_piggyback_is_a_delivery_failure() {
        let addr = stub_server(Stub::new(StatusCode::OK).with_body("{}")).await;
        let (_dispatcher, webhook) = bound_webhook(addr);
        let err = webhook.emit_event(&heartbeat()).await.unwrap_err();
        assert!(matches!(err, TransportError::Codec(_)));
    }
}
