//! # LibOneBot Transport
//!
//! OneBot Connect transport implementations for LibOneBot.
//!
//! Every transport here implements the [`Transport`] contract from
//! `libonebot-core`: it is bound to a [`DispatcherHandle`] once, started
//! under a [`TaskSupervisor`] and fed events through `emit_event`. An
//! implementation can attach any mix of them, one instance per kind.
//!
//! | Transport | Direction | Actions | Events |
//! |-----------|-----------|---------|--------|
//! | [`HttpServer`] | in | `POST /` | buffered for `get_latest_events` |
//! | [`HttpWebhook`] | out | piggy-backed on responses | one `POST` per event |
//! | [`WsServer`] | in | per session | pushed to every peer |
//! | [`WsReverse`] | out | per session | pushed to every peer |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use libonebot_transport::{HttpConfig, HttpServer, WsReverse, WsReverseConfig};
//!
//! let http = HttpServer::new(HttpConfig::default().with_port(8080))?;
//! let reverse = WsReverse::new(
//!     WsReverseConfig::new("ws://127.0.0.1:9000/").with_access_token("secret"),
//! )?;
//!
//! let ob = OneBotImpl::builder(info)
//!     .bot(bot)
//!     .transport(http)
//!     .transport(reverse)
//!     .build()?;
//! ```
//!
//! Requests and responses travel as JSON (`application/json`, text
//! frames) or msgpack (`application/msgpack`, binary frames); a response
//! always uses the encoding of its request. Events always go out as
//! JSON.

pub mod auth;
pub mod codec;
pub mod http;
pub mod webhook;
pub mod websocket;

pub use http::{EventBuffer, HttpConfig, HttpServer};
pub use webhook::{HttpWebhook, WebhookConfig};
pub use websocket::reverse::{WsReverse, WsReverseConfig};
pub use websocket::server::{WsServer, WsServerConfig};

// the contract types transports are written against, for convenience
pub use libonebot_core::dispatcher::DispatcherHandle;
pub use libonebot_core::supervisor::TaskSupervisor;
pub use libonebot_core::transport::{Transport, TransportKind};
