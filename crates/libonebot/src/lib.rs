//! # LibOneBot
//!
//! Building blocks for OneBot 12 implementations in Rust.
//!
//! ## Overview
//!
//! LibOneBot is not a bot framework: it is the protocol half of an
//! implementation. You bring the platform glue (however your IM
//! platform is driven) and register it as action handlers; LibOneBot
//! handles OneBot Connect transports, parameter validation, the retcode
//! ladder and event delivery.
//!
//! ```text
//! ┌─────────────────────┐
//! │ your platform glue  │  (send messages, watch the platform)
//! ├─────────────────────┤
//! │ libonebot-core      │  (dispatcher, data model, container)
//! │ libonebot-transport │  (HTTP, webhook, WebSocket, reverse WS)
//! │ libonebot-runtime   │  (config, logging, signals)
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use libonebot::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().load()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let ob = config
//!         .builder(ImplInfo::new("my-impl", "0.1.0"))?
//!         .action(
//!             ActionSchema::new("send_message")
//!                 .param(ParamSpec::required("detail_type", ParamType::String))
//!                 .param(ParamSpec::required("user_id", ParamType::String))
//!                 .param(ParamSpec::required("message", ParamType::Array)),
//!             |ctx| async move {
//!                 // deliver ctx.params["message"] to the platform here
//!                 Ok(json!({"message_id": "1", "time": 0.0}))
//!             },
//!         )
//!         .build()?;
//!
//!     runner::run(&ob).await?;
//!     Ok(())
//! }
//! ```

pub use libonebot_core as core;
pub use libonebot_runtime as runtime;
pub use libonebot_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use libonebot::prelude::*;
/// ```
pub mod prelude {
    // Protocol core
    pub use libonebot_core::prelude::*;

    // Transports
    pub use libonebot_transport::{
        HttpConfig, HttpServer, HttpWebhook, WebhookConfig, WsReverse, WsReverseConfig, WsServer,
        WsServerConfig,
    };

    // Runtime entry points
    pub use libonebot_runtime::config::{ConfigLoader, RuntimeConfig};
    pub use libonebot_runtime::{logging, runner};
}
