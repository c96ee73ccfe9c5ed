//! # LibOneBot Core
//!
//! The protocol engine shared by every LibOneBot implementation.
//!
//! This crate provides the OneBot 12 data model, the action dispatcher
//! and the contracts the transport crate plugs into. It knows nothing
//! about sockets; transports live in `libonebot-transport` and talk to
//! the dispatcher through [`DispatcherHandle`].
//!
//! ## Pieces
//!
//! - **Data model**: wire types for actions, responses, events, message
//!   segments and bot identities ([`model`])
//! - **Dispatch**: action registration, parameter validation and the
//!   retcode ladder ([`ActionDispatcher`], [`ActionSchema`])
//! - **Container**: [`OneBotImpl`] wires bots, actions and transports
//!   together and fans events out
//! - **Supervision**: cooperative shutdown of every background task
//!   ([`TaskSupervisor`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use libonebot_core::{
//!     ActionSchema, Bot, ImplInfo, OneBotImpl, ParamSpec, ParamType,
//! };
//! use serde_json::json;
//!
//! let ob = OneBotImpl::builder(ImplInfo::new("my-impl", "0.1.0"))
//!     .bot(Bot::new("qq", "1234"))
//!     .transport(http_server)
//!     .action(
//!         ActionSchema::new("send_message")
//!             .param(ParamSpec::required("detail_type", ParamType::String))
//!             .param(ParamSpec::required("message", ParamType::Array)),
//!         |ctx| async move {
//!             // deliver to the platform here
//!             Ok(json!({"message_id": "1", "time": 0}))
//!         },
//!     )
//!     .build()?;
//! ```

pub mod app;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod retcode;
pub mod schema;
pub mod supervisor;
pub mod transport;

pub use app::{OneBotImpl, OneBotImplBuilder};
pub use dispatcher::{
    ActionContext, ActionDispatcher, ActionHandler, DispatcherHandle, into_handler,
};
pub use error::{ActionError, BuildError, BuildResult, TransportError, TransportResult};
pub use lifecycle::Lifecycle;
pub use model::{
    ActionRequest, ActionResponse, ActionStatus, Bot, BotSelf, Event, EventKind, ImplInfo,
    Segment,
};
pub use schema::{ActionSchema, ParamSpec, ParamType};
pub use supervisor::TaskSupervisor;
pub use transport::{Transport, TransportKind};

/// Prelude for common imports.
pub mod prelude {
    pub use super::app::{OneBotImpl, OneBotImplBuilder};
    pub use super::dispatcher::{ActionContext, DispatcherHandle, into_handler};
    pub use super::error::{ActionError, BuildError, TransportError};
    pub use super::model::{
        ActionRequest, ActionResponse, ActionStatus, Bot, BotSelf, Event, EventKind, ImplInfo,
        Segment,
    };
    pub use super::retcode;
    pub use super::schema::{ActionSchema, ParamSpec, ParamType};
    pub use super::supervisor::TaskSupervisor;
    pub use super::transport::{Transport, TransportKind};
}
