//! Wire-level value types of the OneBot Connect protocol.

pub mod action;
pub mod bot;
pub mod event;
pub mod segment;

pub use action::{ActionRequest, ActionResponse, ActionStatus};
pub use bot::{Bot, BotSelf};
pub use event::{Event, EventKind};
pub use segment::{Segment, alt_message};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Identity of one OneBot implementation.
///
/// Rendered by the `get_version` meta-action, the `meta.connect` event and
/// the user-agent / `X-Impl` headers of client transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplInfo {
    /// Implementation name, e.g. `"my-impl"`.
    pub name: String,
    /// Implementation version.
    pub version: String,
    /// OneBot protocol version the implementation speaks.
    pub onebot_version: String,
}

impl ImplInfo {
    /// Creates an identity speaking OneBot 12.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            onebot_version: "12".into(),
        }
    }

    /// The `get_version` payload: `{impl, version, onebot_version}`.
    pub fn version_payload(&self) -> Value {
        json!({
            "impl": self.name,
            "version": self.version,
            "onebot_version": self.onebot_version,
        })
    }

    /// The user-agent string client transports identify themselves with.
    pub fn user_agent(&self) -> String {
        format!(
            "OneBot/{} libonebot/{} {}/{}",
            self.onebot_version,
            env!("CARGO_PKG_VERSION"),
            self.name,
            self.version,
        )
    }

    /// The WebSocket sub-protocol value, `{onebot_version}.{impl_name}`.
    pub fn ws_subprotocol(&self) -> String {
        format!("{}.{}", self.onebot_version, self.name)
    }
}
