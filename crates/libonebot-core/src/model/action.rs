//! Action request and response payloads.

use crate::error::ActionError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::bot::BotSelf;

// =====================================================================
// Request
// =====================================================================

/// One action request as received from a peer.
///
/// `action` and `params` are mandatory on the wire; a payload missing
/// either does not deserialize and is answered with a bad-request
/// response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Action name, e.g. `"send_message"`.
    pub action: String,
    /// Action parameters, `{}` when the action takes none.
    pub params: Map<String, Value>,
    /// Which bot the action targets. Optional for single-bot implementations.
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_: Option<BotSelf>,
    /// Opaque correlation value, mirrored verbatim onto the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Map::new(),
            self_: None,
            echo: None,
        }
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_self(mut self, self_: BotSelf) -> Self {
        self.self_ = Some(self_);
        self
    }

    pub fn with_echo(mut self, echo: impl Into<String>) -> Self {
        self.echo = Some(echo.into());
        self
    }
}

// =====================================================================
// Response
// =====================================================================

/// Coarse outcome of an action, `ok` or `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Ok,
    Failed,
}

/// One action response.
///
/// `data` and `message` are always serialized, as `null` resp. empty
/// string when there is nothing to report; `echo` only appears when
/// the request carried one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: ActionStatus,
    /// Zero on success, a `retcode` constant otherwise.
    pub retcode: i64,
    /// Action result, `null` when the action yields nothing.
    pub data: Value,
    /// Human-readable error description, empty on success.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

impl ActionResponse {
    /// Successful response carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            status: ActionStatus::Ok,
            retcode: crate::retcode::OK,
            data,
            message: String::new(),
            echo: None,
        }
    }

    /// Failed response with a retcode and description.
    pub fn failed(retcode: i64, message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Failed,
            retcode,
            data: Value::Null,
            message: message.into(),
            echo: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Mirrors the request's `echo` field, if any.
    pub fn with_echo(mut self, echo: Option<String>) -> Self {
        self.echo = echo;
        self
    }
}

impl From<ActionError> for ActionResponse {
    fn from(err: ActionError) -> Self {
        Self {
            status: ActionStatus::Failed,
            retcode: err.retcode,
            data: err.data,
            message: err.message,
            echo: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_without_action_does_not_parse() {
        let err = serde_json::from_value::<ActionRequest>(json!({"params": {}}));
        assert!(err.is_err());
    }

    #[test]
    fn request_without_params_does_not_parse() {
        let err = serde_json::from_value::<ActionRequest>(json!({"action": "get_status"}));
        assert!(err.is_err());
    }

    #[test]
    fn minimal_request_parses() {
        let req: ActionRequest =
            serde_json::from_value(json!({"action": "get_status", "params": {}})).unwrap();
        assert!(req.params.is_empty());
        assert!(req.self_.is_none());
        assert!(req.echo.is_none());
    }

    #[test]
    fn response_serializes_echo_only_when_present() {
        let bare = serde_json::to_value(ActionResponse::ok(Value::Null)).unwrap();
        assert_eq!(bare["status"], "ok");
        assert_eq!(bare["retcode"], 0);
        assert!(bare.get("echo").is_none());

        let echoed = serde_json::to_value(
            ActionResponse::ok(Value::Null).with_echo(Some("tracking".into())),
        )
        .unwrap();
        assert_eq!(echoed["echo"], "tracking");
    }

    #[test]
    fn action_error_converts_to_failed_response() {
        let resp: ActionResponse =
            ActionError::bad_param("missing field `user_id`").into();
        assert_eq!(resp.status, ActionStatus::Failed);
        assert_eq!(resp.retcode, crate::retcode::BAD_PARAM);
        assert_eq!(resp.message, "missing field `user_id`");
    }
}
