//! Wire encoding of requests, responses and events.
//!
//! OneBot Connect bodies are either JSON or msgpack, negotiated via the
//! content type on HTTP and via the frame type (text vs. binary) on
//! WebSocket. Events are always pushed as JSON text.

use libonebot_core::error::{TransportError, TransportResult};
use libonebot_core::model::{ActionRequest, ActionResponse, Event};
use libonebot_core::retcode;
use serde_json::Value;

/// One of the two supported body encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Json,
    MsgPack,
}

impl WireFormat {
    /// Maps a content-type header to a format. Parameters after `;`
    /// (like `charset`) are ignored.
    pub fn from_content_type(value: &str) -> Option<Self> {
        let mime = value.split(';').next().unwrap_or("").trim();
        if mime.eq_ignore_ascii_case("application/json") {
            Some(WireFormat::Json)
        } else if mime.eq_ignore_ascii_case("application/msgpack")
            || mime.eq_ignore_ascii_case("application/x-msgpack")
        {
            Some(WireFormat::MsgPack)
        } else {
            None
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            WireFormat::Json => "application/json",
            WireFormat::MsgPack => "application/msgpack",
        }
    }

    /// Decodes one action request.
    ///
    /// Failures come back as a ready-to-send 10001 response. When the
    /// body is at least a well-formed map, its `echo` is salvaged onto
    /// the failure so the caller can still correlate it.
    pub fn decode_request(&self, bytes: &[u8]) -> Result<ActionRequest, ActionResponse> {
        let value: Value = match self {
            WireFormat::Json => serde_json::from_slice(bytes)
                .map_err(|err| bad_request(None, &format!("invalid json: {err}")))?,
            WireFormat::MsgPack => rmp_serde::from_slice(bytes)
                .map_err(|err| bad_request(None, &format!("invalid msgpack: {err}")))?,
        };
        let echo = value
            .get("echo")
            .and_then(Value::as_str)
            .map(str::to_owned);
        serde_json::from_value(value)
            .map_err(|err| bad_request(echo, &format!("bad action request: {err}")))
    }

    /// Encodes one action response in this format.
    pub fn encode_response(&self, response: &ActionResponse) -> TransportResult<Vec<u8>> {
        match self {
            WireFormat::Json => {
                serde_json::to_vec(response).map_err(|err| TransportError::Codec(err.to_string()))
            }
            WireFormat::MsgPack => rmp_serde::to_vec_named(response)
                .map_err(|err| TransportError::Codec(err.to_string())),
        }
    }
}

/// Encodes one event as JSON text, the only framing events use.
pub fn encode_event(event: &Event) -> TransportResult<String> {
    serde_json::to_string(event).map_err(|err| TransportError::Codec(err.to_string()))
}

fn bad_request(echo: Option<String>, message: &str) -> ActionResponse {
    ActionResponse::failed(retcode::BAD_REQUEST, message).with_echo(echo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_type_negotiation() {
        assert_eq!(
            WireFormat::from_content_type("application/json"),
            Some(WireFormat::Json),
        );
        assert_eq!(
            WireFormat::from_content_type("application/json; charset=utf-8"),
            Some(WireFormat::Json),
        );
        assert_eq!(
            WireFormat::from_content_type("Application/MsgPack"),
            Some(WireFormat::MsgPack),
        );
        assert_eq!(WireFormat::from_content_type("text/plain"), None);
        assert_eq!(WireFormat::from_content_type(""), None);
    }

    #[test]
    fn json_decode_salvages_echo_on_bad_request() {
        // parses as a map, but `action` is missing
        let err = WireFormat::Json
            .decode_request(br#"{"echo": "e7", "params": {}}"#)
            .unwrap_err();
        assert_eq!(err.retcode, retcode::BAD_REQUEST);
        assert_eq!(err.echo.as_deref(), Some("e7"));

        // not even a map, nothing to salvage
        let err = WireFormat::Json.decode_request(b"not json").unwrap_err();
        assert_eq!(err.retcode, retcode::BAD_REQUEST);
        assert!(err.echo.is_none());
    }

    #[test]
    fn msgpack_roundtrip() {
        let request = json!({"action": "get_version", "params": {}, "echo": "m1"});
        let bytes = rmp_serde::to_vec_named(&request).unwrap();
        let decoded = WireFormat::MsgPack.decode_request(&bytes).unwrap();
        assert_eq!(decoded.action, "get_version");
        assert_eq!(decoded.echo.as_deref(), Some("m1"));

        let response = ActionResponse::ok(json!({"n": 1})).with_echo(Some("m1".into()));
        let bytes = WireFormat::MsgPack.encode_response(&response).unwrap();
        let back: Value = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(back["status"], "ok");
        assert_eq!(back["data"]["n"], 1);
        assert_eq!(back["echo"], "m1");
    }
}
