//! Declarative parameter schemas for actions.
//!
//! Every registered action carries an [`ActionSchema`] describing the
//! parameters it accepts. The dispatcher validates incoming params
//! against the schema before the handler runs, so handlers only ever
//! see complete, well-typed parameter maps.

use crate::error::ActionError;
use serde_json::{Map, Value};
use std::fmt;

// =====================================================================
// Parameter types
// =====================================================================

/// JSON type a parameter must conform to.
///
/// `Integer` is strict: floats are rejected even when they have no
/// fractional part. `Any` accepts every value including `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl ParamType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
            ParamType::Any => true,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Any => "any",
        };
        f.write_str(name)
    }
}

// =====================================================================
// Parameter specs
// =====================================================================

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    name: String,
    wire_name: Option<String>,
    ty: ParamType,
    required: bool,
    default: Option<Value>,
}

impl ParamSpec {
    /// A parameter the caller must supply.
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            wire_name: None,
            ty,
            required: true,
            default: None,
        }
    }

    /// A parameter the caller may omit.
    pub fn optional(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            wire_name: None,
            ty,
            required: false,
            default: None,
        }
    }

    /// Value materialized into the params when the caller omits this one.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self.required = false;
        self
    }

    /// Accepts the parameter under a different wire key.
    ///
    /// Useful when the natural wire name collides with a keyword, e.g.
    /// wire `type` delivered to the handler as `ty`.
    pub fn from_wire(mut self, wire_name: impl Into<String>) -> Self {
        self.wire_name = Some(wire_name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

// =====================================================================
// Action schemas
// =====================================================================

/// The declared shape of one action.
#[derive(Debug, Clone)]
pub struct ActionSchema {
    action: String,
    params: Vec<ParamSpec>,
}

impl ActionSchema {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Normalizes and validates a parameter map in place.
    ///
    /// Aliased wire keys are remapped to their handler-facing names,
    /// declared defaults are filled in, then the map is checked: a
    /// missing required or mistyped parameter fails with `10003`, an
    /// undeclared leftover key with `10004`. The `10003` checks run
    /// first, so a request that is broken both ways reports the bad
    /// parameter, not the unsupported one.
    pub fn validate(&self, params: &mut Map<String, Value>) -> Result<(), ActionError> {
        for spec in &self.params {
            if let Some(wire_name) = &spec.wire_name
                && let Some(value) = params.remove(wire_name)
            {
                params.insert(spec.name.clone(), value);
            }
        }

        for spec in &self.params {
            match params.get(&spec.name) {
                Some(value) => {
                    if !spec.ty.matches(value) {
                        return Err(ActionError::bad_param(format!(
                            "invalid parameter `{}`: expected {}",
                            spec.name, spec.ty
                        )));
                    }
                }
                None if spec.required => {
                    return Err(ActionError::bad_param(format!(
                        "missing parameter `{}`",
                        spec.name
                    )));
                }
                None => {
                    if let Some(default) = &spec.default {
                        params.insert(spec.name.clone(), default.clone());
                    }
                }
            }
        }

        let mut undeclared: Vec<&str> = params
            .keys()
            .filter(|key| !self.params.iter().any(|spec| spec.name == **key))
            .map(String::as_str)
            .collect();
        if !undeclared.is_empty() {
            undeclared.sort_unstable();
            return Err(ActionError::unsupported_param(format!(
                "unsupported parameters: {}",
                undeclared.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn send_message_schema() -> ActionSchema {
        ActionSchema::new("send_message")
            .param(ParamSpec::required("detail_type", ParamType::String))
            .param(ParamSpec::required("message", ParamType::Array))
            .param(ParamSpec::optional("user_id", ParamType::String))
    }

    #[test]
    fn missing_required_param_is_bad_param() {
        let mut p = params(json!({"detail_type": "private"}));
        let err = send_message_schema().validate(&mut p).unwrap_err();
        assert_eq!(err.retcode, crate::retcode::BAD_PARAM);
        assert!(err.message.contains("message"));
    }

    #[test]
    fn mistyped_param_is_bad_param() {
        let mut p = params(json!({"detail_type": 3, "message": []}));
        let err = send_message_schema().validate(&mut p).unwrap_err();
        assert_eq!(err.retcode, crate::retcode::BAD_PARAM);
        assert!(err.message.contains("detail_type"));
    }

    #[test]
    fn undeclared_param_is_unsupported_param() {
        let mut p = params(json!({
            "detail_type": "private",
            "message": [],
            "flash": true,
            "at_sender": false,
        }));
        let err = send_message_schema().validate(&mut p).unwrap_err();
        assert_eq!(err.retcode, crate::retcode::UNSUPPORTED_PARAM);
        assert_eq!(err.message, "unsupported parameters: at_sender, flash");
    }

    #[test]
    fn bad_param_reported_before_unsupported_param() {
        // both problems present: missing `message` and undeclared `flash`
        let mut p = params(json!({"detail_type": "private", "flash": true}));
        let err = send_message_schema().validate(&mut p).unwrap_err();
        assert_eq!(err.retcode, crate::retcode::BAD_PARAM);
    }

    #[test]
    fn defaults_are_materialized() {
        let schema = ActionSchema::new("get_latest_events")
            .param(ParamSpec::optional("limit", ParamType::Integer).with_default(json!(0)));
        let mut p = params(json!({}));
        schema.validate(&mut p).unwrap();
        assert_eq!(p.get("limit"), Some(&json!(0)));
    }

    #[test]
    fn integer_rejects_floats() {
        let schema = ActionSchema::new("x")
            .param(ParamSpec::required("limit", ParamType::Integer));
        let mut p = params(json!({"limit": 1.5}));
        assert!(schema.validate(&mut p).is_err());
        let mut p = params(json!({"limit": 2.0}));
        assert!(schema.validate(&mut p).is_err());
        let mut p = params(json!({"limit": 2}));
        assert!(schema.validate(&mut p).is_ok());
    }

    #[test]
    fn wire_alias_is_remapped() {
        let schema = ActionSchema::new("upload_file")
            .param(ParamSpec::required("ty", ParamType::String).from_wire("type"));
        let mut p = params(json!({"type": "url"}));
        schema.validate(&mut p).unwrap();
        assert_eq!(p.get("ty"), Some(&json!("url")));
        assert!(p.get("type").is_none());
    }
}
