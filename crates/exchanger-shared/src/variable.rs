//! The engine-boundary tagged value type.
//!
//! The BPMN engine represents process variables as `{value, type}` pairs.
//! Internally the core works with this native sum type and only crosses
//! into the wire shape at the engine client boundary (see
//! [`TypedVariable::to_wire`] / [`TypedVariable::from_wire`]).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// A native engine variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedVariable {
    String(String),
    Boolean(bool),
    Long(i64),
    Double(f64),
    Json(JsonValue),
    Null,
    Date(chrono::DateTime<chrono::Utc>),
}

/// Wire representation used at the engine HTTP boundary: `{"value": ..., "type": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireVariable {
    pub value: JsonValue,
    #[serde(rename = "type")]
    pub var_type: String,
    #[serde(rename = "valueInfo", skip_serializing_if = "Option::is_none")]
    pub value_info: Option<JsonValue>,
}

impl TypedVariable {
    /// Formats a native value for transmission to the engine.
    ///
    /// Any variant without a dedicated engine type is JSON-encoded and sent
    /// as `Json`, per spec §4.1.4.
    pub fn to_wire(&self) -> WireVariable {
        let (value, var_type) = match self {
            TypedVariable::Null => (JsonValue::Null, "Null"),
            TypedVariable::String(s) => (JsonValue::String(s.clone()), "String"),
            TypedVariable::Boolean(b) => (JsonValue::Bool(*b), "Boolean"),
            TypedVariable::Long(n) => (JsonValue::from(*n), "Long"),
            TypedVariable::Double(f) => (JsonValue::from(*f), "Double"),
            TypedVariable::Json(v) => (v.clone(), "Json"),
            TypedVariable::Date(dt) => (JsonValue::String(dt.to_rfc3339()), "Date"),
        };
        WireVariable {
            value,
            var_type: var_type.to_string(),
            value_info: None,
        }
    }

    pub fn from_wire(wire: &WireVariable) -> Self {
        match wire.var_type.as_str() {
            "Null" => TypedVariable::Null,
            "String" => match wire.value.as_str() {
                Some(s) => TypedVariable::String(s.to_string()),
                None => TypedVariable::Null,
            },
            "Boolean" => match wire.value.as_bool() {
                Some(b) => TypedVariable::Boolean(b),
                None => TypedVariable::Null,
            },
            "Long" => match wire.value.as_i64() {
                Some(n) => TypedVariable::Long(n),
                None => TypedVariable::Null,
            },
            "Double" => match wire.value.as_f64() {
                Some(f) => TypedVariable::Double(f),
                None => TypedVariable::Null,
            },
            "Date" => match wire.value.as_str().and_then(|s| {
                chrono::DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.with_timezone(&chrono::Utc))
            }) {
                Some(dt) => TypedVariable::Date(dt),
                None => TypedVariable::Null,
            },
            _ => TypedVariable::Json(wire.value.clone()),
        }
    }

    /// Constructs a native value from an arbitrary JSON scalar, following
    /// the formatting cascade in spec §4.1.4: string, boolean (checked
    /// before integer, since `true`/`false` are not numbers in JSON but a
    /// caller-supplied raw value may arrive pre-stringified), integer,
    /// float, then JSON fallback.
    pub fn from_json_scalar(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => TypedVariable::Null,
            JsonValue::String(s) => TypedVariable::String(s.clone()),
            JsonValue::Bool(b) => TypedVariable::Boolean(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    TypedVariable::Long(i)
                } else if let Some(f) = n.as_f64() {
                    TypedVariable::Double(f)
                } else {
                    TypedVariable::Json(value.clone())
                }
            }
            other => TypedVariable::Json(other.clone()),
        }
    }
}

impl Serialize for TypedVariable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TypedVariable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireVariable::deserialize(deserializer)?;
        Ok(TypedVariable::from_wire(&wire))
    }
}
