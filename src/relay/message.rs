/*!
 * Control Messages
 * Wire shapes crossing the trust boundary. Objects are tagged on
 * `type`; READY is a bare sentinel string.
 */

use super::RelayError;
use crate::policy::NetworkPolicy;
use crate::telemetry::{self, TelemetryEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel the context posts once its side of the boundary is wired
pub const READY_SENTINEL: &str = "READY";

/// Which side of the boundary authored a LOG record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Relay,
    Context,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Warn,
    Error,
}

/// Telemetry record carried over the relay as a LOG message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: u64,
    pub source: LogSource,
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<telemetry::Area>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl LogRecord {
    /// Convert into the internal telemetry shape for host emission
    pub fn into_event(self) -> TelemetryEvent {
        let kind = match self.level {
            LogLevel::Error => telemetry::Kind::Error,
            _ => telemetry::Kind::Log,
        };
        let source = match self.source {
            LogSource::Relay => telemetry::Source::Relay,
            LogSource::Context => telemetry::Source::Context,
        };
        TelemetryEvent {
            kind,
            area: self.area.unwrap_or(telemetry::Area::UserCode),
            message: self.message,
            timestamp_ms: self.timestamp,
            source,
            data: self.data,
        }
    }
}

/// Tagged object messages; READY travels separately as a bare string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
enum TaggedMessage {
    #[serde(rename = "EXECUTE")]
    Execute { code: String },
    #[serde(rename = "SET_POLICY")]
    SetPolicy { rules: NetworkPolicy },
    #[serde(rename = "RESET")]
    Reset,
    #[serde(rename = "LOG")]
    Log(LogRecord),
}

/// Every control message the relay understands
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Execute { code: String },
    SetPolicy { rules: NetworkPolicy },
    Reset,
    Ready,
    Log(LogRecord),
}

impl ControlMessage {
    /// Parse a raw payload. Returns Err only for object payloads that
    /// claim a known `type` but are malformed; unknown shapes are left
    /// to the caller to treat as opaque relay traffic.
    pub fn from_wire(value: &Value) -> Result<Option<Self>, RelayError> {
        if value.as_str() == Some(READY_SENTINEL) {
            return Ok(Some(ControlMessage::Ready));
        }

        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return Ok(None);
        };
        match kind {
            "EXECUTE" | "SET_POLICY" | "RESET" | "LOG" => {
                let tagged: TaggedMessage = serde_json::from_value(value.clone())
                    .map_err(|e| RelayError::Malformed(e.to_string()))?;
                Ok(Some(match tagged {
                    TaggedMessage::Execute { code } => ControlMessage::Execute { code },
                    TaggedMessage::SetPolicy { rules } => ControlMessage::SetPolicy { rules },
                    TaggedMessage::Reset => ControlMessage::Reset,
                    TaggedMessage::Log(record) => ControlMessage::Log(record),
                }))
            }
            _ => Ok(None),
        }
    }

    /// Serialize for delivery across the boundary
    pub fn to_wire(&self) -> Value {
        match self {
            ControlMessage::Ready => Value::String(READY_SENTINEL.to_string()),
            ControlMessage::Execute { code } => serde_json::json!({
                "type": "EXECUTE",
                "code": code,
            }),
            ControlMessage::SetPolicy { rules } => serde_json::json!({
                "type": "SET_POLICY",
                "rules": rules,
            }),
            ControlMessage::Reset => serde_json::json!({ "type": "RESET" }),
            ControlMessage::Log(record) => {
                let mut value = serde_json::to_value(record).unwrap_or(Value::Null);
                if let Value::Object(ref mut map) = value {
                    map.insert("type".to_string(), Value::String("LOG".to_string()));
                }
                value
            }
        }
    }
}

/// Inbound message with its declared origin, resolved once at admission
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: String,
    pub payload: Value,
}

impl Envelope {
    pub fn new(origin: impl Into<String>, payload: Value) -> Self {
        Self {
            origin: origin.into(),
            payload,
        }
    }
}
