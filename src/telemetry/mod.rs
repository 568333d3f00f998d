/*!
 * Telemetry Events
 * Strongly-typed events produced by the mediator and relay, consumed by
 * the supervisor for host emission. Events are not persisted.
 */

use crate::core::types::{now_ms, TimestampMs};
use serde::{Deserialize, Serialize};

/// Event kind for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Log,
    Error,
}

/// Event area for organization and querying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Area {
    Network,
    Security,
    System,
    UserCode,
}

/// Subsystem that produced the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Mediator,
    Relay,
    Supervisor,
    Context,
}

/// Unified telemetry event - everything the host observes flows through this
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub kind: Kind,
    pub area: Area,
    pub message: String,
    /// Wall-clock timestamp (milliseconds since Unix epoch)
    pub timestamp_ms: TimestampMs,
    pub source: Source,
    /// Structured payload, shape depends on the emitting site
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TelemetryEvent {
    /// Create a new event with current timestamp
    #[inline]
    pub fn new(kind: Kind, area: Area, source: Source, message: impl Into<String>) -> Self {
        Self {
            kind,
            area,
            message: message.into(),
            timestamp_ms: now_ms(),
            source,
            data: None,
        }
    }

    /// Allowed-traffic event from the mediator
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(Kind::Log, Area::Network, Source::Mediator, message)
    }

    /// Blocked-traffic or integrity event
    #[inline]
    pub fn security(message: impl Into<String>) -> Self {
        Self::new(Kind::Error, Area::Security, Source::Mediator, message)
    }

    /// Lifecycle event from the supervisor or relay
    #[inline]
    pub fn system(source: Source, message: impl Into<String>) -> Self {
        Self::new(Kind::Log, Area::System, source, message)
    }

    /// Attach structured data
    #[inline]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Override the emitting source
    #[inline]
    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }
}
