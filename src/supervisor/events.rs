/*!
 * Supervisor Events
 * Everything the host observes: provisioning readiness, telemetry, and
 * opaque relay payloads. The host never receives raw transport errors
 * from the context.
 */

use crate::core::types::ContextId;
use crate::telemetry::TelemetryEvent;

#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// A provisioning cycle completed; fired once per cycle
    Ready { context_id: ContextId },
    /// Telemetry from the mediator, relay or supervisor
    Log(TelemetryEvent),
    /// Arbitrary relay payload from the context
    Message(serde_json::Value),
}
