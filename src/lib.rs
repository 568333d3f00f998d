/*!
 * Sandbox Warden Library
 * Supervised execution of untrusted code with mediated network access
 */

pub mod core;
pub mod heartbeat;
pub mod mediator;
pub mod policy;
pub mod relay;
pub mod supervisor;
pub mod telemetry;

// Re-exports
pub use crate::core::errors::*;
pub use crate::core::types::{ContextId, Epoch, RequestId};
pub use mediator::{Decision, InterceptedRequest, MediatedResponse, Mediator};
pub use policy::{CacheStrategy, NetworkPolicy, PolicyStore, Protocol};
pub use relay::{ControlMessage, Envelope, Relay, RelayState};
pub use supervisor::{
    CapabilityManifest, ContextFactory, ExecutionContext, Supervisor, SupervisorConfig,
    SupervisorEvent,
};
pub use telemetry::TelemetryEvent;
