/*!
 * Relay
 * Bidirectional message forwarder between the supervisor and the
 * execution context. Validates message origin, queues commands issued
 * before readiness, and drives the ready/not-ready state machine.
 *
 * The relay itself performs no I/O: each call returns the effects the
 * supervisor must apply, which keeps ordering decisions deterministic
 * and testable.
 */

pub mod message;
pub mod queue;

pub use message::{ControlMessage, Envelope, LogLevel, LogRecord, LogSource, READY_SENTINEL};
pub use queue::RelayQueue;

use crate::policy::NetworkPolicy;
use crate::telemetry::{Source, TelemetryEvent};
use log::{debug, error, warn};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("malformed control message: {0}")]
    Malformed(String),

    #[error("relay queue full ({len} commands pending)")]
    QueueFull { len: usize },
}

pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    ContextNotReady,
    ContextReady,
}

/// Side effects for the supervisor to apply, in order
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEffect {
    /// Deliver a message to the execution context
    Deliver(ControlMessage),
    /// The context finished provisioning; emit `ready` to the host
    Ready,
    /// Tear down and rebuild the context
    TriggerReset,
    /// Forward telemetry to the host event stream
    Telemetry(TelemetryEvent),
    /// Opaque relay payload for the host `message` event
    HostMessage(serde_json::Value),
}

pub struct Relay {
    state: RelayState,
    queue: RelayQueue,
    /// Pre-computed trust-domain string inbound origins must equal
    expected_origin: String,
    rejected_count: u64,
}

impl Relay {
    pub fn new(expected_origin: impl Into<String>) -> Self {
        Self {
            state: RelayState::ContextNotReady,
            queue: RelayQueue::new(),
            expected_origin: expected_origin.into(),
            rejected_count: 0,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Messages dropped for origin or shape violations since creation
    pub fn rejected_count(&self) -> u64 {
        self.rejected_count
    }

    /// Supervisor-issued execute. Delivered immediately when the context
    /// is ready, queued FIFO otherwise.
    pub fn submit_execute(&mut self, code: String) -> Vec<RelayEffect> {
        match self.state {
            RelayState::ContextReady => {
                vec![RelayEffect::Deliver(ControlMessage::Execute { code })]
            }
            RelayState::ContextNotReady => {
                if let Err(err) = self.queue.push(code) {
                    error!("dropping execute command: {}", err);
                    return vec![RelayEffect::Telemetry(
                        TelemetryEvent::system(Source::Relay, err.to_string())
                            .with_data(serde_json::json!({ "queued": self.queue.len() })),
                    )];
                }
                debug!("queued execute command ({} pending)", self.queue.len());
                Vec::new()
            }
        }
    }

    /// Supervisor-issued policy update. Policy delivery is not gated on
    /// readiness: the mediator outlives individual context instances.
    pub fn submit_policy(&mut self, rules: NetworkPolicy) -> Vec<RelayEffect> {
        vec![RelayEffect::Deliver(ControlMessage::SetPolicy { rules })]
    }

    /// Handle one inbound envelope from the context side.
    ///
    /// Origin mismatches are dropped silently: not forwarded, not
    /// acknowledged, no reply of any kind that could serve as a probe
    /// oracle. Only the host-side telemetry stream learns of them.
    pub fn on_inbound(&mut self, envelope: Envelope) -> Vec<RelayEffect> {
        if envelope.origin != self.expected_origin {
            self.rejected_count += 1;
            debug!(
                "dropped message from unexpected origin (total rejected: {})",
                self.rejected_count
            );
            return vec![RelayEffect::Telemetry(
                TelemetryEvent::security("dropped message from unexpected origin")
                    .with_source(Source::Relay)
                    .with_data(serde_json::json!({ "rejected": self.rejected_count })),
            )];
        }

        match ControlMessage::from_wire(&envelope.payload) {
            Ok(Some(ControlMessage::Ready)) => {
                if self.state == RelayState::ContextReady {
                    // A repeat READY would re-arm the heartbeat and
                    // re-fire the ready event; treat it as a protocol
                    // violation instead
                    self.rejected_count += 1;
                    warn!("dropped duplicate READY from an already-ready context");
                    return vec![RelayEffect::Telemetry(
                        TelemetryEvent::security("dropped duplicate READY signal")
                            .with_source(Source::Relay)
                            .with_data(serde_json::json!({ "rejected": self.rejected_count })),
                    )];
                }
                self.on_ready()
            }
            Ok(Some(ControlMessage::Reset)) => self.on_reset_request(),
            Ok(Some(ControlMessage::Log(record))) => {
                vec![RelayEffect::Telemetry(record.into_event())]
            }
            Ok(Some(ControlMessage::Execute { .. }))
            | Ok(Some(ControlMessage::SetPolicy { .. })) => {
                // Host-to-context commands arriving from the context are
                // a protocol violation; fail closed
                self.rejected_count += 1;
                warn!("context attempted to inject a host-direction command");
                vec![RelayEffect::Telemetry(
                    TelemetryEvent::security("context sent a host-direction command")
                        .with_source(Source::Relay)
                        .with_data(serde_json::json!({ "rejected": self.rejected_count })),
                )]
            }
            Ok(None) => vec![RelayEffect::HostMessage(envelope.payload)],
            Err(err) => {
                self.rejected_count += 1;
                debug!("dropped malformed control message: {}", err);
                vec![RelayEffect::Telemetry(
                    TelemetryEvent::security(format!("dropped malformed control message: {}", err))
                        .with_source(Source::Relay)
                        .with_data(serde_json::json!({ "rejected": self.rejected_count })),
                )]
            }
        }
    }

    /// READY: flush the queue in FIFO order, then surface `ready`. The
    /// flush precedes the ready signal so commands issued before
    /// readiness reach the context before anything issued in response
    /// to the ready event.
    fn on_ready(&mut self) -> Vec<RelayEffect> {
        self.state = RelayState::ContextReady;
        let pending = self.queue.drain();
        let flushed = pending.len();
        let mut effects: Vec<RelayEffect> = pending
            .into_iter()
            .map(|code| RelayEffect::Deliver(ControlMessage::Execute { code }))
            .collect();
        if flushed > 0 {
            debug!("flushed {} queued execute commands", flushed);
        }
        effects.push(RelayEffect::Ready);
        effects
    }

    fn on_reset_request(&mut self) -> Vec<RelayEffect> {
        self.reset();
        vec![RelayEffect::TriggerReset]
    }

    /// Discard queue state and return to not-ready. Called for inbound
    /// RESET messages and by the supervisor during teardown.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.state = RelayState::ContextNotReady;
    }
}
