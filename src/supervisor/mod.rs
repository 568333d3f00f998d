/*!
 * Supervisor
 * Composition root: owns the policy store, relay, heartbeat monitor and
 * the execution-context handle; exposes the public API and the host
 * event stream.
 */

pub mod context;
pub mod events;
pub mod task;

pub use context::{CapabilityManifest, ContextCapability, ContextFactory, ExecutionContext};
pub use events::SupervisorEvent;
pub use task::HeartbeatTask;

use crate::core::types::{now_ms, ContextId, Epoch};
use crate::heartbeat::{HeartbeatAction, HeartbeatMonitor, HeartbeatPhase, MSG_CONNECTED, MSG_PING, MSG_PONG};
use crate::mediator::{CacheStore, Mediator, MediatorConfig, Upstream};
use crate::policy::{NetworkPolicy, PolicyStore};
use crate::relay::{ControlMessage, Envelope, Relay, RelayEffect, RelayState};
use crate::telemetry::{Source, TelemetryEvent};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("no execution context exists")]
    NoContext,

    #[error("failed to create execution context: {0}")]
    ContextCreation(String),

    #[error("failed to deliver message to context: {0}")]
    Delivery(String),
}

pub struct SupervisorConfig {
    /// Pre-computed trust-domain string inbound relay origins must equal
    pub trust_origin: String,
    /// Platform capability manifest, applied at context construction
    pub capabilities: CapabilityManifest,
    pub initial_policy: NetworkPolicy,
    pub mediator: MediatorConfig,
}

struct Inner {
    policy: PolicyStore,
    mediator: Arc<Mediator>,
    relay: parking_lot::Mutex<Relay>,
    heartbeat: parking_lot::Mutex<HeartbeatMonitor>,
    context: tokio::sync::Mutex<Option<Box<dyn ExecutionContext>>>,
    capabilities: parking_lot::Mutex<CapabilityManifest>,
    factory: Box<dyn ContextFactory>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
    /// Guards against concurrent double-teardown
    reset_in_progress: AtomicBool,
    resets_performed: AtomicU64,
}

/// Cheaply cloneable handle to the supervisor
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Build a supervisor and its host event stream. Spawns the
    /// telemetry pump, so a tokio runtime must be current.
    pub fn new(
        config: SupervisorConfig,
        factory: Box<dyn ContextFactory>,
        upstream: Arc<dyn Upstream>,
        cache_store: Arc<dyn CacheStore>,
    ) -> (Self, mpsc::UnboundedReceiver<SupervisorEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (telemetry_tx, mut telemetry_rx) = mpsc::unbounded_channel();

        let mediator = Arc::new(Mediator::new(
            config.mediator,
            upstream,
            cache_store,
            telemetry_tx,
        ));
        mediator.apply_policy(&config.initial_policy);

        let inner = Arc::new(Inner {
            policy: PolicyStore::new(config.initial_policy),
            mediator,
            relay: parking_lot::Mutex::new(Relay::new(config.trust_origin)),
            heartbeat: parking_lot::Mutex::new(HeartbeatMonitor::new()),
            context: tokio::sync::Mutex::new(None),
            capabilities: parking_lot::Mutex::new(config.capabilities),
            factory,
            events: events_tx.clone(),
            reset_in_progress: AtomicBool::new(false),
            resets_performed: AtomicU64::new(0),
        });

        // Pump mediator telemetry into the host event stream
        tokio::spawn(async move {
            while let Some(event) = telemetry_rx.recv().await {
                if events_tx.send(SupervisorEvent::Log(event)).is_err() {
                    break;
                }
            }
        });

        (Self { inner }, events_rx)
    }

    /// The per-trust-domain mediator. Its virtual fs and cache outlive
    /// individual context instances.
    pub fn mediator(&self) -> Arc<Mediator> {
        Arc::clone(&self.inner.mediator)
    }

    pub fn policy(&self) -> Arc<NetworkPolicy> {
        self.inner.policy.snapshot()
    }

    pub fn relay_state(&self) -> RelayState {
        self.inner.relay.lock().state()
    }

    pub fn heartbeat_phase(&self) -> HeartbeatPhase {
        self.inner.heartbeat.lock().phase()
    }

    pub fn heartbeat_epoch(&self) -> Epoch {
        self.inner.heartbeat.lock().epoch()
    }

    pub fn resets_performed(&self) -> u64 {
        self.inner.resets_performed.load(Ordering::SeqCst)
    }

    pub async fn context_id(&self) -> Option<ContextId> {
        self.inner.context.lock().await.as_ref().map(|c| c.id())
    }

    /// Create the initial execution context. Replaces (and destroys) any
    /// existing instance.
    pub async fn provision(&self) -> Result<(), SupervisorError> {
        let manifest = self.inner.capabilities.lock().clone();
        let fresh = self.inner.factory.create(&manifest).await?;
        info!("provisioned execution context {}", fresh.id());
        let old = self.inner.context.lock().await.replace(fresh);
        if let Some(stale) = old {
            stale.destroy().await;
        }
        Ok(())
    }

    /// Forward an execute command through the relay. A logged no-op when
    /// no context exists.
    pub async fn execute(&self, code: impl Into<String>) {
        if self.inner.context.lock().await.is_none() {
            warn!("execute ignored: no execution context exists");
            return;
        }
        let effects = self.inner.relay.lock().submit_execute(code.into());
        self.apply_effects(effects).await;
    }

    /// Point the current context at a document URL
    pub async fn navigate(&self, url: &str) -> Result<(), SupervisorError> {
        let guard = self.inner.context.lock().await;
        match guard.as_ref() {
            Some(context) => context.navigate(url),
            None => Err(SupervisorError::NoContext),
        }
    }

    /// Replace the network policy and resend it to the mediator. Every
    /// NetworkPolicy field is mediator-side and hot-applies; no context
    /// recreation happens here.
    pub async fn set_policy(&self, policy: NetworkPolicy) {
        self.inner.policy.replace(policy.clone());
        let effects = self.inner.relay.lock().submit_policy(policy);
        self.apply_effects(effects).await;
    }

    /// Replace the platform capability manifest. Manifest fields only
    /// apply at context construction, so any change forces a full
    /// teardown-rebuild cycle.
    pub async fn set_capabilities(&self, manifest: CapabilityManifest) {
        {
            let mut current = self.inner.capabilities.lock();
            if *current == manifest {
                debug!("capability manifest unchanged; keeping current context");
                return;
            }
            *current = manifest;
        }
        info!("capability manifest changed; recreating execution context");
        self.reset().await;
    }

    /// Tear down and rebuild the execution context. Idempotent under
    /// concurrency: overlapping calls collapse into one cycle.
    pub async fn reset(&self) {
        if self
            .inner
            .reset_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("reset already in progress; ignoring");
            return;
        }

        info!("tearing down execution context");
        let old = self.inner.context.lock().await.take();
        if let Some(stale) = old {
            stale.destroy().await;
        }
        // Queue state from the old instance must never replay into the
        // new one
        self.inner.relay.lock().reset();

        let manifest = self.inner.capabilities.lock().clone();
        match self.inner.factory.create(&manifest).await {
            Ok(fresh) => {
                info!("rebuilt execution context {}", fresh.id());
                *self.inner.context.lock().await = Some(fresh);
            }
            Err(err) => {
                error!("context rebuild failed: {}", err);
                self.emit(SupervisorEvent::Log(
                    TelemetryEvent::new(
                        crate::telemetry::Kind::Error,
                        crate::telemetry::Area::System,
                        Source::Supervisor,
                        format!("context rebuild failed: {}", err),
                    ),
                ));
            }
        }

        self.inner.heartbeat.lock().on_reset_complete();
        self.inner.resets_performed.fetch_add(1, Ordering::SeqCst);
        self.inner.reset_in_progress.store(false, Ordering::SeqCst);
    }

    /// Tear down without rebuilding
    pub async fn shutdown(&self) {
        let old = self.inner.context.lock().await.take();
        if let Some(stale) = old {
            stale.destroy().await;
        }
        self.inner.relay.lock().reset();
        self.inner.heartbeat.lock().on_reset_complete();
        info!("supervisor shut down");
    }

    /// Handle one inbound relay envelope from the context side
    pub async fn handle_envelope(&self, envelope: Envelope) {
        let effects = self.inner.relay.lock().on_inbound(envelope);
        self.apply_effects(effects).await;
    }

    /// Handle one payload from the heartbeat private channel. Replies
    /// carrying a stale epoch belong to a superseded instance and are
    /// dropped.
    pub async fn handle_probe(&self, epoch: Epoch, payload: &str) {
        match payload {
            MSG_CONNECTED => {
                let action = self.inner.heartbeat.lock().on_connected(epoch);
                if action == HeartbeatAction::Ping {
                    self.post_ping().await;
                }
            }
            MSG_PONG => {
                self.inner.heartbeat.lock().on_pong(epoch, now_ms());
            }
            other => {
                debug!("ignoring unknown heartbeat payload: {}", other);
            }
        }
    }

    /// One heartbeat interval elapsed; driven by [`HeartbeatTask`]
    pub async fn heartbeat_tick(&self) {
        let action = self.inner.heartbeat.lock().tick();
        match action {
            HeartbeatAction::Idle => {}
            HeartbeatAction::Ping => self.post_ping().await,
            HeartbeatAction::Reset => {
                let missed = self.inner.heartbeat.lock().missed_count();
                warn!("heartbeat integrity failure; rebuilding context");
                self.emit(SupervisorEvent::Log(
                    TelemetryEvent::security(
                        "heartbeat threshold breached; mediator presumed compromised",
                    )
                    .with_source(Source::Supervisor)
                    .with_data(serde_json::json!({ "missed": missed })),
                ));
                self.reset().await;
            }
        }
    }

    async fn post_ping(&self) {
        let guard = self.inner.context.lock().await;
        if let Some(context) = guard.as_ref() {
            if let Err(err) = context.post_heartbeat(MSG_PING) {
                debug!("heartbeat ping delivery failed: {}", err);
            }
        }
    }

    /// The new context finished provisioning: re-arm the heartbeat and
    /// resend the current policy (mandatory after every rebuild, since
    /// mediator instances may be scoped per-context), then surface
    /// `ready` to the host.
    async fn on_context_ready(&self) {
        self.inner.heartbeat.lock().register_channel();

        let policy = self.inner.policy.snapshot();
        self.inner.mediator.apply_policy(&policy);
        self.deliver(ControlMessage::SetPolicy {
            rules: (*policy).clone(),
        })
        .await;

        let context_id = self.context_id().await;
        if let Some(context_id) = context_id {
            self.emit(SupervisorEvent::Ready { context_id });
        }
    }

    async fn apply_effects(&self, effects: Vec<RelayEffect>) {
        for effect in effects {
            match effect {
                RelayEffect::Deliver(message) => {
                    if let ControlMessage::SetPolicy { rules } = &message {
                        self.inner.mediator.apply_policy(rules);
                    }
                    self.deliver(message).await;
                }
                RelayEffect::Ready => self.on_context_ready().await,
                RelayEffect::TriggerReset => self.reset().await,
                RelayEffect::Telemetry(event) => self.emit(SupervisorEvent::Log(event)),
                RelayEffect::HostMessage(value) => self.emit(SupervisorEvent::Message(value)),
            }
        }
    }

    async fn deliver(&self, message: ControlMessage) {
        let guard = self.inner.context.lock().await;
        match guard.as_ref() {
            Some(context) => {
                if let Err(err) = context.deliver(message.to_wire()) {
                    debug!("message delivery failed: {}", err);
                }
            }
            None => debug!("no context; message not delivered"),
        }
    }

    fn emit(&self, event: SupervisorEvent) {
        // A host that dropped its receiver just stops observing
        let _ = self.inner.events.send(event);
    }
}
