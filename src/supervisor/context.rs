/*!
 * Execution Context Seam
 * Traits over the isolation primitive. The warden only creates,
 * destroys and configures contexts; the isolation guarantee itself is
 * the platform's.
 */

use super::SupervisorError;
use crate::core::types::ContextId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Platform-level capability an execution context may be granted.
/// Settable only at construction; changing any of these requires a full
/// context recreation, never in-place mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextCapability {
    Scripts,
    Forms,
    Popups,
    Modals,
    PointerLock,
    Downloads,
}

/// The capability manifest passed once at context construction
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilityManifest {
    capabilities: BTreeSet<ContextCapability>,
}

impl CapabilityManifest {
    /// Empty manifest: the context may attempt nothing beyond plain
    /// content
    pub fn none() -> Self {
        Self::default()
    }

    /// Scripts only, the baseline for running untrusted code
    pub fn minimal() -> Self {
        Self::none().grant(ContextCapability::Scripts)
    }

    pub fn grant(mut self, capability: ContextCapability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn allows(&self, capability: ContextCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

/// One live isolated execution context
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    fn id(&self) -> ContextId;

    /// Post a control message into the context trust domain
    fn deliver(&self, message: serde_json::Value) -> Result<(), SupervisorError>;

    /// Point the context at a document URL
    fn navigate(&self, url: &str) -> Result<(), SupervisorError>;

    /// Post a payload on the heartbeat private channel, which the
    /// mediator must not be able to intercept
    fn post_heartbeat(&self, payload: &str) -> Result<(), SupervisorError>;

    /// Destroy the isolation primitive instance. In-flight work is
    /// abandoned fire-and-forget; replies from a destroyed instance are
    /// discarded by epoch.
    async fn destroy(self: Box<Self>);
}

/// Creates execution contexts. Assumed reliably re-creatable, so
/// rebuilds are not retried with backoff.
#[async_trait]
pub trait ContextFactory: Send + Sync {
    async fn create(
        &self,
        capabilities: &CapabilityManifest,
    ) -> Result<Box<dyn ExecutionContext>, SupervisorError>;
}
