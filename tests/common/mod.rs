/*!
 * Shared Test Doubles
 */

// Each test binary uses a different subset of these helpers
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sandbox_warden::mediator::upstream::{
    check_declared_length, Upstream, UpstreamError, UpstreamResponse,
};
use sandbox_warden::supervisor::{
    CapabilityManifest, ContextFactory, ExecutionContext, SupervisorError,
};
use sandbox_warden::ContextId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub body: String,
    /// Overrides the Content-Length header; defaults to the body length
    pub declared_length: Option<u64>,
}

impl CannedResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            declared_length: None,
        }
    }

    pub fn with_declared_length(mut self, declared: u64) -> Self {
        self.declared_length = Some(declared);
        self
    }
}

/// In-memory upstream: canned responses per URL, transport failure for
/// everything else. Applies the same declared-length check as the
/// production impl, before the body is released.
pub struct MockUpstream {
    responses: Mutex<HashMap<String, CannedResponse>>,
    calls: Mutex<Vec<String>>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(&self, url: &str, response: CannedResponse) {
        self.responses.lock().insert(url.to_string(), response);
    }

    pub fn forget(&self, url: &str) {
        self.responses.lock().remove(url);
    }

    /// URLs fetched, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn fetch(
        &self,
        _method: &str,
        url: &Url,
        max_content_length: Option<u64>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.calls.lock().push(url.to_string());
        let canned = self
            .responses
            .lock()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| UpstreamError::Transport("connection refused".to_string()))?;

        let declared = canned.declared_length.or(Some(canned.body.len() as u64));
        check_declared_length(declared, max_content_length)?;

        Ok(UpstreamResponse {
            status: canned.status,
            content_length: declared,
            content_type: Some("text/plain".to_string()),
            body: Bytes::from(canned.body),
        })
    }
}

/// Records everything the supervisor posts into one context instance
#[derive(Clone)]
pub struct ContextProbe {
    pub id: ContextId,
    pub delivered: Arc<Mutex<Vec<serde_json::Value>>>,
    pub heartbeats: Arc<Mutex<Vec<String>>>,
    pub navigations: Arc<Mutex<Vec<String>>>,
}

impl ContextProbe {
    /// Codes of delivered EXECUTE messages, in delivery order
    pub fn executed(&self) -> Vec<String> {
        self.delivered
            .lock()
            .iter()
            .filter(|v| v["type"] == "EXECUTE")
            .map(|v| v["code"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn policies_delivered(&self) -> usize {
        self.delivered
            .lock()
            .iter()
            .filter(|v| v["type"] == "SET_POLICY")
            .count()
    }
}

pub struct MockContext {
    probe: ContextProbe,
    destroyed: Arc<AtomicU64>,
}

#[async_trait]
impl ExecutionContext for MockContext {
    fn id(&self) -> ContextId {
        self.probe.id
    }

    fn deliver(&self, message: serde_json::Value) -> Result<(), SupervisorError> {
        self.probe.delivered.lock().push(message);
        Ok(())
    }

    fn navigate(&self, url: &str) -> Result<(), SupervisorError> {
        self.probe.navigations.lock().push(url.to_string());
        Ok(())
    }

    fn post_heartbeat(&self, payload: &str) -> Result<(), SupervisorError> {
        self.probe.heartbeats.lock().push(payload.to_string());
        Ok(())
    }

    async fn destroy(self: Box<Self>) {
        // Yield so overlapping lifecycle calls genuinely interleave
        tokio::task::yield_now().await;
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory that counts lifecycles and exposes a probe into the most
/// recently created context
pub struct MockFactory {
    pub created: Arc<AtomicU64>,
    pub destroyed: Arc<AtomicU64>,
    pub current: Arc<Mutex<Option<ContextProbe>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            created: Arc::new(AtomicU64::new(0)),
            destroyed: Arc::new(AtomicU64::new(0)),
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed_count(&self) -> u64 {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn probe(&self) -> ContextProbe {
        self.current
            .lock()
            .clone()
            .expect("no context has been created yet")
    }

    /// Handles shared with contexts this factory creates
    pub fn handles(&self) -> (Arc<AtomicU64>, Arc<AtomicU64>, Arc<Mutex<Option<ContextProbe>>>) {
        (
            Arc::clone(&self.created),
            Arc::clone(&self.destroyed),
            Arc::clone(&self.current),
        )
    }
}

pub struct MockFactoryHandle {
    created: Arc<AtomicU64>,
    destroyed: Arc<AtomicU64>,
    current: Arc<Mutex<Option<ContextProbe>>>,
}

impl MockFactory {
    pub fn boxed(&self) -> Box<dyn ContextFactory> {
        let (created, destroyed, current) = self.handles();
        Box::new(MockFactoryHandle {
            created,
            destroyed,
            current,
        })
    }
}

#[async_trait]
impl ContextFactory for MockFactoryHandle {
    async fn create(
        &self,
        _capabilities: &CapabilityManifest,
    ) -> Result<Box<dyn ExecutionContext>, SupervisorError> {
        tokio::task::yield_now().await;
        self.created.fetch_add(1, Ordering::SeqCst);
        let probe = ContextProbe {
            id: Uuid::new_v4(),
            delivered: Arc::new(Mutex::new(Vec::new())),
            heartbeats: Arc::new(Mutex::new(Vec::new())),
            navigations: Arc::new(Mutex::new(Vec::new())),
        };
        *self.current.lock() = Some(probe.clone());
        Ok(Box::new(MockContext {
            probe,
            destroyed: Arc::clone(&self.destroyed),
        }))
    }
}
