/*!
 * Decision Engine
 * Evaluates intercepted requests against the current policy snapshot in
 * fixed precedence order. Every admitted request resolves to a Decision;
 * no evaluation path raises an unhandled fault.
 */

use super::cache::{CacheManager, CacheStore};
use super::decision::{BlockReason, Decision, ForwardMode};
use super::request::InterceptedRequest;
use super::upstream::{Upstream, UpstreamError};
use super::vfs::VirtualFs;
use crate::policy::NetworkPolicy;
use crate::telemetry::TelemetryEvent;
use arc_swap::ArcSwap;
use bytes::Bytes;
use dashmap::DashMap;
use log::{debug, warn};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

/// Component-style percent encoding for the proxy rewrite: alphanumerics
/// and the unreserved marks pass through, everything else is escaped
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Rewrite an allowed target to the proxy endpoint:
/// `proxy_url?url=<percent-encoded target>`
pub fn proxy_rewrite(proxy_url: &str, target: &Url) -> Result<Url, UpstreamError> {
    let rewritten = format!(
        "{}?url={}",
        proxy_url,
        utf8_percent_encode(target.as_str(), COMPONENT)
    );
    Url::parse(&rewritten).map_err(|e| UpstreamError::InvalidTarget(e.to_string()))
}

#[derive(Debug, Clone, Default)]
pub struct MediatorConfig {
    /// Hostname of the mediator's own local assets; requests to it take
    /// the cache-strategy path instead of policy gating
    pub local_origin: Option<String>,
}

/// Final response surfaced to the execution context for one request
#[derive(Debug, Clone)]
pub struct MediatedResponse {
    pub decision: Decision,
    pub status: u16,
    pub body: Bytes,
}

impl MediatedResponse {
    fn served(decision: Decision, body: Bytes) -> Self {
        let status = decision.status();
        Self {
            decision,
            status,
            body,
        }
    }

    fn blocked(reason: BlockReason) -> Self {
        let body = Bytes::from(reason.to_string());
        Self {
            status: reason.status(),
            decision: Decision::Block(reason),
            body,
        }
    }
}

/// Intermediate routing outcome of the pure precedence scan, before any
/// network or cache I/O happens
enum Route {
    Virtual(String),
    LocalAsset,
    Forward(ForwardMode),
    Block(BlockReason),
}

/// The mediator holds a read-only policy snapshot refreshed by message,
/// plus local state (virtual fs, cache) whose lifecycle is independent
/// of supervisor resets.
pub struct Mediator {
    policy: ArcSwap<NetworkPolicy>,
    revision: AtomicU64,
    vfs: VirtualFs,
    cache: CacheManager,
    upstream: Arc<dyn Upstream>,
    local_origin: Option<String>,
    telemetry: mpsc::UnboundedSender<TelemetryEvent>,
    /// Virtual paths already served once; repeat hits skip telemetry
    served_virtual: DashMap<String, ()>,
}

impl Mediator {
    pub fn new(
        config: MediatorConfig,
        upstream: Arc<dyn Upstream>,
        cache_store: Arc<dyn CacheStore>,
        telemetry: mpsc::UnboundedSender<TelemetryEvent>,
    ) -> Self {
        Self {
            policy: ArcSwap::from_pointee(NetworkPolicy::locked_down()),
            revision: AtomicU64::new(0),
            vfs: VirtualFs::new(),
            cache: CacheManager::new(cache_store),
            upstream,
            local_origin: config.local_origin,
            telemetry,
            served_virtual: DashMap::new(),
        }
    }

    /// Replace the policy snapshot wholesale and refresh the virtual fs,
    /// then emit the acknowledgement telemetry. Once the ack is observed,
    /// every subsequent decision uses the new policy.
    pub fn apply_policy(&self, policy: &NetworkPolicy) -> u64 {
        self.vfs.replace_all(&policy.files);
        self.policy.store(Arc::new(policy.clone()));
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("policy applied, revision {}", revision);
        self.emit(
            TelemetryEvent::system(crate::telemetry::Source::Mediator, "policy applied")
                .with_data(serde_json::json!({ "revision": revision })),
        );
        revision
    }

    pub fn policy_revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Evaluate and execute one intercepted request. Always resolves to
    /// a response; upstream failures become Block decisions, never
    /// errors at this seam.
    pub async fn intercept(&self, request: &InterceptedRequest) -> MediatedResponse {
        let policy = self.policy.load_full();
        let response = match self.route(&policy, request) {
            Route::Virtual(content) => {
                let first_hit = self
                    .served_virtual
                    .insert(request.path().to_string(), ())
                    .is_none();
                if first_hit {
                    self.emit(TelemetryEvent::network(format!(
                        "served virtual file {}",
                        request.path()
                    )));
                }
                return MediatedResponse::served(
                    Decision::ServeVirtual(content.clone()),
                    Bytes::from(content),
                );
            }
            Route::LocalAsset => {
                match self
                    .cache
                    .serve(
                        policy.cache_strategy,
                        &request.method,
                        &request.url,
                        self.upstream.as_ref(),
                    )
                    .await
                {
                    Ok(entry) => MediatedResponse::served(
                        Decision::ServeCache(entry.clone()),
                        entry.body,
                    ),
                    Err(err) => MediatedResponse::blocked(BlockReason::UpstreamFailure {
                        detail: err.to_string(),
                        hint: None,
                    }),
                }
            }
            Route::Forward(mode) => self.forward(&policy, request, mode).await,
            Route::Block(reason) => MediatedResponse::blocked(reason),
        };

        self.emit_decision(request, &response);
        response
    }

    /// Pure precedence scan over (request, policy snapshot, local state)
    fn route(&self, policy: &NetworkPolicy, request: &InterceptedRequest) -> Route {
        // 1. Virtual file match bypasses every other check
        if let Some(content) = self.vfs.get(request.path()) {
            return Route::Virtual(content);
        }

        // 2. The mediator's own assets take the cache-strategy path
        if let Some(local) = &self.local_origin {
            if request.host() == local {
                return Route::LocalAsset;
            }
        }

        // 3. Protocol gate; unmodeled schemes are denied here too
        match request.protocol() {
            Some(protocol) if policy.protocol_allowed(protocol) => {}
            _ => {
                return Route::Block(BlockReason::ProtocolDenied {
                    scheme: request.url.scheme().to_string(),
                })
            }
        }

        // 4. Method gate
        if !policy.method_allowed(&request.method) {
            return Route::Block(BlockReason::MethodDenied {
                method: request.method.clone(),
            });
        }

        // 5. Domain gate; host-less URLs fall to the default block
        let host = request.host();
        if host.is_empty() {
            return Route::Block(BlockReason::NoRule {
                url: request.url.to_string(),
            });
        }
        if !crate::policy::domain_allowed(&policy.allow, host) {
            return Route::Block(BlockReason::DomainDenied {
                host: host.to_string(),
            });
        }

        // 6/7. Allowed: rewrite through the proxy when configured
        match &policy.proxy_url {
            Some(proxy) => match proxy_rewrite(proxy, &request.url) {
                Ok(rewritten) => Route::Forward(ForwardMode::ViaProxy(rewritten)),
                Err(err) => Route::Block(BlockReason::UpstreamFailure {
                    detail: err.to_string(),
                    hint: None,
                }),
            },
            None => Route::Forward(ForwardMode::Direct),
        }
    }

    /// Execute a Forward decision. Over-limit and failed fetches are
    /// downgraded to Block decisions here.
    async fn forward(
        &self,
        policy: &NetworkPolicy,
        request: &InterceptedRequest,
        mode: ForwardMode,
    ) -> MediatedResponse {
        let target = match &mode {
            ForwardMode::Direct => &request.url,
            ForwardMode::ViaProxy(url) => url,
        };

        match self
            .upstream
            .fetch(&request.method, target, policy.max_content_length)
            .await
        {
            Ok(response) => {
                let mut mediated =
                    MediatedResponse::served(Decision::Forward(mode), response.body);
                mediated.status = response.status;
                mediated
            }
            Err(UpstreamError::TooLarge { declared, limit }) => {
                // The oversized body was never read; the caller sees
                // only the block
                MediatedResponse::blocked(BlockReason::TooLarge { declared, limit })
            }
            Err(err) => {
                let hint = if policy.proxy_url.is_none() {
                    Some(
                        "no proxyUrl configured; cross-origin targets may need the proxy"
                            .to_string(),
                    )
                } else {
                    None
                };
                warn!("upstream fetch failed for {}: {}", target, err);
                MediatedResponse::blocked(BlockReason::UpstreamFailure {
                    detail: err.to_string(),
                    hint,
                })
            }
        }
    }

    /// Exactly one telemetry event per decision: `network` when allowed,
    /// `security` when blocked. Repeat virtual hits were already
    /// filtered in `intercept`.
    fn emit_decision(&self, request: &InterceptedRequest, response: &MediatedResponse) {
        let event = match &response.decision {
            Decision::Block(reason) => TelemetryEvent::security(format!(
                "blocked {} {}: {}",
                request.method, request.url, reason
            ))
            .with_data(serde_json::json!({
                "requestId": request.request_id.to_string(),
                "status": response.status,
            })),
            _ => TelemetryEvent::network(format!("allowed {} {}", request.method, request.url))
                .with_data(serde_json::json!({
                    "requestId": request.request_id.to_string(),
                    "status": response.status,
                })),
        };
        self.emit(event);
    }

    fn emit(&self, event: TelemetryEvent) {
        // The supervisor side owns the receiver; a closed channel just
        // drops telemetry
        let _ = self.telemetry.send(event);
    }
}
