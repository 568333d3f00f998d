/*!
 * Mediator Integration Tests
 * Decision precedence, proxy rewriting, size caps, cache strategies and
 * the telemetry contract, against an in-memory upstream
 */

mod common;

use common::{CannedResponse, MockUpstream};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sandbox_warden::mediator::{
    BlockReason, CacheStore, Decision, MemoryCacheStore, Mediator, MediatorConfig, Upstream,
};
use sandbox_warden::telemetry::{Area, TelemetryEvent};
use sandbox_warden::{CacheStrategy, InterceptedRequest, NetworkPolicy, Protocol};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

struct Harness {
    mediator: Mediator,
    upstream: Arc<MockUpstream>,
    store: Arc<MemoryCacheStore>,
    telemetry: mpsc::UnboundedReceiver<TelemetryEvent>,
}

impl Harness {
    fn new(config: MediatorConfig) -> Self {
        let upstream = Arc::new(MockUpstream::new());
        let store = Arc::new(MemoryCacheStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let mediator = Mediator::new(
            config,
            Arc::clone(&upstream) as Arc<dyn Upstream>,
            Arc::clone(&store) as Arc<dyn CacheStore>,
            tx,
        );
        Self {
            mediator,
            upstream,
            store,
            telemetry: rx,
        }
    }

    fn drain_telemetry(&mut self) -> Vec<TelemetryEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.telemetry.try_recv() {
            events.push(event);
        }
        events
    }
}

fn request(method: &str, url: &str) -> InterceptedRequest {
    InterceptedRequest::admit(method, url, Uuid::new_v4())
        .expect("test request must admit")
}

fn permissive_policy() -> NetworkPolicy {
    NetworkPolicy::locked_down()
        .allow_domain("example.com")
        .allow_protocol(Protocol::Https)
        .allow_protocol(Protocol::Http)
        .allow_method("GET")
        .allow_method("POST")
}

#[tokio::test]
async fn test_forward_allowed_request_directly() {
    let harness = Harness::new(MediatorConfig::default());
    harness.mediator.apply_policy(&permissive_policy());
    harness
        .upstream
        .respond("https://api.example.com/v1", CannedResponse::ok("payload"));

    let response = harness
        .mediator
        .intercept(&request("GET", "https://api.example.com/v1"))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"payload");
    assert!(!response.decision.is_blocked());
    assert_eq!(harness.upstream.calls(), vec!["https://api.example.com/v1"]);
}

#[tokio::test]
async fn test_subdomain_matches_allow_suffix() {
    let harness = Harness::new(MediatorConfig::default());
    harness.mediator.apply_policy(&permissive_policy());
    harness
        .upstream
        .respond("https://api.example.com/", CannedResponse::ok("ok"));

    let allowed = harness
        .mediator
        .intercept(&request("GET", "https://api.example.com/"))
        .await;
    assert_eq!(allowed.status, 200);

    // A hostname merely ending in the allowed text is a different domain
    let denied = harness
        .mediator
        .intercept(&request("GET", "https://notexample.com/"))
        .await;
    assert_eq!(denied.status, 403);
    assert!(matches!(
        denied.decision,
        Decision::Block(BlockReason::DomainDenied { .. })
    ));
}

#[tokio::test]
async fn test_method_and_protocol_gates() {
    let harness = Harness::new(MediatorConfig::default());
    harness.mediator.apply_policy(
        &NetworkPolicy::locked_down()
            .allow_domain("example.com")
            .allow_protocol(Protocol::Https)
            .allow_method("GET"),
    );

    let bad_method = harness
        .mediator
        .intercept(&request("DELETE", "https://example.com/x"))
        .await;
    assert!(matches!(
        bad_method.decision,
        Decision::Block(BlockReason::MethodDenied { .. })
    ));

    let bad_protocol = harness
        .mediator
        .intercept(&request("GET", "http://example.com/x"))
        .await;
    assert!(matches!(
        bad_protocol.decision,
        Decision::Block(BlockReason::ProtocolDenied { .. })
    ));

    // Schemes outside the model are denied at the same gate
    let unmodeled = harness
        .mediator
        .intercept(&request("GET", "ftp://example.com/x"))
        .await;
    assert_eq!(unmodeled.status, 403);
    assert_eq!(harness.upstream.call_count(), 0);
}

#[tokio::test]
async fn test_proxy_rewrite_exact_shape() {
    let harness = Harness::new(MediatorConfig::default());
    harness
        .mediator
        .apply_policy(&permissive_policy().with_proxy("https://proxy.internal/fetch"));

    let rewritten =
        "https://proxy.internal/fetch?url=https%3A%2F%2Fapi.example.com%2Fdata%3Fq%3Drust%26page%3D2";
    harness.upstream.respond(rewritten, CannedResponse::ok("proxied"));

    let response = harness
        .mediator
        .intercept(&request("GET", "https://api.example.com/data?q=rust&page=2"))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"proxied");
    // The origin server is never contacted directly
    assert_eq!(harness.upstream.calls(), vec![rewritten]);
}

#[tokio::test]
async fn test_virtual_file_precedes_every_gate() {
    let harness = Harness::new(MediatorConfig::default());
    // Deny-everything policy, but with a virtual file registered
    harness
        .mediator
        .apply_policy(&NetworkPolicy::locked_down().with_file("/app.js", "console.log(1)"));

    let response = harness
        .mediator
        .intercept(&request("DELETE", "https://anything.invalid/app.js"))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"console.log(1)");
    assert!(matches!(response.decision, Decision::ServeVirtual(_)));
    assert_eq!(harness.upstream.call_count(), 0);
}

#[tokio::test]
async fn test_policy_ack_gives_read_after_write() {
    let mut harness = Harness::new(MediatorConfig::default());
    let denied = harness
        .mediator
        .intercept(&request("GET", "https://api.example.com/v1"))
        .await;
    assert!(denied.decision.is_blocked());

    let revision = harness.mediator.apply_policy(&permissive_policy());
    assert_eq!(harness.mediator.policy_revision(), revision);

    // The ack event carries the revision; once observed, decisions use
    // the new policy
    let events = harness.drain_telemetry();
    let ack = events
        .iter()
        .find(|e| e.message == "policy applied")
        .expect("policy ack must be emitted");
    assert_eq!(ack.data.as_ref().unwrap()["revision"], revision);

    harness
        .upstream
        .respond("https://api.example.com/v1", CannedResponse::ok("ok"));
    let allowed = harness
        .mediator
        .intercept(&request("GET", "https://api.example.com/v1"))
        .await;
    assert_eq!(allowed.status, 200);
}

#[tokio::test]
async fn test_oversized_body_never_observable() {
    let harness = Harness::new(MediatorConfig::default());
    harness
        .mediator
        .apply_policy(&permissive_policy().with_max_content_length(64));
    harness.upstream.respond(
        "https://api.example.com/big",
        CannedResponse::ok("SECRET-OVERSIZED-CONTENT").with_declared_length(1_000_000),
    );

    let response = harness
        .mediator
        .intercept(&request("GET", "https://api.example.com/big"))
        .await;

    assert_eq!(response.status, 413);
    assert!(matches!(
        response.decision,
        Decision::Block(BlockReason::TooLarge {
            declared: 1_000_000,
            limit: 64
        })
    ));
    let body = String::from_utf8_lossy(&response.body);
    assert!(!body.contains("SECRET"));
}

#[tokio::test]
async fn test_upstream_failure_maps_to_502_with_proxy_hint() {
    let harness = Harness::new(MediatorConfig::default());
    harness.mediator.apply_policy(&permissive_policy());
    // No canned response registered: the fetch fails

    let response = harness
        .mediator
        .intercept(&request("GET", "https://api.example.com/down"))
        .await;

    assert_eq!(response.status, 502);
    match response.decision {
        Decision::Block(BlockReason::UpstreamFailure { hint, .. }) => {
            assert!(hint.expect("hint expected without proxyUrl").contains("proxyUrl"));
        }
        other => panic!("expected upstream failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cache_first_serves_hit_without_fetch() {
    let harness = Harness::new(MediatorConfig {
        local_origin: Some("assets.internal".to_string()),
    });
    harness
        .mediator
        .apply_policy(&NetworkPolicy::locked_down().with_cache_strategy(CacheStrategy::CacheFirst));
    harness
        .upstream
        .respond("https://assets.internal/style.css", CannedResponse::ok("body{}"));

    let first = harness
        .mediator
        .intercept(&request("GET", "https://assets.internal/style.css"))
        .await;
    assert_eq!(first.status, 200);
    assert_eq!(harness.upstream.call_count(), 1);

    // Make the upstream unreachable; the hit must still serve
    harness.upstream.forget("https://assets.internal/style.css");
    let second = harness
        .mediator
        .intercept(&request("GET", "https://assets.internal/style.css"))
        .await;
    assert_eq!(second.status, 200);
    assert_eq!(&second.body[..], b"body{}");
    assert_eq!(harness.upstream.call_count(), 1);
    assert!(matches!(second.decision, Decision::ServeCache(_)));
}

#[tokio::test]
async fn test_network_only_never_touches_store() {
    let harness = Harness::new(MediatorConfig {
        local_origin: Some("assets.internal".to_string()),
    });
    harness
        .mediator
        .apply_policy(&NetworkPolicy::locked_down().with_cache_strategy(CacheStrategy::NetworkOnly));
    harness
        .upstream
        .respond("https://assets.internal/app.js", CannedResponse::ok("x"));

    for _ in 0..3 {
        let response = harness
            .mediator
            .intercept(&request("GET", "https://assets.internal/app.js"))
            .await;
        assert_eq!(response.status, 200);
    }

    assert_eq!(harness.upstream.call_count(), 3);
    assert_eq!(harness.store.reads(), 0);
    assert_eq!(harness.store.writes(), 0);
}

#[tokio::test]
async fn test_network_first_falls_back_to_cache() {
    let harness = Harness::new(MediatorConfig {
        local_origin: Some("assets.internal".to_string()),
    });
    harness.mediator.apply_policy(&NetworkPolicy::locked_down());
    harness
        .upstream
        .respond("https://assets.internal/logo.svg", CannedResponse::ok("<svg/>"));

    let fresh = harness
        .mediator
        .intercept(&request("GET", "https://assets.internal/logo.svg"))
        .await;
    assert_eq!(fresh.status, 200);

    harness.upstream.forget("https://assets.internal/logo.svg");
    let stale = harness
        .mediator
        .intercept(&request("GET", "https://assets.internal/logo.svg"))
        .await;
    assert_eq!(stale.status, 200);
    assert_eq!(&stale.body[..], b"<svg/>");
}

#[tokio::test]
async fn test_exactly_one_telemetry_event_per_decision() {
    let mut harness = Harness::new(MediatorConfig::default());
    harness.mediator.apply_policy(&permissive_policy());
    harness.drain_telemetry();

    harness
        .upstream
        .respond("https://api.example.com/v1", CannedResponse::ok("ok"));
    harness
        .mediator
        .intercept(&request("GET", "https://api.example.com/v1"))
        .await;
    let events = harness.drain_telemetry();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].area, Area::Network);

    harness
        .mediator
        .intercept(&request("GET", "https://blocked.invalid/"))
        .await;
    let events = harness.drain_telemetry();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].area, Area::Security);
}

#[tokio::test]
async fn test_repeated_virtual_hits_log_once() {
    let mut harness = Harness::new(MediatorConfig::default());
    harness
        .mediator
        .apply_policy(&NetworkPolicy::locked_down().with_file("/lib.js", "export {}"));
    harness.drain_telemetry();

    for _ in 0..5 {
        let response = harness
            .mediator
            .intercept(&request("GET", "https://host.invalid/lib.js"))
            .await;
        assert_eq!(response.status, 200);
    }

    // First hit logs, the following four are silent
    assert_eq!(harness.drain_telemetry().len(), 1);
}

proptest! {
    /// Deny-by-default: under a locked-down policy no request is ever
    /// forwarded, whatever its shape
    #[test]
    fn prop_locked_down_blocks_everything(
        method in "(GET|POST|PUT|DELETE|PATCH|HEAD)",
        host in "[a-z]{1,12}\\.(com|net|dev)",
        path in "(/[a-z0-9]{0,8}){0,3}",
        https in any::<bool>(),
    ) {
        let scheme = if https { "https" } else { "http" };
        let url = format!("{}://{}{}", scheme, host, path);

        tokio_test::block_on(async {
            let harness = Harness::new(MediatorConfig::default());
            harness.mediator.apply_policy(&NetworkPolicy::locked_down());
            let response = harness
                .mediator
                .intercept(&request(&method, &url))
                .await;
            prop_assert!(response.decision.is_blocked());
            prop_assert_eq!(response.status, 403);
            prop_assert_eq!(harness.upstream.call_count(), 0);
            Ok(())
        })?;
    }
}
