/*!
 * Mediator
 * Policy-enforcement engine: intercepts every outbound request from the
 * execution context and resolves it to a Decision
 */

pub mod cache;
pub mod decision;
pub mod engine;
pub mod request;
pub mod upstream;
pub mod vfs;

pub use cache::{CacheEntry, CacheManager, CacheStore, MemoryCacheStore};
pub use decision::{BlockReason, Decision, ForwardMode};
pub use engine::{MediatedResponse, Mediator, MediatorConfig};
pub use request::InterceptedRequest;
pub use upstream::{HttpUpstream, Upstream, UpstreamResponse};
pub use vfs::VirtualFs;

use thiserror::Error;

/// Errors raised at request admission, before a Decision exists.
/// Once a request is admitted, every outcome resolves to a Decision.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediatorError {
    #[error("malformed request URL: {0}")]
    MalformedUrl(String),

    #[error("unsupported request method: {0}")]
    UnsupportedMethod(String),
}
