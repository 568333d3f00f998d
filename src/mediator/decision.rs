/*!
 * Decisions
 * The mediator's resolved outcome for one intercepted request
 */

use super::cache::CacheEntry;
use std::fmt;
use url::Url;

/// How an allowed request is forwarded
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardMode {
    Direct,
    /// Rewritten to the proxy endpoint: `proxyUrl?url=<encoded target>`
    ViaProxy(Url),
}

/// Why a request was blocked. Maps onto the response status surfaced to
/// the context: 403 for policy violations, 413 for size, 502 for
/// upstream failures.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockReason {
    ProtocolDenied { scheme: String },
    MethodDenied { method: String },
    DomainDenied { host: String },
    TooLarge { declared: u64, limit: u64 },
    UpstreamFailure { detail: String, hint: Option<String> },
    NoRule { url: String },
}

impl BlockReason {
    pub fn status(&self) -> u16 {
        match self {
            BlockReason::TooLarge { .. } => 413,
            BlockReason::UpstreamFailure { .. } => 502,
            _ => 403,
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::ProtocolDenied { scheme } => {
                write!(f, "protocol '{}' is not allowed by policy", scheme)
            }
            BlockReason::MethodDenied { method } => {
                write!(f, "method '{}' is not allowed by policy", method)
            }
            BlockReason::DomainDenied { host } => {
                write!(f, "host '{}' is not allowed by policy", host)
            }
            BlockReason::TooLarge { declared, limit } => write!(
                f,
                "response declares {} bytes, over the {} byte limit",
                declared, limit
            ),
            BlockReason::UpstreamFailure { detail, hint } => match hint {
                Some(hint) => write!(f, "upstream fetch failed: {} ({})", detail, hint),
                None => write!(f, "upstream fetch failed: {}", detail),
            },
            BlockReason::NoRule { url } => {
                write!(f, "no policy rule admits request to '{}'", url)
            }
        }
    }
}

/// Resolved outcome for one intercepted request. Every admitted request
/// ends in exactly one of these; no evaluation path raises an unhandled
/// fault past the interception seam.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Served from the virtual file map
    ServeVirtual(String),
    /// Served from the local-asset cache layer
    ServeCache(CacheEntry),
    /// Forwarded upstream, directly or through the proxy
    Forward(ForwardMode),
    Block(BlockReason),
}

impl Decision {
    /// Response status surfaced to the context
    pub fn status(&self) -> u16 {
        match self {
            Decision::ServeVirtual(_) | Decision::ServeCache(_) | Decision::Forward(_) => 200,
            Decision::Block(reason) => reason.status(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Decision::Block(_))
    }
}
