/*!
 * Policy Types
 * The single canonical policy schema. External field names are camelCase;
 * legacy shapes (boolean proxy flags, nested capability blocks) are not
 * accepted.
 */

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Network protocol a policy may admit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    /// Map a URL scheme onto a protocol, if it is one we model
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            _ => None,
        }
    }
}

/// Caching strategy for mediator-local assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Try the network, refresh the cache, fall back to cache on failure
    #[default]
    NetworkFirst,
    /// Serve from cache when present, otherwise fetch and populate
    CacheFirst,
    /// Never read or write the cache
    NetworkOnly,
}

/// Network policy evaluated by the mediator.
///
/// Replacement is wholesale and atomic: an admitted request always
/// evaluates against one consistent snapshot, never a partially-updated
/// mix of old and new fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NetworkPolicy {
    /// Domain suffixes traffic may reach; a hostname matches when it
    /// equals an entry or is a subdomain of one
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub allow_protocols: HashSet<Protocol>,
    /// HTTP methods, uppercase
    #[serde(default)]
    pub allow_methods: HashSet<String>,
    /// Upper bound on the declared Content-Length of a forwarded response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_content_length: Option<u64>,
    /// CORS-rewriting proxy endpoint; when set, allowed traffic is
    /// rewritten to `proxyUrl?url=<encoded target>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Virtual files served by the mediator, path -> content
    #[serde(default)]
    pub files: HashMap<String, String>,
    #[serde(default)]
    pub cache_strategy: CacheStrategy,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self::locked_down()
    }
}

impl NetworkPolicy {
    /// Deny-everything policy: no domains, no protocols, no methods
    pub fn locked_down() -> Self {
        Self {
            allow: Vec::new(),
            allow_protocols: HashSet::new(),
            allow_methods: HashSet::new(),
            max_content_length: None,
            proxy_url: None,
            files: HashMap::new(),
            cache_strategy: CacheStrategy::default(),
        }
    }

    /// Permit a domain suffix
    pub fn allow_domain(mut self, domain: impl Into<String>) -> Self {
        self.allow.push(domain.into());
        self
    }

    /// Permit a protocol
    pub fn allow_protocol(mut self, protocol: Protocol) -> Self {
        self.allow_protocols.insert(protocol);
        self
    }

    /// Permit an HTTP method (stored uppercase)
    pub fn allow_method(mut self, method: impl AsRef<str>) -> Self {
        self.allow_methods.insert(method.as_ref().to_uppercase());
        self
    }

    /// Set the proxy endpoint
    pub fn with_proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy_url = Some(proxy_url.into());
        self
    }

    /// Cap the declared response length
    pub fn with_max_content_length(mut self, limit: u64) -> Self {
        self.max_content_length = Some(limit);
        self
    }

    /// Add a virtual file
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Set the cache strategy for mediator-local assets
    pub fn with_cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.cache_strategy = strategy;
        self
    }

    /// Check a method against the allow list (case-insensitive)
    pub fn method_allowed(&self, method: &str) -> bool {
        self.allow_methods.contains(&method.to_uppercase())
    }

    /// Check a protocol against the allow list
    pub fn protocol_allowed(&self, protocol: Protocol) -> bool {
        self.allow_protocols.contains(&protocol)
    }
}
