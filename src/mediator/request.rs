/*!
 * Intercepted Requests
 */

use super::MediatorError;
use crate::core::types::{ContextId, RequestId};
use crate::policy::Protocol;
use url::Url;
use uuid::Uuid;

/// One outbound request admitted for mediation. Immutable once admitted.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    /// HTTP method, normalized uppercase
    pub method: String,
    pub url: Url,
    /// Context instance that issued the request
    pub context_id: ContextId,
    pub request_id: RequestId,
}

impl InterceptedRequest {
    /// Admit a raw request. The URL is parsed once here; evaluation
    /// never re-parses.
    pub fn admit(
        method: &str,
        url: &str,
        context_id: ContextId,
    ) -> Result<Self, MediatorError> {
        if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(MediatorError::UnsupportedMethod(method.to_string()));
        }
        let url = Url::parse(url).map_err(|e| MediatorError::MalformedUrl(e.to_string()))?;
        Ok(Self {
            method: method.to_uppercase(),
            url,
            context_id,
            request_id: Uuid::new_v4(),
        })
    }

    /// Hostname, empty for host-less URLs
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or("")
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Protocol, None when the scheme is outside the modeled set
    pub fn protocol(&self) -> Option<Protocol> {
        Protocol::from_scheme(self.url.scheme())
    }
}
