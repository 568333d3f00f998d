/*!
 * Policy Store
 * RCU-style atomic policy replacement: readers load a consistent
 * snapshot, writers swap the whole policy wholesale
 */

use super::types::NetworkPolicy;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Single-owner store for the current network policy.
///
/// Reads are lock-free pointer loads; a snapshot taken at request
/// admission stays valid for the full evaluation even if a replacement
/// lands mid-flight. The policy is never mutated in place.
pub struct PolicyStore {
    inner: ArcSwap<NetworkPolicy>,
}

impl PolicyStore {
    pub fn new(policy: NetworkPolicy) -> Self {
        Self {
            inner: ArcSwap::from_pointee(policy),
        }
    }

    /// Load the current snapshot (zero-contention)
    #[inline]
    pub fn snapshot(&self) -> Arc<NetworkPolicy> {
        self.inner.load_full()
    }

    /// Replace the policy wholesale, returning the previous snapshot
    pub fn replace(&self, policy: NetworkPolicy) -> Arc<NetworkPolicy> {
        self.inner.swap(Arc::new(policy))
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(NetworkPolicy::locked_down())
    }
}
