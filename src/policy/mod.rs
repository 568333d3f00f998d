/*!
 * Network Policy
 * Canonical policy schema, hostname matching, and the atomically
 * replaceable policy store
 */

pub mod matching;
pub mod store;
pub mod types;

pub use matching::domain_allowed;
pub use store::PolicyStore;
pub use types::{CacheStrategy, NetworkPolicy, Protocol};
