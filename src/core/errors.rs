/*!
 * Error Types
 * Centralized error handling with thiserror
 */

// Re-export MediatorError and UpstreamError from mediator module
pub use crate::mediator::upstream::UpstreamError;
pub use crate::mediator::MediatorError;

// Re-export RelayError from relay module
pub use crate::relay::RelayError;

// Re-export SupervisorError from supervisor module
pub use crate::supervisor::SupervisorError;
