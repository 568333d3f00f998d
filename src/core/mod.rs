/*!
 * Core Module
 * Shared types and centralized error handling
 */

pub mod errors;
pub mod types;

pub use errors::*;
pub use types::*;
