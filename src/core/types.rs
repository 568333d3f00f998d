/*!
 * Core Types
 * Common types used across the warden
 */

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Identifier of one execution-context instance
pub type ContextId = Uuid;

/// Identifier of one intercepted request
pub type RequestId = Uuid;

/// Generation counter for the heartbeat private channel.
/// Bumped each time a context is provisioned so replies from a
/// superseded instance can be discarded.
pub type Epoch = u64;

/// Timestamp in milliseconds since the Unix epoch
pub type TimestampMs = u64;

/// Current wall-clock time in milliseconds
pub fn now_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
