/*!
 * Heartbeat Monitor
 * Liveness and integrity probe for the mediator.
 *
 * The execution context is deliberately granted same-trust-domain reach
 * into the mediator's control surface (the mediator could not intercept
 * its traffic otherwise), so a withheld pong is the only reliable tamper
 * signal. This is a compensating control, not a closure of that hole: a
 * mediator compromised in a way that keeps answering pongs is out of
 * reach. Threshold breach triggers an immediate rebuild with no grace
 * period and no backoff.
 *
 * The monitor is a pure tick-driven state machine; the supervisor owns
 * the interval task that drives it.
 */

use crate::core::types::{Epoch, TimestampMs};
use log::{debug, warn};
use std::time::Duration;

/// Probe interval T
pub const PING_INTERVAL: Duration = Duration::from_millis(2000);

/// Consecutive misses K before a reset fires
pub const MISS_THRESHOLD: u32 = 5;

/// Private-channel payloads
pub const MSG_PING: &str = "PING";
pub const MSG_PONG: &str = "PONG";
pub const MSG_CONNECTED: &str = "CONNECTED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatPhase {
    Disconnected,
    AwaitingConnect,
    Connected,
    /// Connected but with `n` consecutive unanswered pings
    Degraded(u32),
    Resetting,
}

/// What the driver must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    Idle,
    /// Post a PING on the private channel
    Ping,
    /// Threshold breached: tear down and rebuild the context
    Reset,
}

pub struct HeartbeatMonitor {
    phase: HeartbeatPhase,
    last_pong_at: Option<TimestampMs>,
    missed_count: u32,
    channel_epoch: Epoch,
    ping_pending: bool,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self {
            phase: HeartbeatPhase::Disconnected,
            last_pong_at: None,
            missed_count: 0,
            channel_epoch: 0,
            ping_pending: false,
        }
    }

    pub fn phase(&self) -> HeartbeatPhase {
        self.phase
    }

    pub fn missed_count(&self) -> u32 {
        self.missed_count
    }

    pub fn epoch(&self) -> Epoch {
        self.channel_epoch
    }

    pub fn last_pong_at(&self) -> Option<TimestampMs> {
        self.last_pong_at
    }

    /// Register the private channel of a freshly provisioned context.
    /// Bumps the channel epoch so replies from a superseded instance can
    /// be told apart and discarded.
    pub fn register_channel(&mut self) -> Epoch {
        if self.phase != HeartbeatPhase::Disconnected {
            warn!(
                "heartbeat channel registered while {:?}; re-arming",
                self.phase
            );
        }
        self.channel_epoch += 1;
        self.phase = HeartbeatPhase::AwaitingConnect;
        self.missed_count = 0;
        self.last_pong_at = None;
        self.ping_pending = false;
        debug!("heartbeat channel registered, epoch {}", self.channel_epoch);
        self.channel_epoch
    }

    /// Connected ack from the context. Issues the initial probe.
    pub fn on_connected(&mut self, epoch: Epoch) -> HeartbeatAction {
        if epoch != self.channel_epoch || self.phase != HeartbeatPhase::AwaitingConnect {
            return HeartbeatAction::Idle;
        }
        self.phase = HeartbeatPhase::Connected;
        self.missed_count = 0;
        self.ping_pending = true;
        HeartbeatAction::Ping
    }

    /// Pong received. Replies carrying a stale epoch belong to a
    /// superseded context instance and are dropped.
    pub fn on_pong(&mut self, epoch: Epoch, now: TimestampMs) {
        if epoch != self.channel_epoch {
            debug!("discarding pong from stale epoch {}", epoch);
            return;
        }
        match self.phase {
            HeartbeatPhase::Connected | HeartbeatPhase::Degraded(_) => {
                self.ping_pending = false;
                self.missed_count = 0;
                self.last_pong_at = Some(now);
                self.phase = HeartbeatPhase::Connected;
            }
            _ => {}
        }
    }

    /// One interval elapsed. While connected: an unanswered ping counts
    /// as a miss and is re-pinged; an answered one is followed by a
    /// fresh probe. The K-th consecutive miss fires the reset.
    pub fn tick(&mut self) -> HeartbeatAction {
        match self.phase {
            HeartbeatPhase::Connected | HeartbeatPhase::Degraded(_) => {
                if self.ping_pending {
                    self.missed_count += 1;
                    if self.missed_count >= MISS_THRESHOLD {
                        warn!(
                            "heartbeat missed {} consecutive pings; mediator presumed \
                             compromised or disabled",
                            self.missed_count
                        );
                        self.phase = HeartbeatPhase::Resetting;
                        return HeartbeatAction::Reset;
                    }
                    self.phase = HeartbeatPhase::Degraded(self.missed_count);
                    HeartbeatAction::Ping
                } else {
                    self.ping_pending = true;
                    HeartbeatAction::Ping
                }
            }
            _ => HeartbeatAction::Idle,
        }
    }

    /// Rebuild finished; the cycle resumes once the new context reaches
    /// ready and registers a fresh channel.
    pub fn on_reset_complete(&mut self) {
        self.phase = HeartbeatPhase::Disconnected;
        self.missed_count = 0;
        self.last_pong_at = None;
        self.ping_pending = false;
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new()
    }
}
