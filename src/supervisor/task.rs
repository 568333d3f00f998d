/*!
 * Heartbeat Task
 * Background driver that ticks the heartbeat monitor on its fixed
 * interval.
 *
 * Shutdown follows a graceful-with-fallback pattern: prefer
 * `shutdown().await`; if the handle is dropped without it, Drop aborts
 * the task and logs a warning.
 */

use super::Supervisor;
use crate::heartbeat::PING_INTERVAL;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Control messages for the heartbeat task
#[derive(Debug, Clone)]
pub enum HeartbeatCommand {
    /// Tick immediately instead of waiting for the interval
    Trigger,
    Shutdown,
}

/// Handle to the heartbeat background task
pub struct HeartbeatTask {
    command_tx: mpsc::UnboundedSender<HeartbeatCommand>,
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Tracks whether graceful shutdown was initiated (lock-free)
    shutdown_initiated: Arc<AtomicBool>,
}

impl HeartbeatTask {
    /// Spawn the driver for a supervisor
    pub fn spawn(supervisor: Supervisor) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let shutdown_initiated = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(async move {
            run_heartbeat_loop(supervisor, command_rx).await;
        });

        info!("heartbeat task spawned ({} ms interval)", PING_INTERVAL.as_millis());

        Self {
            command_tx,
            handle: Some(handle),
            shutdown_initiated,
        }
    }

    /// Tick immediately (testing and diagnostics)
    pub fn trigger(&self) {
        let _ = self.command_tx.send(HeartbeatCommand::Trigger);
    }

    /// Shut the task down gracefully. Consumes self to prevent
    /// use-after-shutdown.
    pub async fn shutdown(mut self) {
        self.shutdown_initiated.store(true, Ordering::SeqCst);
        let _ = self.command_tx.send(HeartbeatCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!("heartbeat task shutdown error: {}", err);
            }
        }
    }
}

impl Drop for HeartbeatTask {
    fn drop(&mut self) {
        if !self.shutdown_initiated.load(Ordering::SeqCst) {
            if let Some(handle) = self.handle.take() {
                warn!("heartbeat task dropped without shutdown(); aborting");
                handle.abort();
            }
        }
    }
}

async fn run_heartbeat_loop(
    supervisor: Supervisor,
    mut command_rx: mpsc::UnboundedReceiver<HeartbeatCommand>,
) {
    let mut interval = tokio::time::interval(PING_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick of a tokio interval completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                supervisor.heartbeat_tick().await;
            }

            Some(command) = command_rx.recv() => {
                match command {
                    HeartbeatCommand::Trigger => {
                        supervisor.heartbeat_tick().await;
                    }
                    HeartbeatCommand::Shutdown => {
                        info!("heartbeat task shutting down");
                        break;
                    }
                }
            }
        }
    }
}
