//! DeviceLifecycle - restart coordination
//!
//! ## Responsibilities
//!
//! - Record a restart request from the control plane
//! - Perform the restart from the outermost layer, after a delay that
//!   lets the pending response reach the client
//!
//! Request handlers never restart the device themselves; they only call
//! `RestartCoordinator::request` and return their response.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Default pause between the restart response and the restart
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(2000);

/// Device restart primitive
pub trait DeviceRestart: Send + Sync {
    /// Restart the device. Not expected to return on hardware.
    fn restart(&self);
}

/// Host restart: exit the process and leave the restart to the supervisor
#[derive(Debug, Clone, Copy)]
pub struct ProcessExit {
    pub code: i32,
}

impl Default for ProcessExit {
    fn default() -> Self {
        Self { code: 0 }
    }
}

impl DeviceRestart for ProcessExit {
    fn restart(&self) {
        tracing::warn!(code = self.code, "Restarting: exiting process");
        std::process::exit(self.code);
    }
}

/// Shared restart request flag
#[derive(Clone)]
pub struct RestartCoordinator {
    tx: Arc<watch::Sender<bool>>,
}

impl RestartCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Ask for a restart. Returns `false` if one was already requested.
    pub fn request(&self) -> bool {
        let first = self.tx.send_if_modified(|requested| !std::mem::replace(requested, true));
        if first {
            tracing::info!("Device restart requested");
        }
        first
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once a restart has been requested
    pub async fn requested(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|requested| *requested).await;
    }
}

impl Default for RestartCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for a restart request, pause for `delay`, then restart
pub async fn run_restart(coordinator: RestartCoordinator, delay: Duration, device: Arc<dyn DeviceRestart>) {
    coordinator.requested().await;
    tracing::info!(delay_ms = delay.as_millis() as u64, "Restart pending");
    tokio::time::sleep(delay).await;
    device.restart();
}
