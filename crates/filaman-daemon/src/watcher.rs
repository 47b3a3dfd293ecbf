//! Presence watcher
//!
//! Polls the status flags and fires `on_presence_interrupt` when they change,
//! standing in for the device's interrupt line.

use filaman_core::StatusSnapshot;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::state::{AppState, DeviceError, FilamentChanged};

pub struct PresenceWatcher {
    state: Arc<AppState>,
    last: Option<StatusSnapshot>,
    healthy: bool,
}

impl PresenceWatcher {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            last: None,
            healthy: true,
        }
    }

    /// Poll once; returns the event sent if the status changed
    pub async fn poll_once(&mut self) -> Result<Option<FilamentChanged>, DeviceError> {
        let status = self.state.get_status().await?;
        if self.last == Some(status) {
            return Ok(None);
        }

        debug!(previous = ?self.last, current = ?status, "Presence status changed");
        let event = self.state.on_presence_interrupt().await?;
        self.last = Some(event.status);
        Ok(Some(event))
    }

    /// Poll forever at `period`
    pub async fn run(mut self, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_ms = period.as_millis() as u64, "Presence watcher started");

        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(_) => {
                    if !self.healthy {
                        info!("Filament manager reachable again");
                        self.healthy = true;
                    }
                }
                Err(e) => {
                    // Report once per outage, not every tick
                    if self.healthy {
                        warn!(error = %e, "Presence poll failed");
                        self.healthy = false;
                    }
                    self.last = None;
                }
            }
        }
    }
}
