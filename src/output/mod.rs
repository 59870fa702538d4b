//! Pushes rumble/LED changes from the bus to the active source driver.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::input::registry::{DriverError, Registry};
use crate::lightbar::LightbarReader;
use crate::state::bus::StateBus;
use crate::state::system::SystemStateMachine;

/// Forwarder cadence.
const TICK: Duration = Duration::from_millis(10);
/// How often the lightbar IPC record is consulted.
const LIGHTBAR_REFRESH: Duration = Duration::from_millis(500);
/// Transient send failures tolerated before a warning is logged.
const SEND_WARN_THRESHOLD: u32 = 5;

/// 100 Hz cooperative loop. The snapshot is only marked clean once a send
/// succeeds; failed deliveries re-latch the dirty flag so the next tick
/// retries naturally.
pub struct OutputForwarder {
    bus: Arc<StateBus>,
    registry: Arc<Registry>,
    system: Arc<SystemStateMachine>,
    lightbar: LightbarReader,
}

impl OutputForwarder {
    pub fn new(
        bus: Arc<StateBus>,
        registry: Arc<Registry>,
        system: Arc<SystemStateMachine>,
        lightbar: LightbarReader,
    ) -> Self {
        Self {
            bus,
            registry,
            system,
            lightbar,
        }
    }

    pub fn run(mut self, running: Arc<AtomicBool>) {
        let mut failures: u32 = 0;
        let mut last_refresh = Instant::now() - LIGHTBAR_REFRESH;

        while running.load(Ordering::SeqCst) {
            thread::sleep(TICK);

            if last_refresh.elapsed() >= LIGHTBAR_REFRESH {
                last_refresh = Instant::now();
                self.lightbar.refresh(&self.bus, &self.system);
            }

            self.deliver(&mut failures);
        }
        log::debug!("Output forwarder stopped");
    }

    /// One delivery attempt: consume the dirty flag and push the snapshot
    /// to the active driver.
    fn deliver(&self, failures: &mut u32) {
        // Only consume the dirty flag when a driver can take the update;
        // otherwise the change stays latched for later.
        let Some(driver) = self.registry.active() else {
            return;
        };
        if !self.bus.take_output_dirty() {
            return;
        }

        let output = self.bus.snapshot_output();
        match driver.send_output(&output) {
            Ok(()) => {
                if *failures >= SEND_WARN_THRESHOLD {
                    log::info!("Output delivery recovered");
                }
                *failures = 0;
            }
            Err(DriverError::Transient(e)) => {
                *failures += 1;
                if *failures == SEND_WARN_THRESHOLD {
                    log::warn!("Output delivery failing: {e}");
                }
                self.bus.mark_output_dirty();
            }
            Err(e) => {
                log::debug!("Output send on lost device: {e}");
                self.bus.mark_output_dirty();
            }
        }
    }
}

#[cfg(test)]
mod forwarder_test;
