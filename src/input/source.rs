//! Blocking poll loop over the active source driver.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::registry::{DriverError, Registry};
use crate::state::bus::StateBus;
use crate::state::system::{PsButtonMonitor, SystemStateMachine};

/// How long to wait between scans while no device is present.
const RESCAN_DELAY: Duration = Duration::from_millis(1000);
/// Transient read failures tolerated before a warning is logged.
const TRANSIENT_WARN_THRESHOLD: u32 = 5;

/// Runs until shutdown: binds a source device, decodes its reports into
/// the bus, and feeds the PS button monitor. Device loss drops back into
/// the scan loop.
pub fn run(
    registry: Arc<Registry>,
    bus: Arc<StateBus>,
    system: Arc<SystemStateMachine>,
    running: Arc<AtomicBool>,
) {
    let mut monitor = PsButtonMonitor::new();
    let mut transient_failures: u32 = 0;
    let mut announced_waiting = false;

    while running.load(Ordering::SeqCst) {
        let Some(driver) = registry.active().or_else(|| registry.scan()) else {
            if !announced_waiting {
                log::info!("Waiting for a source controller");
                announced_waiting = true;
            }
            thread::sleep(RESCAN_DELAY);
            continue;
        };
        announced_waiting = false;

        match driver.read_input() {
            Ok(state) => {
                if transient_failures >= TRANSIENT_WARN_THRESHOLD {
                    log::info!("Source reads recovered");
                }
                transient_failures = 0;
                bus.update_input(&state);
                monitor.observe(&state, &system);
            }
            Err(DriverError::Transient(e)) => {
                transient_failures += 1;
                if transient_failures == TRANSIENT_WARN_THRESHOLD {
                    log::warn!("Source reads failing: {e}");
                }
            }
            Err(e) => {
                log::warn!("Source device lost: {e}");
                driver.shutdown();
                registry.clear_active();
                transient_failures = 0;
            }
        }
    }

    // Release the device so a blocked reader elsewhere unwinds too.
    if let Some(driver) = registry.active() {
        driver.shutdown();
        registry.clear_active();
    }
    log::debug!("Source input loop stopped");
}
