//! Fixed-capacity source driver registry with registration-order matching.
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::state::{ControllerOutput, ControllerState};

/// Maximum number of drivers the registry will hold.
pub const MAX_DRIVERS: usize = 16;

/// What a source driver can do beyond plain buttons and sticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Motion,
    Touchpad,
    Rumble,
    Lightbar,
}

/// Static identity of a source driver.
#[derive(Debug, Clone)]
pub struct DriverDescriptor {
    pub name: &'static str,
    pub manufacturer: &'static str,
    pub vendor_id: u16,
    pub product_id: u16,
    pub capabilities: &'static [Capability],
}

/// The enumerated sentinels a driver may return across the registry
/// boundary. Everything else is recovered inside the driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// No compatible device is present. Callers re-scan later.
    #[error("no compatible device found")]
    NoDevice,
    /// A retryable fault; the caller retries on the next tick.
    #[error("transient device error: {0}")]
    Transient(String),
    /// The device is gone; the caller drops the driver and re-scans.
    #[error("device disconnected: {0}")]
    Disconnected(String),
}

/// Contract every source driver implements. The handle to the underlying
/// device is owned inside the driver; `find_device` binds it and
/// `shutdown` releases it.
pub trait SourceDriver: Send + Sync {
    fn descriptor(&self) -> &DriverDescriptor;

    /// Whether this driver can serve the given USB identity.
    fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        let desc = self.descriptor();
        desc.vendor_id == vendor_id && desc.product_id == product_id
    }

    /// Locate and bind a device. Returns [DriverError::NoDevice] when
    /// nothing compatible is connected.
    fn find_device(&self) -> Result<(), DriverError>;

    /// Blocking read of the next normalized input snapshot.
    fn read_input(&self) -> Result<ControllerState, DriverError>;

    /// Push the desired output state to the device.
    fn send_output(&self, output: &ControllerOutput) -> Result<(), DriverError>;

    /// Release the bound device, unblocking any reader.
    fn shutdown(&self);
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("driver table is full ({MAX_DRIVERS} entries)")]
    Full,
}

/// Registry of source drivers, registration order preserved. The active
/// driver is the one whose `find_device` last succeeded; it is shared
/// read-only with the output forwarder.
pub struct Registry {
    drivers: Vec<Arc<dyn SourceDriver>>,
    active: RwLock<Option<Arc<dyn SourceDriver>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            drivers: Vec::new(),
            active: RwLock::new(None),
        }
    }

    /// Add a driver. Order of registration decides match precedence.
    pub fn register(&mut self, driver: Arc<dyn SourceDriver>) -> Result<(), RegistryError> {
        if self.drivers.len() >= MAX_DRIVERS {
            return Err(RegistryError::Full);
        }
        log::debug!("Registered driver: {}", driver.descriptor().name);
        self.drivers.push(driver);
        Ok(())
    }

    /// First registered driver matching the given identity.
    pub fn find(&self, vendor_id: u16, product_id: u16) -> Option<Arc<dyn SourceDriver>> {
        self.drivers
            .iter()
            .find(|d| d.matches(vendor_id, product_id))
            .cloned()
    }

    /// Probe each driver in registration order; the first one that binds a
    /// device becomes the active driver. Returns None when no device is
    /// present anywhere.
    pub fn scan(&self) -> Option<Arc<dyn SourceDriver>> {
        for driver in &self.drivers {
            match driver.find_device() {
                Ok(()) => {
                    let desc = driver.descriptor();
                    log::info!("Found {} ({})", desc.name, desc.manufacturer);
                    self.set_active(driver.clone());
                    return Some(driver.clone());
                }
                Err(DriverError::NoDevice) => continue,
                Err(e) => {
                    log::debug!("Probe failed for {}: {e}", driver.descriptor().name);
                    continue;
                }
            }
        }
        None
    }

    pub fn set_active(&self, driver: Arc<dyn SourceDriver>) {
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = Some(driver);
    }

    pub fn clear_active(&self) {
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn active(&self) -> Option<Arc<dyn SourceDriver>> {
        self.active.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
