use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::registry::{
    Capability, DriverDescriptor, DriverError, Registry, RegistryError, SourceDriver, MAX_DRIVERS,
};
use crate::state::{ControllerOutput, ControllerState};

struct FakeDriver {
    descriptor: DriverDescriptor,
    present: AtomicBool,
}

impl FakeDriver {
    fn new(name: &'static str, vendor_id: u16, product_id: u16, present: bool) -> Arc<Self> {
        Arc::new(Self {
            descriptor: DriverDescriptor {
                name,
                manufacturer: "Test",
                vendor_id,
                product_id,
                capabilities: &[Capability::Rumble],
            },
            present: AtomicBool::new(present),
        })
    }
}

impl SourceDriver for FakeDriver {
    fn descriptor(&self) -> &DriverDescriptor {
        &self.descriptor
    }

    fn find_device(&self) -> Result<(), DriverError> {
        if self.present.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DriverError::NoDevice)
        }
    }

    fn read_input(&self) -> Result<ControllerState, DriverError> {
        Ok(ControllerState::default())
    }

    fn send_output(&self, _output: &ControllerOutput) -> Result<(), DriverError> {
        Ok(())
    }

    fn shutdown(&self) {}
}

#[test]
fn find_prefers_registration_order() {
    let mut registry = Registry::new();
    registry
        .register(FakeDriver::new("first", 0x054C, 0x0CE6, false))
        .unwrap();
    registry
        .register(FakeDriver::new("second", 0x054C, 0x0CE6, false))
        .unwrap();

    let found = registry.find(0x054C, 0x0CE6).unwrap();
    assert_eq!(found.descriptor().name, "first");
    assert!(registry.find(0x054C, 0xFFFF).is_none());
}

#[test]
fn scan_picks_first_present_device_and_sets_active() {
    let mut registry = Registry::new();
    registry
        .register(FakeDriver::new("absent", 0x054C, 0x0CE6, false))
        .unwrap();
    registry
        .register(FakeDriver::new("present", 0x054C, 0x0DF2, true))
        .unwrap();

    assert!(registry.active().is_none());
    let driver = registry.scan().unwrap();
    assert_eq!(driver.descriptor().name, "present");
    assert_eq!(registry.active().unwrap().descriptor().name, "present");

    registry.clear_active();
    assert!(registry.active().is_none());
}

#[test]
fn scan_with_no_devices_is_not_fatal() {
    let mut registry = Registry::new();
    registry
        .register(FakeDriver::new("absent", 0x054C, 0x0CE6, false))
        .unwrap();
    assert!(registry.scan().is_none());
    assert!(registry.active().is_none());
}

#[test]
fn registration_fails_when_table_is_full() {
    let mut registry = Registry::new();
    for i in 0..MAX_DRIVERS {
        registry
            .register(FakeDriver::new("filler", 0x1000, i as u16, false))
            .unwrap();
    }
    let result = registry.register(FakeDriver::new("extra", 0x1000, 0xFFFF, false));
    assert!(matches!(result, Err(RegistryError::Full)));
}
