use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::OutputForwarder;
use crate::input::registry::{
    Capability, DriverDescriptor, DriverError, Registry, SourceDriver,
};
use crate::lightbar::LightbarReader;
use crate::state::bus::StateBus;
use crate::state::system::{LinkError, Ps3Link, SystemStateMachine};
use crate::state::{ControllerOutput, ControllerState};

struct NoopLink;

impl Ps3Link for NoopLink {
    fn disconnect(&self) {}
    fn wake(&self) -> Result<(), LinkError> {
        Ok(())
    }
}

static DESCRIPTOR: DriverDescriptor = DriverDescriptor {
    name: "counting",
    manufacturer: "Test",
    vendor_id: 0x054C,
    product_id: 0x0CE6,
    capabilities: &[Capability::Rumble],
};

#[derive(Default)]
struct CountingDriver {
    sends: AtomicUsize,
    fail_sends: AtomicBool,
}

impl SourceDriver for CountingDriver {
    fn descriptor(&self) -> &DriverDescriptor {
        &DESCRIPTOR
    }

    fn find_device(&self) -> Result<(), DriverError> {
        Ok(())
    }

    fn read_input(&self) -> Result<ControllerState, DriverError> {
        Ok(ControllerState::default())
    }

    fn send_output(&self, _output: &ControllerOutput) -> Result<(), DriverError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(DriverError::Transient("endpoint busy".to_string()));
        }
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&self) {}
}

fn forwarder_under_test(
    driver: Arc<CountingDriver>,
) -> (Arc<StateBus>, OutputForwarder) {
    let bus = Arc::new(StateBus::new());
    let mut registry = Registry::new();
    registry.register(driver.clone()).unwrap();
    registry.set_active(driver);
    let registry = Arc::new(registry);
    let system = Arc::new(SystemStateMachine::new(bus.clone(), Box::new(NoopLink)));
    let forwarder = OutputForwarder::new(
        bus.clone(),
        registry,
        system,
        LightbarReader::new(),
    );
    (bus, forwarder)
}

#[test]
fn one_change_causes_exactly_one_send() {
    let driver = Arc::new(CountingDriver::default());
    let (bus, forwarder) = forwarder_under_test(driver.clone());
    let mut failures = 0;

    let output = ControllerOutput {
        rumble_left: 0x80,
        rumble_right: 0xFF,
        ..Default::default()
    };
    bus.update_output(&output);

    forwarder.deliver(&mut failures);
    assert_eq!(driver.sends.load(Ordering::SeqCst), 1);

    // No further change: subsequent ticks stay quiet.
    forwarder.deliver(&mut failures);
    forwarder.deliver(&mut failures);
    assert_eq!(driver.sends.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_send_keeps_the_snapshot_dirty() {
    let driver = Arc::new(CountingDriver::default());
    driver.fail_sends.store(true, Ordering::SeqCst);
    let (bus, forwarder) = forwarder_under_test(driver.clone());
    let mut failures = 0;

    bus.update_output(&ControllerOutput {
        rumble_left: 1,
        ..Default::default()
    });

    // Retries happen naturally on later ticks while sends keep failing.
    for _ in 0..7 {
        forwarder.deliver(&mut failures);
    }
    assert_eq!(driver.sends.load(Ordering::SeqCst), 0);
    assert_eq!(failures, 7);

    // Once the driver recovers, the still-dirty snapshot is delivered.
    driver.fail_sends.store(false, Ordering::SeqCst);
    forwarder.deliver(&mut failures);
    assert_eq!(driver.sends.load(Ordering::SeqCst), 1);
    assert_eq!(failures, 0);

    forwarder.deliver(&mut failures);
    assert_eq!(driver.sends.load(Ordering::SeqCst), 1);
}
