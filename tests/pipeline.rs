//! End-to-end checks over the translation pipeline, without hardware:
//! bus in, profile shaping, DualShock 3 synthesis, and the output path
//! back from the console.
use std::sync::Arc;

use packed_struct::PackedStruct;

use padbridge::profile::applier::Applier;
use padbridge::profile::Profile;
use padbridge::state::bus::StateBus;
use padbridge::state::system::{LinkError, Ps3Link, SystemStateMachine};
use padbridge::state::{now_ms, Buttons, ControllerState};
use padbridge::target::ps3::handshake::{Handshake, SetReportAction};
use padbridge::target::ps3::hid_report::Ds3InputReport;
use padbridge::target::ps3::push_host_output;

struct NoopLink;

impl Ps3Link for NoopLink {
    fn disconnect(&self) {}
    fn wake(&self) -> Result<(), LinkError> {
        Ok(())
    }
}

fn completed_handshake() -> Handshake {
    let mut handshake = Handshake::new([0x11; 6], [0x22; 6]);
    handshake.on_enumerated();
    handshake.handle_get_report(0x03F2);
    handshake.handle_get_report(0x03F5);
    handshake.handle_set_report(0x03F4, &[0x42, 0x0C, 0x00, 0x00]);
    assert!(handshake.is_operational());
    handshake
}

#[test]
fn cross_press_reaches_the_console_side_report() {
    let bus = StateBus::new();
    let mut applier = Applier::new(Profile::default());

    let mut state = ControllerState::default();
    state.buttons.set(Buttons::CROSS, true);
    state.timestamp_ms = now_ms();
    bus.update_input(&state);

    let shaped = applier.apply(&bus.snapshot_input(), now_ms());
    let raw = Ds3InputReport::from_state(&shaped).pack().unwrap();

    assert_eq!(raw[3] & 0x40, 0x40);
}

#[test]
fn remapped_press_lands_on_the_substituted_bit() {
    let bus = StateBus::new();
    let profile =
        Profile::from_json(r#"{"remaps": [{"source": "cross", "target": "triangle"}]}"#).unwrap();
    let mut applier = Applier::new(profile);

    let mut state = ControllerState::default();
    state.buttons.set(Buttons::CROSS, true);
    bus.update_input(&state);

    let shaped = applier.apply(&bus.snapshot_input(), now_ms());
    let raw = Ds3InputReport::from_state(&shaped).pack().unwrap();

    // Triangle (byte 3, bit 4) instead of cross (byte 3, bit 6).
    assert_eq!(raw[3] & 0x10, 0x10);
    assert_eq!(raw[3] & 0x40, 0x00);
}

#[test]
fn console_rumble_report_lands_on_the_output_bus() {
    let bus = Arc::new(StateBus::new());
    let system = SystemStateMachine::new(bus.clone(), Box::new(NoopLink));
    let mut handshake = completed_handshake();

    let payload = [
        0x01, 0x00, 0x80, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x02,
    ];
    let action = handshake.handle_set_report(0x0101, &payload);
    let SetReportAction::Output(output) = action else {
        panic!("expected an output action");
    };
    push_host_output(&bus, &system, output);

    let out = bus.snapshot_output();
    assert_eq!(out.rumble_left, 0x80);
    assert_eq!(out.rumble_right, 0xFF);
    // Exactly one dirty latch for the forwarder to consume.
    assert!(bus.take_output_dirty());
    assert!(!bus.take_output_dirty());
}

#[test]
fn host_led_fields_are_discarded_during_standby() {
    let bus = Arc::new(StateBus::new());
    let system = SystemStateMachine::new(bus.clone(), Box::new(NoopLink));
    let mut handshake = completed_handshake();

    system.enter_standby();
    let leds_before = bus.snapshot_output().player_leds;

    let payload = [
        0x01, 0x00, 0x10, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x1E,
    ];
    let SetReportAction::Output(output) = handshake.handle_set_report(0x0101, &payload) else {
        panic!("expected an output action");
    };
    push_host_output(&bus, &system, output);

    let out = bus.snapshot_output();
    assert_eq!(out.rumble_left, 0x10);
    assert_eq!(out.player_leds, leds_before);
}
