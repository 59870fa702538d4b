use packed_struct::prelude::*;

use super::hid_report::{parse_output_report, Ds3InputReport};
use crate::state::{Buttons, ControllerState};

#[test]
fn cross_lands_in_byte_three_bit_six() {
    let mut state = ControllerState::default();
    state.buttons.set(Buttons::CROSS, true);

    let raw = Ds3InputReport::from_state(&state).pack().unwrap();
    assert_eq!(raw[0], 0x01);
    assert_eq!(raw[3] & 0x40, 0x40);

    // Pressure byte for cross follows the digital state.
    assert_eq!(raw[24], 0xFF);
}

#[test]
fn ds3_button_order_matches_the_wire_layout() {
    let mut state = ControllerState::default();
    state.buttons.set(Buttons::SELECT, true);
    state.buttons.set(Buttons::START, true);
    state.buttons.set(Buttons::DPAD_LEFT, true);
    state.buttons.set(Buttons::L2, true);
    state.buttons.set(Buttons::SQUARE, true);
    state.buttons.set(Buttons::PS, true);

    let raw = Ds3InputReport::from_state(&state).pack().unwrap();
    assert_eq!(raw[2], 0x01 | 0x08 | 0x80); // select, start, dpad left
    assert_eq!(raw[3], 0x01 | 0x80); // l2, square
    assert_eq!(raw[4], 0x01); // ps
}

#[test]
fn triggers_pass_analog_values_through() {
    let mut state = ControllerState::default();
    state.buttons.set(Buttons::L2, true);
    state.l2_trigger = 0x42;
    state.r2_trigger = 0x00;

    let report = Ds3InputReport::from_state(&state);
    assert_eq!(report.pressure_l2, 0x42);
    assert_eq!(report.pressure_r2, 0x00);
}

#[test]
fn neutral_report_is_centered() {
    let raw = Ds3InputReport::neutral().pack().unwrap();
    assert_eq!(raw.len(), 48);
    assert_eq!(raw[2], 0);
    assert_eq!(raw[3], 0);
    assert_eq!(&raw[6..10], &[128, 128, 128, 128]);
    // Motion words sit at the 10-bit midpoint, big-endian.
    assert_eq!(&raw[40..42], &[0x02, 0x00]);
    assert_eq!(&raw[46..48], &[0x02, 0x00]);
}

#[test]
fn battery_and_charging_encode() {
    let state = ControllerState {
        battery_level: 100,
        ..Default::default()
    };
    assert_eq!(Ds3InputReport::from_state(&state).battery, 5);

    let state = ControllerState {
        battery_level: 39,
        ..Default::default()
    };
    assert_eq!(Ds3InputReport::from_state(&state).battery, 1);

    let state = ControllerState {
        battery_level: 50,
        battery_charging: true,
        ..Default::default()
    };
    assert_eq!(Ds3InputReport::from_state(&state).battery, 0xEE);
}

#[test]
fn output_report_parses_with_and_without_id() {
    let with_id = [0x01, 0x00, 0x11, 0x00, 0x22, 0, 0, 0, 0, 0x1E];
    let parsed = parse_output_report(&with_id).unwrap();
    assert_eq!(parsed.rumble_left, 0x11);
    assert_eq!(parsed.rumble_right, 0x22);
    assert_eq!(parsed.player_leds, 0x0F);

    let without_id = [0x00, 0x11, 0x00, 0x22, 0, 0, 0, 0, 0x02];
    let parsed = parse_output_report(&without_id).unwrap();
    assert_eq!(parsed.rumble_left, 0x11);
    assert_eq!(parsed.player_leds, 0x01);

    assert!(parse_output_report(&[0x01, 0x02]).is_none());
}
