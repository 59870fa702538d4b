use packed_struct::prelude::*;

use super::driver::{
    decode_input, Transport, INPUT_REPORT_BT, INPUT_REPORT_BT_SIZE, INPUT_REPORT_USB_SIZE,
    OUTPUT_REPORT_BT_SIZE,
};
use super::hid_report::{
    bt_output_crc, encode_output_bt, encode_output_usb, Direction, UsbInputReport,
};
use crate::state::{Buttons, ControllerOutput, ControllerState, TouchPoint};

fn sample_state() -> ControllerState {
    let mut state = ControllerState {
        left_stick_x: 32,
        left_stick_y: 200,
        right_stick_x: 128,
        right_stick_y: 90,
        l2_trigger: 0x55,
        r2_trigger: 0xAA,
        accel: [-1200, 300, 8100],
        gyro: [15, -7, 1024],
        touch: [
            TouchPoint {
                id: 0x03,
                x: 1919,
                y: 1068,
            },
            TouchPoint::default(),
        ],
        battery_level: 70,
        battery_charging: true,
        timestamp_ms: 42,
        ..Default::default()
    };
    state.buttons.set(Buttons::CROSS, true);
    state.buttons.set(Buttons::L1, true);
    state.buttons.set(Buttons::PS, true);
    state.buttons.set(Buttons::DPAD_UP, true);
    state.buttons.set(Buttons::DPAD_RIGHT, true);
    state
}

#[test]
fn usb_report_round_trips_modeled_fields() {
    let state = sample_state();
    let raw = UsbInputReport::from_state(&state).pack().unwrap();

    let (decoded, transport) = decode_input(&raw, 42).unwrap();
    assert_eq!(transport, Transport::Usb);
    assert_eq!(decoded, state);
}

#[test]
fn bt_full_report_is_usb_payload_shifted() {
    let state = sample_state();
    let usb = UsbInputReport::from_state(&state).pack().unwrap();

    let mut bt = [0u8; INPUT_REPORT_BT_SIZE];
    bt[0] = INPUT_REPORT_BT;
    bt[1] = 0x01; // sequence tag
    bt[2..INPUT_REPORT_USB_SIZE + 1].copy_from_slice(&usb[1..]);

    let (decoded, transport) = decode_input(&bt, 42).unwrap();
    assert_eq!(transport, Transport::Bluetooth);
    assert_eq!(decoded, state);
}

#[test]
fn report_variants_are_told_apart_by_id_and_length() {
    // Simplified Bluetooth report: same id as USB, ten bytes long.
    let mut compat = [0u8; 10];
    compat[0] = 0x01;
    compat[1..5].copy_from_slice(&[128, 128, 128, 128]);
    compat[5] = 0x08; // hat neutral in the low nibble
    let (state, transport) = decode_input(&compat, 0).unwrap();
    assert_eq!(transport, Transport::Bluetooth);
    assert_eq!(state.left_stick_x, 128);

    // Garbage length is rejected, not guessed at.
    assert!(decode_input(&compat[..7], 0).is_err());
}

#[test]
fn hat_nibble_expands_to_directional_bits() {
    let mut report = UsbInputReport::new();
    report.dpad = Direction::SouthWest;
    let state = report.to_state(0);
    assert!(state.buttons.contains(Buttons::DPAD_DOWN));
    assert!(state.buttons.contains(Buttons::DPAD_LEFT));
    assert!(!state.buttons.contains(Buttons::DPAD_UP));
    assert!(!state.buttons.contains(Buttons::DPAD_RIGHT));

    report.dpad = Direction::None;
    let state = report.to_state(0);
    assert_eq!(state.buttons.0 & 0b1111 << 10, 0);
}

#[test]
fn touch_contact_keeps_inactive_high_bit() {
    let mut report = UsbInputReport::new();
    report.touch_data.touch_finger_data[0].context = 0x05;
    report.touch_data.touch_finger_data[0].set_x(1919);
    report.touch_data.touch_finger_data[0].set_y(1068);

    let state = report.to_state(0);
    assert!(state.touch[0].is_active());
    assert_eq!((state.touch[0].x, state.touch[0].y), (1919, 1068));
    // Slot 1 was never touched.
    assert!(!state.touch[1].is_active());
    assert_eq!(state.touch[1].id & TouchPoint::INACTIVE, TouchPoint::INACTIVE);
}

#[test]
fn usb_output_report_places_rumble_and_leds() {
    let output = ControllerOutput {
        rumble_left: 0x40,
        rumble_right: 0x80,
        led_r: 1,
        led_g: 2,
        led_b: 3,
        player_leds: 0b0000_0101,
        player_brightness: 255,
    };
    let buf = encode_output_usb(&output).unwrap();

    assert_eq!(buf.len(), 63);
    assert_eq!(buf[0], 0x02);
    // valid-flag bits the firmware requires before honoring the payload
    assert_eq!(buf[1], 0x03);
    assert_eq!(buf[2], 0x15);
    assert_eq!(buf[3], 0x80); // right motor
    assert_eq!(buf[4], 0x40); // left motor
    assert_eq!(buf[44], 0x10 | 0x04); // players 1 and 3
    assert_eq!(&buf[45..48], &[1, 2, 3]);
}

#[test]
fn bt_output_report_carries_seeded_crc() {
    let output = ControllerOutput {
        rumble_left: 10,
        rumble_right: 20,
        ..Default::default()
    };
    let buf = encode_output_bt(&output, 3).unwrap();

    assert_eq!(buf.len(), OUTPUT_REPORT_BT_SIZE);
    assert_eq!(buf[0], 0x31);
    assert_eq!(buf[1], 3 << 4);
    assert_eq!(buf[2], 0x10);

    let crc = u32::from_le_bytes(buf[74..78].try_into().unwrap());
    assert_eq!(crc, bt_output_crc(&buf[..74]));

    // Cross-check the seeded CRC against a bitwise reference.
    let mut reference: u32 = 0xFFFF_FFFF;
    for &byte in std::iter::once(&0xA2u8).chain(buf[..74].iter()) {
        reference ^= u32::from(byte);
        for _ in 0..8 {
            reference = if reference & 1 != 0 {
                (reference >> 1) ^ 0xEDB8_8320
            } else {
                reference >> 1
            };
        }
    }
    assert_eq!(crc, reference ^ 0xFFFF_FFFF);
}

#[test]
fn brightness_knob_maps_to_firmware_steps() {
    for (knob, step) in [(255u8, 0u8), (170, 0), (169, 1), (85, 1), (84, 2), (0, 2)] {
        let output = ControllerOutput {
            player_brightness: knob,
            ..Default::default()
        };
        let buf = encode_output_usb(&output).unwrap();
        assert_eq!(buf[43], step, "brightness {knob}");
    }
}
