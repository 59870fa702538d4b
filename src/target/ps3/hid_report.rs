//! DualShock 3 report layouts synthesized toward the console.
use packed_struct::prelude::*;

use crate::state::{Buttons, ControllerState};

pub const DS3_INPUT_REPORT_ID: u8 = 0x01;
pub const DS3_INPUT_REPORT_SIZE: usize = 48;
/// Report id of the rumble/LED output report.
pub const DS3_OUTPUT_REPORT_ID: u8 = 0x01;

/// Battery byte value while charging.
const BATTERY_CHARGING: u8 = 0xEE;
/// Connection-type byte for a wired controller.
const CONNECTION_USB: u8 = 0x03;
/// Neutral value of the 10-bit motion words.
const MOTION_CENTER: i32 = 512;

/// The 48-byte input report: buttons in DualShock 3 order, per-button
/// pressure bytes, battery/connection status, and the sixaxis words.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "48")]
pub struct Ds3InputReport {
    // byte 0-1
    #[packed_field(bytes = "0")]
    pub report_id: u8,
    #[packed_field(bytes = "1")]
    pub _reserved0: u8,

    // byte 2
    #[packed_field(bits = "16")]
    pub dpad_left: bool,
    #[packed_field(bits = "17")]
    pub dpad_down: bool,
    #[packed_field(bits = "18")]
    pub dpad_right: bool,
    #[packed_field(bits = "19")]
    pub dpad_up: bool,
    #[packed_field(bits = "20")]
    pub start: bool,
    #[packed_field(bits = "21")]
    pub r3: bool,
    #[packed_field(bits = "22")]
    pub l3: bool,
    #[packed_field(bits = "23")]
    pub select: bool,

    // byte 3
    #[packed_field(bits = "24")]
    pub square: bool,
    #[packed_field(bits = "25")]
    pub cross: bool,
    #[packed_field(bits = "26")]
    pub circle: bool,
    #[packed_field(bits = "27")]
    pub triangle: bool,
    #[packed_field(bits = "28")]
    pub r1: bool,
    #[packed_field(bits = "29")]
    pub l1: bool,
    #[packed_field(bits = "30")]
    pub r2: bool,
    #[packed_field(bits = "31")]
    pub l2: bool,

    // byte 4
    #[packed_field(bits = "39")]
    pub ps: bool,
    #[packed_field(bytes = "5")]
    pub _reserved1: u8,

    // bytes 6-9
    #[packed_field(bytes = "6")]
    pub left_stick_x: u8,
    #[packed_field(bytes = "7")]
    pub left_stick_y: u8,
    #[packed_field(bytes = "8")]
    pub right_stick_x: u8,
    #[packed_field(bytes = "9")]
    pub right_stick_y: u8,

    // bytes 10-13
    #[packed_field(bytes = "10..=13")]
    pub _reserved2: [u8; 4],

    // bytes 14-25: pressure-sensitive values in the fixed DS3 order
    #[packed_field(bytes = "14")]
    pub pressure_up: u8,
    #[packed_field(bytes = "15")]
    pub pressure_right: u8,
    #[packed_field(bytes = "16")]
    pub pressure_down: u8,
    #[packed_field(bytes = "17")]
    pub pressure_left: u8,
    #[packed_field(bytes = "18")]
    pub pressure_l2: u8,
    #[packed_field(bytes = "19")]
    pub pressure_r2: u8,
    #[packed_field(bytes = "20")]
    pub pressure_l1: u8,
    #[packed_field(bytes = "21")]
    pub pressure_r1: u8,
    #[packed_field(bytes = "22")]
    pub pressure_triangle: u8,
    #[packed_field(bytes = "23")]
    pub pressure_circle: u8,
    #[packed_field(bytes = "24")]
    pub pressure_cross: u8,
    #[packed_field(bytes = "25")]
    pub pressure_square: u8,

    // bytes 26-29
    #[packed_field(bytes = "26..=29")]
    pub _reserved3: [u8; 4],

    // bytes 30-31
    #[packed_field(bytes = "30")]
    pub battery: u8,
    #[packed_field(bytes = "31")]
    pub connection: u8,

    // bytes 32-39
    #[packed_field(bytes = "32..=39")]
    pub _reserved4: [u8; 8],

    // bytes 40-47: big-endian sixaxis words centered at 512
    #[packed_field(bytes = "40..=41", endian = "msb")]
    pub accel_x: Integer<u16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "42..=43", endian = "msb")]
    pub accel_y: Integer<u16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "44..=45", endian = "msb")]
    pub accel_z: Integer<u16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "46..=47", endian = "msb")]
    pub gyro_z: Integer<u16, packed_bits::Bits<16>>,
}

impl Ds3InputReport {
    /// Neutral report: centered sticks and motion, full battery.
    pub fn neutral() -> Self {
        Self {
            report_id: DS3_INPUT_REPORT_ID,
            _reserved0: 0,
            dpad_left: false,
            dpad_down: false,
            dpad_right: false,
            dpad_up: false,
            start: false,
            r3: false,
            l3: false,
            select: false,
            square: false,
            cross: false,
            circle: false,
            triangle: false,
            r1: false,
            l1: false,
            r2: false,
            l2: false,
            ps: false,
            _reserved1: 0,
            left_stick_x: 128,
            left_stick_y: 128,
            right_stick_x: 128,
            right_stick_y: 128,
            _reserved2: [0; 4],
            pressure_up: 0,
            pressure_right: 0,
            pressure_down: 0,
            pressure_left: 0,
            pressure_l2: 0,
            pressure_r2: 0,
            pressure_l1: 0,
            pressure_r1: 0,
            pressure_triangle: 0,
            pressure_circle: 0,
            pressure_cross: 0,
            pressure_square: 0,
            _reserved3: [0; 4],
            battery: 0x05,
            connection: CONNECTION_USB,
            _reserved4: [0; 8],
            accel_x: Integer::from_primitive(MOTION_CENTER as u16),
            accel_y: Integer::from_primitive(MOTION_CENTER as u16),
            accel_z: Integer::from_primitive(MOTION_CENTER as u16),
            gyro_z: Integer::from_primitive(MOTION_CENTER as u16),
        }
    }

    /// Re-map a normalized snapshot into DualShock 3 order. Pressure bytes
    /// are derived from the digital state; the analog triggers pass
    /// through on L2/R2.
    pub fn from_state(state: &ControllerState) -> Self {
        let buttons = state.buttons;
        let pressed = |mask: u32| -> u8 {
            if buttons.contains(mask) {
                0xFF
            } else {
                0x00
            }
        };

        let mut report = Self::neutral();
        report.select = buttons.contains(Buttons::SELECT);
        report.l3 = buttons.contains(Buttons::L3);
        report.r3 = buttons.contains(Buttons::R3);
        report.start = buttons.contains(Buttons::START);
        report.dpad_up = buttons.contains(Buttons::DPAD_UP);
        report.dpad_right = buttons.contains(Buttons::DPAD_RIGHT);
        report.dpad_down = buttons.contains(Buttons::DPAD_DOWN);
        report.dpad_left = buttons.contains(Buttons::DPAD_LEFT);
        report.l2 = buttons.contains(Buttons::L2);
        report.r2 = buttons.contains(Buttons::R2);
        report.l1 = buttons.contains(Buttons::L1);
        report.r1 = buttons.contains(Buttons::R1);
        report.triangle = buttons.contains(Buttons::TRIANGLE);
        report.circle = buttons.contains(Buttons::CIRCLE);
        report.cross = buttons.contains(Buttons::CROSS);
        report.square = buttons.contains(Buttons::SQUARE);
        report.ps = buttons.contains(Buttons::PS);

        report.left_stick_x = state.left_stick_x;
        report.left_stick_y = state.left_stick_y;
        report.right_stick_x = state.right_stick_x;
        report.right_stick_y = state.right_stick_y;

        report.pressure_up = pressed(Buttons::DPAD_UP);
        report.pressure_right = pressed(Buttons::DPAD_RIGHT);
        report.pressure_down = pressed(Buttons::DPAD_DOWN);
        report.pressure_left = pressed(Buttons::DPAD_LEFT);
        report.pressure_l2 = state.l2_trigger;
        report.pressure_r2 = state.r2_trigger;
        report.pressure_l1 = pressed(Buttons::L1);
        report.pressure_r1 = pressed(Buttons::R1);
        report.pressure_triangle = pressed(Buttons::TRIANGLE);
        report.pressure_circle = pressed(Buttons::CIRCLE);
        report.pressure_cross = pressed(Buttons::CROSS);
        report.pressure_square = pressed(Buttons::SQUARE);

        report.battery = if state.battery_charging {
            BATTERY_CHARGING
        } else {
            (state.battery_level / 20).min(5)
        };
        report.connection = CONNECTION_USB;

        report.accel_x = Integer::from_primitive(motion_word(state.accel[0], 64));
        report.accel_y = Integer::from_primitive(motion_word(state.accel[1], 64));
        report.accel_z = Integer::from_primitive(motion_word(state.accel[2], 64));
        report.gyro_z = Integer::from_primitive(motion_word(state.gyro[2], 32));

        report
    }
}

impl Default for Ds3InputReport {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Scale a device-native motion value onto the 10-bit DualShock 3 word.
fn motion_word(value: i16, divisor: i32) -> u16 {
    (MOTION_CENTER + i32::from(value) / divisor).clamp(0, 1023) as u16
}

/// Rumble and player-LED payload decoded from a host output report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ds3OutputState {
    /// Small motor intensity.
    pub rumble_left: u8,
    /// Large motor intensity.
    pub rumble_right: u8,
    pub player_leds: u8,
}

/// Parse the console's rumble/LED output report. The payload may arrive
/// with or without its leading report id, depending on the channel.
pub fn parse_output_report(data: &[u8]) -> Option<Ds3OutputState> {
    let payload = match data.first() {
        Some(&DS3_OUTPUT_REPORT_ID) => &data[1..],
        Some(_) => data,
        None => return None,
    };
    if payload.len() < 9 {
        return None;
    }

    Some(Ds3OutputState {
        // [0]/[2] are the motor durations, which the bridge ignores: the
        // host refreshes the report faster than they expire.
        rumble_left: payload[1],
        rumble_right: payload[3],
        player_leds: (payload[8] >> 1) & 0x0F,
    })
}
