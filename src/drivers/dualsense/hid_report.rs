//! DualSense report layouts for both transports, derived from the great
//! work of the Game Controller Collective Wiki community.
//! Source: https://controllers.fandom.com/wiki/Sony_DualSense
use packed_struct::prelude::*;

use super::driver::*;
use crate::state::{Buttons, ControllerState, TouchPoint};

/// Battery power-state nibble value while the pack is charging.
pub const POWER_STATE_CHARGING: u8 = 0x01;

#[derive(PrimitiveEnum_u8, Clone, Copy, PartialEq, Debug)]
pub enum Direction {
    North = 0,
    NorthEast = 1,
    East = 2,
    SouthEast = 3,
    South = 4,
    SouthWest = 5,
    West = 6,
    NorthWest = 7,
    None = 8,
}

impl Direction {
    /// Expand the 4-bit hat encoding into the four directional bits.
    pub fn to_mask(self) -> u32 {
        match self {
            Direction::North => Buttons::DPAD_UP,
            Direction::NorthEast => Buttons::DPAD_UP | Buttons::DPAD_RIGHT,
            Direction::East => Buttons::DPAD_RIGHT,
            Direction::SouthEast => Buttons::DPAD_DOWN | Buttons::DPAD_RIGHT,
            Direction::South => Buttons::DPAD_DOWN,
            Direction::SouthWest => Buttons::DPAD_DOWN | Buttons::DPAD_LEFT,
            Direction::West => Buttons::DPAD_LEFT,
            Direction::NorthWest => Buttons::DPAD_UP | Buttons::DPAD_LEFT,
            Direction::None => 0,
        }
    }

    /// Collapse directional bits back into the hat encoding.
    pub fn from_buttons(buttons: Buttons) -> Self {
        let up = buttons.contains(Buttons::DPAD_UP);
        let down = buttons.contains(Buttons::DPAD_DOWN);
        let left = buttons.contains(Buttons::DPAD_LEFT);
        let right = buttons.contains(Buttons::DPAD_RIGHT);
        match (up, down, left, right) {
            (true, false, false, false) => Direction::North,
            (true, false, false, true) => Direction::NorthEast,
            (false, false, false, true) => Direction::East,
            (false, true, false, true) => Direction::SouthEast,
            (false, true, false, false) => Direction::South,
            (false, true, true, false) => Direction::SouthWest,
            (false, false, true, false) => Direction::West,
            (true, false, true, false) => Direction::NorthWest,
            _ => Direction::None,
        }
    }
}

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "4")]
pub struct TouchFingerData {
    /// Contact counter; bit 7 set while the slot is not touched.
    #[packed_field(bytes = "0")]
    pub context: u8,
    #[packed_field(bytes = "1")]
    pub x_lo: u8,
    #[packed_field(bits = "16..=19")]
    pub y_lo: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "20..=23")]
    pub x_hi: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bytes = "3")]
    pub y_hi: u8,
}

impl TouchFingerData {
    pub fn x(&self) -> u16 {
        u16::from(self.x_lo) | (u16::from(self.x_hi.to_primitive()) << 8)
    }

    pub fn y(&self) -> u16 {
        u16::from(self.y_lo.to_primitive()) | (u16::from(self.y_hi) << 4)
    }

    pub fn set_x(&mut self, x_raw: u16) {
        self.x_lo = (x_raw & 0x00FF) as u8;
        self.x_hi = Integer::from_primitive(((x_raw & 0x0F00) >> 8) as u8);
    }

    pub fn set_y(&mut self, y_raw: u16) {
        self.y_lo = Integer::from_primitive((y_raw & 0x000F) as u8);
        self.y_hi = ((y_raw & 0x0FF0) >> 4) as u8;
    }
}

impl Default for TouchFingerData {
    fn default() -> Self {
        Self {
            context: TouchPoint::INACTIVE,
            x_lo: 0,
            y_lo: Integer::from_primitive(0),
            x_hi: Integer::from_primitive(0),
            y_hi: 0,
        }
    }
}

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Default)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "9")]
pub struct TouchData {
    #[packed_field(element_size_bytes = "4")]
    pub touch_finger_data: [TouchFingerData; 2],
    pub timestamp: u8,
}

/// The 64-byte full input report used on USB. The Bluetooth full report
/// (id 0x31) carries this exact payload shifted one byte right.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "64")]
pub struct UsbInputReport {
    // byte 0
    #[packed_field(bytes = "0")]
    pub report_id: u8,

    // bytes 1-7
    #[packed_field(bytes = "1")]
    pub joystick_l_x: u8,
    #[packed_field(bytes = "2")]
    pub joystick_l_y: u8,
    #[packed_field(bytes = "3")]
    pub joystick_r_x: u8,
    #[packed_field(bytes = "4")]
    pub joystick_r_y: u8,
    #[packed_field(bytes = "5")]
    pub l2_trigger: u8,
    #[packed_field(bytes = "6")]
    pub r2_trigger: u8,
    #[packed_field(bytes = "7")]
    pub seq_number: u8,

    // byte 8
    #[packed_field(bits = "64")]
    pub triangle: bool,
    #[packed_field(bits = "65")]
    pub circle: bool,
    #[packed_field(bits = "66")]
    pub cross: bool,
    #[packed_field(bits = "67")]
    pub square: bool,
    #[packed_field(bits = "68..=71", ty = "enum")]
    pub dpad: Direction,

    // byte 9
    #[packed_field(bits = "72")]
    pub r3: bool,
    #[packed_field(bits = "73")]
    pub l3: bool,
    #[packed_field(bits = "74")]
    pub options: bool,
    #[packed_field(bits = "75")]
    pub create: bool,
    #[packed_field(bits = "76")]
    pub r2: bool,
    #[packed_field(bits = "77")]
    pub l2: bool,
    #[packed_field(bits = "78")]
    pub r1: bool,
    #[packed_field(bits = "79")]
    pub l1: bool,

    // byte 10; bits 0-3 are the Edge paddle/fn cluster, not surfaced
    #[packed_field(bits = "80..=83")]
    pub _edge_buttons: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "84")]
    pub _unkn_0: bool,
    #[packed_field(bits = "85")]
    pub mute: bool,
    #[packed_field(bits = "86")]
    pub touchpad: bool,
    #[packed_field(bits = "87")]
    pub ps: bool,

    // bytes 11-15
    #[packed_field(bytes = "11")]
    pub _reserved: u8,
    #[packed_field(bytes = "12..=15", endian = "lsb")]
    pub _counter: Integer<u32, packed_bits::Bits<32>>,

    // bytes 16-27
    #[packed_field(bytes = "16..=17", endian = "lsb")]
    pub gyro_x: Integer<i16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "18..=19", endian = "lsb")]
    pub gyro_y: Integer<i16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "20..=21", endian = "lsb")]
    pub gyro_z: Integer<i16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "22..=23", endian = "lsb")]
    pub accel_x: Integer<i16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "24..=25", endian = "lsb")]
    pub accel_y: Integer<i16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "26..=27", endian = "lsb")]
    pub accel_z: Integer<i16, packed_bits::Bits<16>>,

    // bytes 28-32
    #[packed_field(bytes = "28..=31", endian = "lsb")]
    pub sensor_timestamp: Integer<u32, packed_bits::Bits<32>>,
    #[packed_field(bytes = "32")]
    pub temperature: u8,

    // bytes 33-41
    #[packed_field(bytes = "33..=41")]
    pub touch_data: TouchData,

    // bytes 42-52: adaptive trigger status and mirrored host timestamp
    #[packed_field(bytes = "42..=52")]
    pub _trigger_feedback: [u8; 11],

    // byte 53
    #[packed_field(bits = "424..=427")]
    pub power_state: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "428..=431")]
    pub power_percent: Integer<u8, packed_bits::Bits<4>>,

    // bytes 54-55: plug/peripheral status bits, not surfaced
    #[packed_field(bytes = "54..=55")]
    pub _plugged: [u8; 2],

    // bytes 56-63
    #[packed_field(bytes = "56..=63")]
    pub _aes_cmac: [u8; 8],
}

impl UsbInputReport {
    /// Neutral report: centered sticks, no contacts, full battery.
    pub fn new() -> Self {
        Self {
            report_id: INPUT_REPORT_USB,
            joystick_l_x: 128,
            joystick_l_y: 128,
            joystick_r_x: 128,
            joystick_r_y: 128,
            l2_trigger: 0,
            r2_trigger: 0,
            seq_number: 0,
            triangle: false,
            circle: false,
            cross: false,
            square: false,
            dpad: Direction::None,
            r3: false,
            l3: false,
            options: false,
            create: false,
            r2: false,
            l2: false,
            r1: false,
            l1: false,
            _edge_buttons: Integer::from_primitive(0),
            _unkn_0: false,
            mute: false,
            touchpad: false,
            ps: false,
            _reserved: 0,
            _counter: Integer::from_primitive(0),
            gyro_x: Integer::from_primitive(0),
            gyro_y: Integer::from_primitive(0),
            gyro_z: Integer::from_primitive(0),
            accel_x: Integer::from_primitive(0),
            accel_y: Integer::from_primitive(0),
            accel_z: Integer::from_primitive(0),
            sensor_timestamp: Integer::from_primitive(0),
            temperature: 0,
            touch_data: TouchData::default(),
            _trigger_feedback: [0; 11],
            power_state: Integer::from_primitive(0),
            power_percent: Integer::from_primitive(10),
            _plugged: [0; 2],
            _aes_cmac: [0; 8],
        }
    }

    /// Project the report onto the normalized model.
    pub fn to_state(&self, timestamp_ms: u64) -> ControllerState {
        let mut buttons = Buttons::default();
        buttons.set(Buttons::CROSS, self.cross);
        buttons.set(Buttons::CIRCLE, self.circle);
        buttons.set(Buttons::SQUARE, self.square);
        buttons.set(Buttons::TRIANGLE, self.triangle);
        buttons.set(Buttons::L1, self.l1);
        buttons.set(Buttons::R1, self.r1);
        buttons.set(Buttons::L2, self.l2);
        buttons.set(Buttons::R2, self.r2);
        buttons.set(Buttons::L3, self.l3);
        buttons.set(Buttons::R3, self.r3);
        buttons.set(Buttons::OPTIONS, self.options);
        buttons.set(Buttons::CREATE, self.create);
        buttons.set(Buttons::PS, self.ps);
        buttons.set(Buttons::TOUCHPAD, self.touchpad);
        buttons.set(Buttons::MUTE, self.mute);
        buttons.0 |= self.dpad.to_mask();

        let touch = self.touch_data.touch_finger_data.map(|finger| TouchPoint {
            id: finger.context,
            x: finger.x(),
            y: finger.y(),
        });

        ControllerState {
            buttons,
            left_stick_x: self.joystick_l_x,
            left_stick_y: self.joystick_l_y,
            right_stick_x: self.joystick_r_x,
            right_stick_y: self.joystick_r_y,
            l2_trigger: self.l2_trigger,
            r2_trigger: self.r2_trigger,
            accel: [
                self.accel_x.to_primitive(),
                self.accel_y.to_primitive(),
                self.accel_z.to_primitive(),
            ],
            gyro: [
                self.gyro_x.to_primitive(),
                self.gyro_y.to_primitive(),
                self.gyro_z.to_primitive(),
            ],
            touch,
            battery_level: (self.power_percent.to_primitive() * 10).min(100),
            battery_charging: self.power_state.to_primitive() == POWER_STATE_CHARGING,
            timestamp_ms,
        }
    }

    /// Build a report whose modeled fields mirror the given state.
    pub fn from_state(state: &ControllerState) -> Self {
        let mut report = Self::new();
        report.cross = state.buttons.contains(Buttons::CROSS);
        report.circle = state.buttons.contains(Buttons::CIRCLE);
        report.square = state.buttons.contains(Buttons::SQUARE);
        report.triangle = state.buttons.contains(Buttons::TRIANGLE);
        report.l1 = state.buttons.contains(Buttons::L1);
        report.r1 = state.buttons.contains(Buttons::R1);
        report.l2 = state.buttons.contains(Buttons::L2);
        report.r2 = state.buttons.contains(Buttons::R2);
        report.l3 = state.buttons.contains(Buttons::L3);
        report.r3 = state.buttons.contains(Buttons::R3);
        report.options = state.buttons.contains(Buttons::OPTIONS);
        report.create = state.buttons.contains(Buttons::CREATE);
        report.ps = state.buttons.contains(Buttons::PS);
        report.touchpad = state.buttons.contains(Buttons::TOUCHPAD);
        report.mute = state.buttons.contains(Buttons::MUTE);
        report.dpad = Direction::from_buttons(state.buttons);
        report.joystick_l_x = state.left_stick_x;
        report.joystick_l_y = state.left_stick_y;
        report.joystick_r_x = state.right_stick_x;
        report.joystick_r_y = state.right_stick_y;
        report.l2_trigger = state.l2_trigger;
        report.r2_trigger = state.r2_trigger;
        report.gyro_x = Integer::from_primitive(state.gyro[0]);
        report.gyro_y = Integer::from_primitive(state.gyro[1]);
        report.gyro_z = Integer::from_primitive(state.gyro[2]);
        report.accel_x = Integer::from_primitive(state.accel[0]);
        report.accel_y = Integer::from_primitive(state.accel[1]);
        report.accel_z = Integer::from_primitive(state.accel[2]);
        for (finger, point) in report
            .touch_data
            .touch_finger_data
            .iter_mut()
            .zip(state.touch.iter())
        {
            finger.context = point.id;
            finger.set_x(point.x);
            finger.set_y(point.y);
        }
        report.power_percent = Integer::from_primitive((state.battery_level / 10).min(10));
        report.power_state = Integer::from_primitive(if state.battery_charging {
            POWER_STATE_CHARGING
        } else {
            0
        });
        report
    }
}

impl Default for UsbInputReport {
    fn default() -> Self {
        Self::new()
    }
}

/// The 10-byte simplified report a DualSense sends over Bluetooth before
/// full report mode has been enabled.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "10")]
pub struct BtCompatInputReport {
    // byte 0
    #[packed_field(bytes = "0")]
    pub report_id: u8,

    // bytes 1-4
    #[packed_field(bytes = "1")]
    pub joystick_l_x: u8,
    #[packed_field(bytes = "2")]
    pub joystick_l_y: u8,
    #[packed_field(bytes = "3")]
    pub joystick_r_x: u8,
    #[packed_field(bytes = "4")]
    pub joystick_r_y: u8,

    // byte 5
    #[packed_field(bits = "40")]
    pub triangle: bool,
    #[packed_field(bits = "41")]
    pub circle: bool,
    #[packed_field(bits = "42")]
    pub cross: bool,
    #[packed_field(bits = "43")]
    pub square: bool,
    #[packed_field(bits = "44..=47", ty = "enum")]
    pub dpad: Direction,

    // byte 6
    #[packed_field(bits = "48")]
    pub l1: bool,
    #[packed_field(bits = "49")]
    pub r1: bool,
    #[packed_field(bits = "50")]
    pub l2: bool,
    #[packed_field(bits = "51")]
    pub r2: bool,
    #[packed_field(bits = "52")]
    pub create: bool,
    #[packed_field(bits = "53")]
    pub options: bool,
    #[packed_field(bits = "54")]
    pub l3: bool,
    #[packed_field(bits = "55")]
    pub r3: bool,

    // byte 7
    #[packed_field(bits = "56")]
    pub ps: bool,
    #[packed_field(bits = "57")]
    pub touchpad: bool,
    #[packed_field(bits = "58..=63")]
    pub counter: Integer<u8, packed_bits::Bits<6>>,

    // bytes 8-9
    #[packed_field(bytes = "8")]
    pub l2_trigger: u8,
    #[packed_field(bytes = "9")]
    pub r2_trigger: u8,
}

impl BtCompatInputReport {
    /// Project onto the normalized model. Motion, touch coordinates and
    /// battery are absent from this variant and stay at their defaults.
    pub fn to_state(&self, timestamp_ms: u64) -> ControllerState {
        let mut buttons = Buttons::default();
        buttons.set(Buttons::CROSS, self.cross);
        buttons.set(Buttons::CIRCLE, self.circle);
        buttons.set(Buttons::SQUARE, self.square);
        buttons.set(Buttons::TRIANGLE, self.triangle);
        buttons.set(Buttons::L1, self.l1);
        buttons.set(Buttons::R1, self.r1);
        buttons.set(Buttons::L2, self.l2);
        buttons.set(Buttons::R2, self.r2);
        buttons.set(Buttons::L3, self.l3);
        buttons.set(Buttons::R3, self.r3);
        buttons.set(Buttons::OPTIONS, self.options);
        buttons.set(Buttons::CREATE, self.create);
        buttons.set(Buttons::PS, self.ps);
        buttons.set(Buttons::TOUCHPAD, self.touchpad);
        buttons.0 |= self.dpad.to_mask();

        ControllerState {
            buttons,
            left_stick_x: self.joystick_l_x,
            left_stick_y: self.joystick_l_y,
            right_stick_x: self.joystick_r_x,
            right_stick_y: self.joystick_r_y,
            l2_trigger: self.l2_trigger,
            r2_trigger: self.r2_trigger,
            timestamp_ms,
            ..Default::default()
        }
    }
}

/// Lightbar PWM steps the firmware understands, brightest first.
pub const LIGHT_BRIGHTNESS_BRIGHT: u8 = 0;
pub const LIGHT_BRIGHTNESS_MID: u8 = 1;
pub const LIGHT_BRIGHTNESS_DIM: u8 = 2;

/// The 47-byte output state block shared by both transports. Only the
/// regions the bridge drives are named; everything else packs to zero.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Default)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "47")]
pub struct SetStateOutput {
    // byte 0
    #[packed_field(bits = "6")]
    pub use_rumble_not_haptics: bool,
    #[packed_field(bits = "7")]
    pub enable_rumble_emulation: bool,

    // byte 1
    #[packed_field(bits = "11")]
    pub allow_player_indicators: bool,
    #[packed_field(bits = "13")]
    pub allow_led_color: bool,
    #[packed_field(bits = "15")]
    pub allow_mute_light: bool,

    // bytes 2-3
    #[packed_field(bytes = "2")]
    pub rumble_right: u8,
    #[packed_field(bytes = "3")]
    pub rumble_left: u8,

    // byte 8
    #[packed_field(bytes = "8")]
    pub mute_light_mode: u8,

    // byte 38
    #[packed_field(bits = "311")]
    pub allow_light_brightness_change: bool,

    // byte 42
    #[packed_field(bytes = "42")]
    pub light_brightness: u8,

    // byte 43
    #[packed_field(bits = "347")]
    pub player_light_1: bool,
    #[packed_field(bits = "348")]
    pub player_light_2: bool,
    #[packed_field(bits = "349")]
    pub player_light_3: bool,
    #[packed_field(bits = "350")]
    pub player_light_4: bool,
    #[packed_field(bits = "351")]
    pub player_light_5: bool,

    // bytes 44-46
    #[packed_field(bytes = "44")]
    pub led_red: u8,
    #[packed_field(bytes = "45")]
    pub led_green: u8,
    #[packed_field(bytes = "46")]
    pub led_blue: u8,
}

impl SetStateOutput {
    pub fn from_output(output: &crate::state::ControllerOutput) -> Self {
        // Brightness only has three firmware steps; the 0..255 knob maps
        // onto the nearest one.
        let brightness = if output.player_brightness >= 170 {
            LIGHT_BRIGHTNESS_BRIGHT
        } else if output.player_brightness >= 85 {
            LIGHT_BRIGHTNESS_MID
        } else {
            LIGHT_BRIGHTNESS_DIM
        };

        Self {
            enable_rumble_emulation: true,
            use_rumble_not_haptics: true,
            allow_led_color: true,
            allow_player_indicators: true,
            allow_mute_light: true,
            allow_light_brightness_change: true,
            rumble_left: output.rumble_left,
            rumble_right: output.rumble_right,
            mute_light_mode: 0,
            light_brightness: brightness,
            player_light_1: output.player_leds & 0x01 != 0,
            player_light_2: output.player_leds & 0x02 != 0,
            player_light_3: output.player_leds & 0x04 != 0,
            player_light_4: output.player_leds & 0x08 != 0,
            player_light_5: output.player_leds & 0x10 != 0,
            led_red: output.led_r,
            led_green: output.led_g,
            led_blue: output.led_b,
        }
    }
}

/// Assemble the USB output report (id 0x02).
pub fn encode_output_usb(
    output: &crate::state::ControllerOutput,
) -> Result<Vec<u8>, PackingError> {
    let state = SetStateOutput::from_output(output);
    let mut buf = vec![0u8; OUTPUT_REPORT_USB_SIZE];
    buf[0] = OUTPUT_REPORT_USB;
    buf[1..48].copy_from_slice(&state.pack()?);
    Ok(buf)
}

/// Assemble the Bluetooth output report (id 0x31) with its trailing CRC.
pub fn encode_output_bt(
    output: &crate::state::ControllerOutput,
    seq: u8,
) -> Result<Vec<u8>, PackingError> {
    let state = SetStateOutput::from_output(output);
    let mut buf = vec![0u8; OUTPUT_REPORT_BT_SIZE];
    buf[0] = OUTPUT_REPORT_BT;
    buf[1] = (seq & 0x0F) << 4;
    buf[2] = BT_OUTPUT_TAG;
    buf[3..50].copy_from_slice(&state.pack()?);
    let crc = bt_output_crc(&buf[..OUTPUT_REPORT_BT_SIZE - 4]);
    buf[OUTPUT_REPORT_BT_SIZE - 4..].copy_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// CRC-32 over an outbound Bluetooth report, seeded with the HID
/// DATA|OUTPUT transaction header byte the radio frame carries.
pub fn bt_output_crc(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[0xA2]);
    hasher.update(data);
    hasher.finalize()
}
