//! Picks up externally-set lightbar state from the panel's IPC record.
use std::path::PathBuf;

use serde::Deserialize;

use crate::constants::LIGHTBAR_IPC_PATH;
use crate::state::bus::StateBus;
use crate::state::system::SystemStateMachine;

/// The record the panel writes. Every field is optional; absent fields
/// leave the corresponding output fields untouched. Unknown keys are
/// ignored.
#[derive(Debug, Default, Deserialize)]
struct LightbarRecord {
    r: Option<u8>,
    g: Option<u8>,
    b: Option<u8>,
    player_leds: Option<u8>,
    /// 0..1, scaled onto the 0..255 brightness knob.
    player_led_brightness: Option<f32>,
}

/// Reader over the fixed-path IPC file. Parse errors are silent; the
/// record is the panel's responsibility.
#[derive(Debug)]
pub struct LightbarReader {
    path: PathBuf,
}

impl Default for LightbarReader {
    fn default() -> Self {
        Self {
            path: PathBuf::from(LIGHTBAR_IPC_PATH),
        }
    }
}

impl LightbarReader {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Apply the current record, if any, to the output bus. Suppressed
    /// entirely while the bridge is in standby: the lightbar is local
    /// then.
    pub fn refresh(&mut self, bus: &StateBus, system: &SystemStateMachine) {
        if system.is_standby() {
            return;
        }
        let Ok(text) = std::fs::read_to_string(&self.path) else {
            return;
        };
        let Some(record) = parse_record(&text) else {
            return;
        };

        bus.modify_output(|out| {
            if let Some(r) = record.r {
                out.led_r = r;
            }
            if let Some(g) = record.g {
                out.led_g = g;
            }
            if let Some(b) = record.b {
                out.led_b = b;
            }
            if let Some(leds) = record.player_leds {
                out.player_leds = leds & 0x1F;
            }
            if let Some(brightness) = record.player_led_brightness {
                out.player_brightness = (brightness.clamp(0.0, 1.0) * 255.0).round() as u8;
            }
        });
    }
}

fn parse_record(text: &str) -> Option<LightbarRecord> {
    serde_json::from_str(text.trim()).ok()
}
