//! DualSense source driver: device discovery over hidapi, raw report
//! decode into the normalized model, and output report encode.
// Report constants from the Linux kernel driver:
// https://github.com/torvalds/linux/blob/master/drivers/hid/hid-playstation.c
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use hidapi::{HidApi, HidDevice};

use super::hid_report::{BtCompatInputReport, UsbInputReport};
use crate::input::registry::{Capability, DriverDescriptor, DriverError, SourceDriver};
use crate::state::{now_ms, ControllerOutput, ControllerState};
use packed_struct::PackedStruct;

pub const DS5_NAME: &str = "Sony Interactive Entertainment DualSense Wireless Controller";
pub const DS5_VID: u16 = 0x054C;
pub const DS5_PID: u16 = 0x0CE6;
pub const DS5_EDGE_PID: u16 = 0x0DF2;

pub const INPUT_REPORT_USB: u8 = 0x01;
pub const INPUT_REPORT_USB_SIZE: usize = 64;
pub const INPUT_REPORT_BT: u8 = 0x31;
pub const INPUT_REPORT_BT_SIZE: usize = 78;
pub const INPUT_REPORT_BT_COMPAT: u8 = 0x01;
pub const INPUT_REPORT_BT_COMPAT_SIZE: usize = 10;
pub const OUTPUT_REPORT_USB: u8 = 0x02;
pub const OUTPUT_REPORT_USB_SIZE: usize = 63;
pub const OUTPUT_REPORT_BT: u8 = 0x31;
pub const OUTPUT_REPORT_BT_SIZE: usize = 78;
/// Tag byte following the sequence counter in Bluetooth output reports.
pub const BT_OUTPUT_TAG: u8 = 0x10;

/// Read timeout. A connected DualSense streams reports continuously; the
/// timeout only fires once the link has gone quiet.
const HID_TIMEOUT_MS: i32 = 250;

/// Transport the bound device is currently speaking, decided per received
/// report by its id and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Usb,
    Bluetooth,
}

static DESCRIPTOR: DriverDescriptor = DriverDescriptor {
    name: "DualSense",
    manufacturer: "Sony Interactive Entertainment",
    vendor_id: DS5_VID,
    product_id: DS5_PID,
    capabilities: &[
        Capability::Motion,
        Capability::Touchpad,
        Capability::Rumble,
        Capability::Lightbar,
    ],
};

pub struct DualSenseDriver {
    device: Mutex<Option<HidDevice>>,
    transport: Mutex<Transport>,
    bt_seq: AtomicU8,
}

impl DualSenseDriver {
    pub fn new() -> Self {
        Self {
            device: Mutex::new(None),
            transport: Mutex::new(Transport::Usb),
            bt_seq: AtomicU8::new(0),
        }
    }

    fn set_transport(&self, transport: Transport) {
        let mut current = self.transport.lock().unwrap_or_else(|e| e.into_inner());
        if *current != transport {
            log::debug!("DualSense transport is now {transport:?}");
            *current = transport;
        }
    }

    fn transport(&self) -> Transport {
        *self.transport.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for DualSenseDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceDriver for DualSenseDriver {
    fn descriptor(&self) -> &DriverDescriptor {
        &DESCRIPTOR
    }

    fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        vendor_id == DS5_VID && (product_id == DS5_PID || product_id == DS5_EDGE_PID)
    }

    fn find_device(&self) -> Result<(), DriverError> {
        let api = HidApi::new().map_err(|e| DriverError::Transient(e.to_string()))?;
        for info in api.device_list() {
            if !self.matches(info.vendor_id(), info.product_id()) {
                continue;
            }
            match info.open_device(&api) {
                Ok(device) => {
                    log::info!(
                        "Opened DualSense {:04x}:{:04x} at {:?}",
                        info.vendor_id(),
                        info.product_id(),
                        info.path()
                    );
                    *self.device.lock().unwrap_or_else(|e| e.into_inner()) = Some(device);
                    return Ok(());
                }
                Err(e) => {
                    log::debug!("Unable to open {:?}: {e}", info.path());
                }
            }
        }
        Err(DriverError::NoDevice)
    }

    fn read_input(&self) -> Result<ControllerState, DriverError> {
        let mut buf = [0u8; INPUT_REPORT_BT_SIZE];
        let n = {
            let guard = self.device.lock().unwrap_or_else(|e| e.into_inner());
            let Some(device) = guard.as_ref() else {
                return Err(DriverError::NoDevice);
            };
            device
                .read_timeout(&mut buf, HID_TIMEOUT_MS)
                .map_err(|e| DriverError::Disconnected(e.to_string()))?
        };
        if n == 0 {
            return Err(DriverError::Transient("read timed out".to_string()));
        }

        let (state, transport) = decode_input(&buf[..n], now_ms())?;
        self.set_transport(transport);
        Ok(state)
    }

    fn send_output(&self, output: &ControllerOutput) -> Result<(), DriverError> {
        let report = match self.transport() {
            Transport::Usb => super::hid_report::encode_output_usb(output),
            Transport::Bluetooth => {
                let seq = self.bt_seq.fetch_add(1, Ordering::Relaxed);
                super::hid_report::encode_output_bt(output, seq)
            }
        }
        .map_err(|e| DriverError::Transient(e.to_string()))?;

        let guard = self.device.lock().unwrap_or_else(|e| e.into_inner());
        let Some(device) = guard.as_ref() else {
            return Err(DriverError::NoDevice);
        };
        device
            .write(&report)
            .map_err(|e| DriverError::Disconnected(e.to_string()))?;
        Ok(())
    }

    fn shutdown(&self) {
        if self
            .device
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
        {
            log::debug!("Released DualSense device");
        }
    }
}

/// Decode a raw input report of either transport into the normalized
/// model, identifying the variant by report id and buffer length.
pub fn decode_input(
    buf: &[u8],
    timestamp_ms: u64,
) -> Result<(ControllerState, Transport), DriverError> {
    match (buf.first().copied(), buf.len()) {
        (Some(INPUT_REPORT_USB), INPUT_REPORT_USB_SIZE) => {
            let mut raw = [0u8; INPUT_REPORT_USB_SIZE];
            raw.copy_from_slice(buf);
            let report = UsbInputReport::unpack(&raw)
                .map_err(|e| DriverError::Transient(e.to_string()))?;
            Ok((report.to_state(timestamp_ms), Transport::Usb))
        }
        (Some(INPUT_REPORT_BT), INPUT_REPORT_BT_SIZE) => {
            // The Bluetooth full report carries the USB payload shifted one
            // byte right, with a trailing CRC the kernel already framed.
            let mut raw = [0u8; INPUT_REPORT_USB_SIZE];
            raw[0] = INPUT_REPORT_USB;
            raw[1..].copy_from_slice(&buf[2..INPUT_REPORT_USB_SIZE + 1]);
            let report = UsbInputReport::unpack(&raw)
                .map_err(|e| DriverError::Transient(e.to_string()))?;
            Ok((report.to_state(timestamp_ms), Transport::Bluetooth))
        }
        (Some(INPUT_REPORT_BT_COMPAT), INPUT_REPORT_BT_COMPAT_SIZE) => {
            let mut raw = [0u8; INPUT_REPORT_BT_COMPAT_SIZE];
            raw.copy_from_slice(buf);
            let report = BtCompatInputReport::unpack(&raw)
                .map_err(|e| DriverError::Transient(e.to_string()))?;
            Ok((report.to_state(timestamp_ms), Transport::Bluetooth))
        }
        (id, len) => Err(DriverError::Transient(format!(
            "unexpected input report: id {id:02x?} len {len}"
        ))),
    }
}
