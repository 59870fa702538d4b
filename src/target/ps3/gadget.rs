//! FunctionFS plumbing for the USB gadget side. The ConfigFS composition
//! (VID/PID 054C:0268, Sony strings) is assembled outside the daemon;
//! this module writes the function descriptors and services the three
//! endpoint files.
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use super::report_descriptor::DS3_REPORT_DESCRIPTOR;

const FUNCTIONFS_STRINGS_MAGIC: u32 = 2;
const FUNCTIONFS_DESCRIPTORS_MAGIC_V2: u32 = 3;
const FUNCTIONFS_HAS_FS_DESC: u32 = 1;
const FUNCTIONFS_HAS_HS_DESC: u32 = 2;

// usb_functionfs_event type codes
const EVENT_BIND: u8 = 0;
const EVENT_UNBIND: u8 = 1;
const EVENT_ENABLE: u8 = 2;
const EVENT_DISABLE: u8 = 3;
const EVENT_SETUP: u8 = 4;
const EVENT_SUSPEND: u8 = 5;
const EVENT_RESUME: u8 = 6;

/// Size of a usb_functionfs_event: an 8-byte setup packet plus type and
/// padding.
const EVENT_SIZE: usize = 12;

const LANG_ENGLISH_US: u16 = 0x0409;

/// An endpoint-0 setup packet.
#[derive(Debug, Clone, Copy)]
pub struct SetupRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupRequest {
    pub fn is_in(&self) -> bool {
        self.request_type & 0x80 != 0
    }

    pub(crate) fn from_bytes(raw: &[u8]) -> Self {
        Self {
            request_type: raw[0],
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            index: u16::from_le_bytes([raw[4], raw[5]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }
}

#[derive(Debug)]
pub enum GadgetEvent {
    Bind,
    Unbind,
    Enable,
    Disable,
    Suspend,
    Resume,
    Setup(SetupRequest),
    Unknown(u8),
}

/// The control endpoint plus the two interrupt endpoints of the gadget
/// function, ready for servicing once `open` returns.
#[derive(Debug)]
pub struct GadgetEndpoints {
    pub control: ControlEndpoint,
    pub interrupt_in: File,
    pub interrupt_out: File,
}

#[derive(Debug)]
pub struct ControlEndpoint {
    ep0: File,
}

impl GadgetEndpoints {
    /// Open the endpoint files under the FunctionFS mount and push the
    /// descriptor and string blobs, which makes ep1/ep2 appear.
    pub fn open(dir: &str) -> io::Result<Self> {
        let dir = Path::new(dir);
        let mut ep0 = OpenOptions::new()
            .read(true)
            .write(true)
            .open(dir.join("ep0"))?;
        ep0.write_all(&descriptors_blob())?;
        ep0.write_all(&strings_blob())?;
        log::debug!("Wrote gadget function descriptors");

        // Both interrupt endpoints are non-blocking: the data loop keeps
        // its own cadence and must not park on a host that stopped
        // polling.
        let interrupt_in = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(dir.join("ep1"))?;
        let interrupt_out = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(dir.join("ep2"))?;

        Ok(Self {
            control: ControlEndpoint { ep0 },
            interrupt_in,
            interrupt_out,
        })
    }
}

impl ControlEndpoint {
    /// Wait for the next batch of ep0 events. Returns an empty list on
    /// timeout so the caller can check its running flag.
    pub fn wait_events(&mut self, timeout_ms: u16) -> io::Result<Vec<GadgetEvent>> {
        {
            let mut fds = [PollFd::new(self.ep0.as_fd(), PollFlags::POLLIN)];
            let ready = poll(&mut fds, PollTimeout::from(timeout_ms))
                .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
            if ready == 0 {
                return Ok(Vec::new());
            }
        }

        let mut buf = [0u8; EVENT_SIZE * 4];
        let n = self.ep0.read(&mut buf)?;
        let mut events = Vec::new();
        for chunk in buf[..n].chunks_exact(EVENT_SIZE) {
            let event_type = chunk[8];
            events.push(match event_type {
                EVENT_BIND => GadgetEvent::Bind,
                EVENT_UNBIND => GadgetEvent::Unbind,
                EVENT_ENABLE => GadgetEvent::Enable,
                EVENT_DISABLE => GadgetEvent::Disable,
                EVENT_SUSPEND => GadgetEvent::Suspend,
                EVENT_RESUME => GadgetEvent::Resume,
                EVENT_SETUP => GadgetEvent::Setup(SetupRequest::from_bytes(&chunk[..8])),
                other => GadgetEvent::Unknown(other),
            });
        }
        Ok(events)
    }

    /// Send the data stage of an IN control transfer, truncated to what
    /// the host asked for.
    pub fn reply(&mut self, setup: &SetupRequest, data: &[u8]) -> io::Result<()> {
        let len = data.len().min(setup.length as usize);
        self.ep0.write_all(&data[..len])
    }

    /// Read the data stage of an OUT control transfer. Zero-length reads
    /// double as the status-stage acknowledgement.
    pub fn read_data(&mut self, setup: &SetupRequest) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; setup.length as usize];
        if buf.is_empty() {
            let _ = self.ep0.read(&mut [])?;
            return Ok(buf);
        }
        let n = self.ep0.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }
}

/// FunctionFS v2 descriptor blob: one HID interface with an interrupt IN
/// and an interrupt OUT endpoint, for full and high speed.
pub(crate) fn descriptors_blob() -> Vec<u8> {
    // Full speed uses a 1 ms polling interval directly; high speed
    // expresses the same cadence in 125 us microframe exponents.
    let fs = function_descriptors(10);
    let hs = function_descriptors(7);

    let length = 12 + 4 + 4 + fs.len() + hs.len();
    let mut blob = Vec::with_capacity(length);
    blob.extend_from_slice(&FUNCTIONFS_DESCRIPTORS_MAGIC_V2.to_le_bytes());
    blob.extend_from_slice(&(length as u32).to_le_bytes());
    blob.extend_from_slice(&(FUNCTIONFS_HAS_FS_DESC | FUNCTIONFS_HAS_HS_DESC).to_le_bytes());
    blob.extend_from_slice(&4u32.to_le_bytes()); // fs descriptor count
    blob.extend_from_slice(&4u32.to_le_bytes()); // hs descriptor count
    blob.extend_from_slice(&fs);
    blob.extend_from_slice(&hs);
    blob
}

fn function_descriptors(interval: u8) -> Vec<u8> {
    let report_len = DS3_REPORT_DESCRIPTOR.len() as u16;
    let mut desc = Vec::with_capacity(9 + 9 + 7 + 7);

    // Interface descriptor: HID class, two endpoints.
    desc.extend_from_slice(&[9, 0x04, 0x00, 0x00, 0x02, 0x03, 0x00, 0x00, 0x01]);
    // HID descriptor referencing the report descriptor.
    desc.extend_from_slice(&[
        9,
        0x21,
        0x11,
        0x01,
        0x00,
        0x01,
        0x22,
        (report_len & 0xFF) as u8,
        (report_len >> 8) as u8,
    ]);
    // Endpoint 1 IN, interrupt, 64 bytes.
    desc.extend_from_slice(&[7, 0x05, 0x81, 0x03, 0x40, 0x00, interval]);
    // Endpoint 2 OUT, interrupt, 64 bytes.
    desc.extend_from_slice(&[7, 0x05, 0x02, 0x03, 0x40, 0x00, interval]);
    desc
}

/// FunctionFS strings blob carrying the interface name.
pub(crate) fn strings_blob() -> Vec<u8> {
    let text = super::report_descriptor::DS3_PRODUCT_STRING;
    let length = 16 + 2 + text.len() + 1;
    let mut blob = Vec::with_capacity(length);
    blob.extend_from_slice(&FUNCTIONFS_STRINGS_MAGIC.to_le_bytes());
    blob.extend_from_slice(&(length as u32).to_le_bytes());
    blob.extend_from_slice(&1u32.to_le_bytes()); // string count
    blob.extend_from_slice(&1u32.to_le_bytes()); // language count
    blob.extend_from_slice(&LANG_ENGLISH_US.to_le_bytes());
    blob.extend_from_slice(text.as_bytes());
    blob.push(0);
    blob
}
