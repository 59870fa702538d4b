//! PS3-facing protocol emulator: handshake servicing on the control
//! endpoint and DualShock 3 report synthesis on the data endpoints.
pub mod gadget;
pub mod handshake;
pub mod hid_report;
pub mod report_descriptor;

#[cfg(test)]
mod gadget_test;
#[cfg(test)]
mod hid_report_test;

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use packed_struct::PackedStruct;

use self::gadget::{ControlEndpoint, GadgetEvent, SetupRequest};
use self::handshake::{Handshake, SetReportAction};
use self::hid_report::{parse_output_report, Ds3InputReport, Ds3OutputState};
use self::report_descriptor::DS3_REPORT_DESCRIPTOR;
use crate::config;
use crate::input::registry::Registry;
use crate::profile::applier::Applier;
use crate::state::bus::StateBus;
use crate::state::system::SystemStateMachine;
use crate::state::{now_ms, ControllerState};

/// How long the control loop waits for ep0 traffic before re-checking
/// the running flag.
const CONTROL_POLL_MS: u16 = 250;
/// Report cadence on the interrupt IN endpoint.
const DATA_TICK: Duration = Duration::from_millis(4);

// HID class requests on endpoint 0.
const HID_REQUEST_GET_REPORT: u8 = 0x01;
const HID_REQUEST_SET_REPORT: u8 = 0x09;
const HID_REQUEST_SET_IDLE: u8 = 0x0A;
const USB_REQUEST_GET_DESCRIPTOR: u8 = 0x06;
const DESCRIPTOR_TYPE_HID_REPORT: u8 = 0x22;

/// Bluetooth address reported as the controller's own in feature 0xF2.
const DEVICE_MAC: [u8; 6] = [0x00, 0x1B, 0xDC, 0x0F, 0x60, 0x4F];

/// Push a decoded host output report onto the bus. While in standby the
/// lightbar/player LEDs stay under local control and the host's LED
/// fields are discarded.
pub fn push_host_output(bus: &StateBus, system: &SystemStateMachine, output: Ds3OutputState) {
    let standby = system.is_standby();
    bus.modify_output(|out| {
        out.rumble_left = output.rumble_left;
        out.rumble_right = output.rumble_right;
        if !standby {
            out.player_leds = output.player_leds;
        }
    });
}

/// Endpoint-0 servicing loop driving the handshake state machine.
pub struct ControlChannel {
    endpoint: ControlEndpoint,
    handshake: Handshake,
    operational: Arc<AtomicBool>,
    bus: Arc<StateBus>,
    system: Arc<SystemStateMachine>,
}

impl ControlChannel {
    pub fn new(
        endpoint: ControlEndpoint,
        operational: Arc<AtomicBool>,
        bus: Arc<StateBus>,
        system: Arc<SystemStateMachine>,
    ) -> Self {
        let host_mac = config::paired_host().unwrap_or([0u8; 6]);
        Self {
            endpoint,
            handshake: Handshake::new(DEVICE_MAC, host_mac),
            operational,
            bus,
            system,
        }
    }

    pub fn run(mut self, running: Arc<AtomicBool>) {
        while running.load(Ordering::SeqCst) {
            let events = match self.endpoint.wait_events(CONTROL_POLL_MS) {
                Ok(events) => events,
                Err(e) => {
                    log::error!("Control endpoint failed: {e}");
                    break;
                }
            };
            for event in events {
                self.handle_event(event);
            }
            self.operational
                .store(self.handshake.is_operational(), Ordering::SeqCst);
        }
        log::debug!("Control channel stopped");
    }

    fn handle_event(&mut self, event: GadgetEvent) {
        match event {
            GadgetEvent::Bind => log::debug!("Gadget function bound"),
            GadgetEvent::Enable => self.handshake.on_enumerated(),
            GadgetEvent::Disable | GadgetEvent::Unbind => self.handshake.on_reset(),
            GadgetEvent::Suspend => log::debug!("Host suspended the bus"),
            GadgetEvent::Resume => log::debug!("Host resumed the bus"),
            GadgetEvent::Setup(setup) => {
                if let Err(e) = self.handle_setup(setup) {
                    log::warn!("Control transfer failed: {e}");
                }
            }
            GadgetEvent::Unknown(kind) => log::debug!("Unknown gadget event {kind}"),
        }
    }

    fn handle_setup(&mut self, setup: SetupRequest) -> std::io::Result<()> {
        if setup.is_in() {
            let reply = match (setup.request_type, setup.request) {
                (0x81, USB_REQUEST_GET_DESCRIPTOR)
                    if (setup.value >> 8) as u8 == DESCRIPTOR_TYPE_HID_REPORT =>
                {
                    DS3_REPORT_DESCRIPTOR.to_vec()
                }
                (0xA1, HID_REQUEST_GET_REPORT) => self.handshake.handle_get_report(setup.value),
                _ => {
                    log::warn!(
                        "Unhandled IN control request {:#04x}/{:#04x}",
                        setup.request_type,
                        setup.request
                    );
                    Vec::new()
                }
            };
            return self.endpoint.reply(&setup, &reply);
        }

        let data = self.endpoint.read_data(&setup)?;
        match (setup.request_type, setup.request) {
            (0x21, HID_REQUEST_SET_REPORT) => {
                let action = self.handshake.handle_set_report(setup.value, &data);
                self.apply_action(action);
            }
            (0x21, HID_REQUEST_SET_IDLE) => {}
            _ => {
                log::warn!(
                    "Unhandled OUT control request {:#04x}/{:#04x}",
                    setup.request_type,
                    setup.request
                );
            }
        }
        Ok(())
    }

    fn apply_action(&mut self, action: SetReportAction) {
        match action {
            SetReportAction::Output(output) => {
                push_host_output(&self.bus, &self.system, output);
            }
            SetReportAction::Paired(mac) => {
                if let Err(e) = config::store_paired_host(&mac) {
                    log::warn!("Unable to persist paired host: {e}");
                }
            }
            SetReportAction::None => {}
        }
    }
}

/// Interrupt endpoint loop: synthesizes DualShock 3 input reports at a
/// fixed cadence and drains host output reports from the OUT endpoint.
pub struct DataChannel {
    interrupt_in: File,
    interrupt_out: File,
    operational: Arc<AtomicBool>,
    bus: Arc<StateBus>,
    registry: Arc<Registry>,
    system: Arc<SystemStateMachine>,
    applier: Applier,
    write_stalled: bool,
}

impl DataChannel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        interrupt_in: File,
        interrupt_out: File,
        operational: Arc<AtomicBool>,
        bus: Arc<StateBus>,
        registry: Arc<Registry>,
        system: Arc<SystemStateMachine>,
        applier: Applier,
    ) -> Self {
        Self {
            interrupt_in,
            interrupt_out,
            operational,
            bus,
            registry,
            system,
            applier,
            write_stalled: false,
        }
    }

    pub fn run(mut self, running: Arc<AtomicBool>) {
        while running.load(Ordering::SeqCst) {
            thread::sleep(DATA_TICK);
            self.drain_host_output();

            // Before the handshake completes the data channel is silent.
            if !self.operational.load(Ordering::SeqCst) {
                continue;
            }

            let report = self.synthesize();
            let raw = match report.pack() {
                Ok(raw) => raw,
                Err(e) => {
                    log::error!("Unable to pack input report: {e}");
                    continue;
                }
            };
            match self.interrupt_in.write(&raw) {
                Ok(_) => {
                    if self.write_stalled {
                        log::debug!("Interrupt IN endpoint draining again");
                        self.write_stalled = false;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    // Host is not polling right now; keep the cadence.
                }
                Err(e) => {
                    if !self.write_stalled {
                        log::debug!("Interrupt IN write failed: {e}");
                        self.write_stalled = true;
                    }
                }
            }
        }
        log::debug!("Data channel stopped");
    }

    /// Build the next report from the latest bus snapshot, shaped by the
    /// active profile. With no source device bound, neutral reports keep
    /// the console fed.
    fn synthesize(&mut self) -> Ds3InputReport {
        let state = if self.registry.active().is_some() {
            self.bus.snapshot_input()
        } else {
            ControllerState::default()
        };
        let shaped = self.applier.apply(&state, now_ms());
        Ds3InputReport::from_state(&shaped)
    }

    /// Non-blocking read of the interrupt OUT endpoint carrying rumble
    /// and LED updates.
    fn drain_host_output(&mut self) {
        let mut buf = [0u8; 64];
        match self.interrupt_out.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => match parse_output_report(&buf[..n]) {
                Some(output) => push_host_output(&self.bus, &self.system, output),
                None => log::debug!("Undecodable interrupt OUT payload ({n} bytes)"),
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => log::debug!("Interrupt OUT read failed: {e}"),
        }
    }
}
