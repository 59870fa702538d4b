//! The feature-report exchange by which a PS3 authenticates a controller.
use super::hid_report::{parse_output_report, Ds3OutputState};
use super::report_descriptor::{feature_f2, feature_f5, FEATURE_F4_ENABLE};

/// HID report type carried in the high byte of a GET/SET_REPORT wValue.
const REPORT_TYPE_OUTPUT: u8 = 0x02;
const REPORT_TYPE_FEATURE: u8 = 0x03;

pub const FEATURE_PAIRING_INFO: u8 = 0xF2;
pub const FEATURE_PAIRED_HOST: u8 = 0xF5;
pub const FEATURE_ENABLE_REPORTING: u8 = 0xF4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    WaitEnum,
    WaitGetReportF2,
    WaitGetReportF5,
    WaitSetReportF4,
    Operational,
}

/// Side effect of a SET_REPORT the caller must carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetReportAction {
    /// Host pushed a rumble/LED state.
    Output(Ds3OutputState),
    /// Host stored a new pairing address.
    Paired([u8; 6]),
    None,
}

/// Control-channel state machine. Every request gets its canned response;
/// only the expected request for the current state advances it, so
/// out-of-order traffic is harmless.
pub struct Handshake {
    state: HandshakeState,
    device_mac: [u8; 6],
    host_mac: [u8; 6],
}

impl Handshake {
    pub fn new(device_mac: [u8; 6], host_mac: [u8; 6]) -> Self {
        Self {
            state: HandshakeState::WaitEnum,
            device_mac,
            host_mac,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_operational(&self) -> bool {
        self.state == HandshakeState::Operational
    }

    pub fn paired_host(&self) -> [u8; 6] {
        self.host_mac
    }

    /// Enumeration finished; the console may start the exchanges.
    pub fn on_enumerated(&mut self) {
        if self.state == HandshakeState::WaitEnum {
            log::debug!("USB link enumerated, expecting feature exchanges");
            self.state = HandshakeState::WaitGetReportF2;
        }
    }

    /// Bus reset or disable; the exchange starts over.
    pub fn on_reset(&mut self) {
        if self.state != HandshakeState::WaitEnum {
            log::info!("PS3 link reset");
            self.state = HandshakeState::WaitEnum;
        }
    }

    /// Answer a GET_REPORT. Returns the bytes to place on the control
    /// endpoint.
    pub fn handle_get_report(&mut self, wvalue: u16) -> Vec<u8> {
        let report_type = (wvalue >> 8) as u8;
        let report_id = (wvalue & 0xFF) as u8;

        match (report_type, report_id) {
            (REPORT_TYPE_FEATURE, FEATURE_PAIRING_INFO) => {
                if self.state == HandshakeState::WaitGetReportF2 {
                    self.state = HandshakeState::WaitGetReportF5;
                    log::debug!("Pairing info read, expecting paired-host read");
                } else {
                    log::warn!("GET_REPORT 0xF2 out of order in {:?}", self.state);
                }
                feature_f2(&self.device_mac).to_vec()
            }
            (REPORT_TYPE_FEATURE, FEATURE_PAIRED_HOST) => {
                if self.state == HandshakeState::WaitGetReportF5 {
                    self.state = HandshakeState::WaitSetReportF4;
                    log::debug!("Paired host read, expecting enable-reporting write");
                } else {
                    log::warn!("GET_REPORT 0xF5 out of order in {:?}", self.state);
                }
                feature_f5(&self.host_mac).to_vec()
            }
            _ => {
                log::warn!("Unexpected GET_REPORT for {wvalue:#06x}");
                // Unknown reports are acknowledged with an empty feature
                // body rather than a stall; a real controller never stalls
                // the console.
                vec![0u8; 8]
            }
        }
    }

    /// Process a SET_REPORT payload.
    pub fn handle_set_report(&mut self, wvalue: u16, data: &[u8]) -> SetReportAction {
        let report_type = (wvalue >> 8) as u8;
        let report_id = (wvalue & 0xFF) as u8;

        match (report_type, report_id) {
            (REPORT_TYPE_FEATURE, FEATURE_ENABLE_REPORTING) => {
                if data.len() >= 2 && data[..2] != FEATURE_F4_ENABLE[..2] {
                    log::debug!("Unrecognized enable payload: {data:02x?}");
                }
                if self.state == HandshakeState::WaitSetReportF4 {
                    self.state = HandshakeState::Operational;
                    log::info!("PS3 handshake complete, reporting enabled");
                } else {
                    log::warn!("SET_REPORT 0xF4 out of order in {:?}", self.state);
                }
                SetReportAction::None
            }
            (REPORT_TYPE_FEATURE, FEATURE_PAIRED_HOST) => {
                // sixpair-style pairing write: remember the new host.
                if data.len() >= 8 {
                    let mut mac = [0u8; 6];
                    mac.copy_from_slice(&data[2..8]);
                    self.host_mac = mac;
                    return SetReportAction::Paired(mac);
                }
                log::warn!("Short pairing payload: {} bytes", data.len());
                SetReportAction::None
            }
            (REPORT_TYPE_OUTPUT | 0x01, 0x01) => match parse_output_report(data) {
                Some(output) => SetReportAction::Output(output),
                None => {
                    log::warn!("Short output report: {} bytes", data.len());
                    SetReportAction::None
                }
            },
            _ => {
                log::warn!("Unexpected SET_REPORT for {wvalue:#06x}");
                SetReportAction::None
            }
        }
    }
}
