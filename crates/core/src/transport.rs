//! HID class-request transport over USB control transfers.
//!
//! Provides a trait-based seam so that the libusb-backed device handle and
//! the simulated beacon used in tests share the same interface. On top of
//! it, [`get_report`] and [`set_report`] frame one 8-byte feature report as
//! a HID `Get_Report` / `Set_Report` class request.
//!
//! Reference: USB Device Class Definition for HID 1.11, section 7.2.

use crate::error::{Result, TransportError};
use crate::report::{Report, REPORT_LEN};
use std::time::Duration;
use tracing::trace;

/// HID class request codes (section 7.2).
pub mod class_request {
    pub const GET_REPORT: u8 = 0x01;
    pub const SET_REPORT: u8 = 0x09;
}

/// HID report types, carried in the high byte of `wValue` (section 7.2.1).
pub mod report_type {
    pub const FEATURE: u8 = 3;
}

/// `bmRequestType` bits.
pub mod request_type {
    /// Bit 7: device-to-host.
    pub const DIR_IN: u8 = 0x80;
    /// Bit 7 clear: host-to-device.
    pub const DIR_OUT: u8 = 0x00;
    /// Bits 5..6: class request.
    pub const TYPE_CLASS: u8 = 0x20;
    /// Bits 0..4: interface recipient.
    pub const RECIPIENT_INTERFACE: u8 = 0x01;

    /// Class request to an interface, device-to-host (0xA1).
    pub const CLASS_INTERFACE_IN: u8 = DIR_IN | TYPE_CLASS | RECIPIENT_INTERFACE;
    /// Class request to an interface, host-to-device (0x21).
    pub const CLASS_INTERFACE_OUT: u8 = DIR_OUT | TYPE_CLASS | RECIPIENT_INTERFACE;
}

/// Abstraction over an open USB device handle.
///
/// Interface management takes `&mut self` and happens before the handle is
/// shared; control transfers take `&self` so timer tasks can issue writes
/// concurrently with the session.
pub trait ControlTransport: Send + Sync {
    /// Arrange for the kernel HID driver to be detached from `interface`
    /// when it is claimed.
    fn detach_kernel_driver(&mut self, interface: u8) -> std::result::Result<(), TransportError>;

    fn claim_interface(&mut self, interface: u8) -> std::result::Result<(), TransportError>;

    fn release_interface(&mut self, interface: u8) -> std::result::Result<(), TransportError>;

    /// Device-to-host control transfer. Returns the number of bytes read.
    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> std::result::Result<usize, TransportError>;

    /// Host-to-device control transfer. Returns the number of bytes written.
    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> std::result::Result<usize, TransportError>;
}

/// `wValue` for a feature report: report type high, report id low.
pub fn feature_value(report_id: u8) -> u16 {
    ((report_type::FEATURE as u16) << 8) | report_id as u16
}

/// Fetch one feature report. `report_id` is the major command whose
/// result is requested.
pub fn get_report<T: ControlTransport + ?Sized>(
    transport: &T,
    interface: u8,
    report_id: u8,
    timeout: Duration,
) -> Result<Report> {
    let mut report = Report::default();
    report.as_mut_bytes()[0] = report_id;

    let n = transport.read_control(
        request_type::CLASS_INTERFACE_IN,
        class_request::GET_REPORT,
        feature_value(report_id),
        interface as u16,
        report.as_mut_bytes(),
        timeout,
    )?;
    if n < REPORT_LEN {
        return Err(TransportError::ShortTransfer {
            expected: REPORT_LEN,
            actual: n,
        }
        .into());
    }

    trace!(
        report_id = report_id,
        report_hex = format_args!("{:02X?}", report.as_bytes()),
        "HID RX"
    );
    Ok(report)
}

/// Send one feature report. The report id in `wValue` is 0 for sets.
pub fn set_report<T: ControlTransport + ?Sized>(
    transport: &T,
    interface: u8,
    report: &Report,
    timeout: Duration,
) -> Result<()> {
    trace!(
        report_hex = format_args!("{:02X?}", report.as_bytes()),
        "HID TX"
    );

    let n = transport.write_control(
        request_type::CLASS_INTERFACE_OUT,
        class_request::SET_REPORT,
        feature_value(0),
        interface as u16,
        report.as_bytes(),
        timeout,
    )?;
    if n < REPORT_LEN {
        return Err(TransportError::ShortTransfer {
            expected: REPORT_LEN,
            actual: n,
        }
        .into());
    }
    Ok(())
}

/// A simulated beacon for testing.
///
/// Models the registers the session touches and counts every call so tests
/// can assert on transfer, claim and release behaviour.
#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::catalog::{MajorCommand, WriteCommand};
    use crate::report::WriteRequest;
    use std::sync::{Arc, Mutex, MutexGuard};

    /// Register and bookkeeping state behind the mock.
    #[derive(Debug)]
    pub struct MockState {
        pub port0: u8,
        pub port1: u8,
        pub port2: u8,
        /// Low nibble: per-pin clock generator enable on port 1.
        pub clock_mask: u8,
        pub prescaler: u8,
        pub pwm: [u8; 4],
        pub duty: [(u8, u8); 3],
        pub phase_delay: [u8; 4],
        pub event_counter: u32,
        pub counter_overflow: bool,
        pub counter_enabled: bool,
        pub buzzer: Option<WriteRequest>,
        pub auto_flags: u8,
        pub firmware: [u8; REPORT_LEN],

        pub reads: usize,
        pub writes: Vec<WriteRequest>,
        pub claims: usize,
        pub releases: usize,
        pub detaches: usize,

        pub fail_claim: Option<TransportError>,
        pub fail_release: Option<TransportError>,
        /// Fail this many upcoming transfers (reads or writes).
        pub fail_transfers: usize,
        pub fail_error: TransportError,
        /// Reply to reads with this many bytes.
        pub short_reply: Option<usize>,
        /// Reject PWM writes addressed to this pin.
        pub fail_pwm_pin: Option<u8>,
    }

    impl Default for MockState {
        fn default() -> Self {
            Self {
                port0: 0xFF,
                port1: 0xFF,
                port2: 0xFF,
                clock_mask: 0,
                prescaler: crate::catalog::PRESCALER_DEFAULT,
                pwm: [80; 4],
                duty: [(0, 0); 3],
                phase_delay: [0; 4],
                event_counter: 0,
                counter_overflow: false,
                counter_enabled: false,
                buzzer: None,
                auto_flags: 0,
                firmware: [0x01, 0x02, 0x03, 0x04, 0x3A, 0x0F, 0x06, 0x17],
                reads: 0,
                writes: Vec::new(),
                claims: 0,
                releases: 0,
                detaches: 0,
                fail_claim: None,
                fail_release: None,
                fail_transfers: 0,
                fail_error: TransportError::Timeout,
                short_reply: None,
                fail_pwm_pin: None,
            }
        }
    }

    impl MockState {
        pub fn transfers(&self) -> usize {
            self.reads + self.writes.len()
        }

        fn apply(&mut self, req: WriteRequest) -> std::result::Result<(), TransportError> {
            match req.command {
                WriteCommand::Port0 => self.port0 = req.lsb,
                WriteCommand::Port1 => self.port1 = req.lsb,
                WriteCommand::Port0and1 => {
                    self.port0 = req.lsb;
                    self.port1 = req.msb;
                }
                // Reset wins over set.
                WriteCommand::SetOrResetPort0 => self.port0 = (self.port0 | req.msb) & !req.lsb,
                WriteCommand::SetOrResetPort1 => self.port1 = (self.port1 | req.msb) & !req.lsb,
                WriteCommand::SetClockGen => self.prescaler = req.lsb,
                WriteCommand::ToggleClockGenPort1 => {
                    self.clock_mask = (self.clock_mask | (req.msb & 0x0F)) & !(req.lsb & 0x0F)
                }
                WriteCommand::SetDutyCyclePort1Pin0 => self.duty[0] = (req.lsb, req.msb),
                WriteCommand::SetDutyCyclePort1Pin1 => self.duty[1] = (req.lsb, req.msb),
                WriteCommand::SetDutyCyclePort1Pin2 => self.duty[2] = (req.lsb, req.msb),
                WriteCommand::SyncClockGen => {}
                WriteCommand::SetInitialPhaseDelayPort1Pin0 => self.phase_delay[0] = req.lsb,
                WriteCommand::SetInitialPhaseDelayPort1Pin1 => self.phase_delay[1] = req.lsb,
                WriteCommand::SetInitialPhaseDelayPort1Pin2 => self.phase_delay[2] = req.lsb,
                WriteCommand::SetInitialPhaseDelayPort1Pin3 => self.phase_delay[3] = req.lsb,
                WriteCommand::SetPwm => {
                    if self.fail_pwm_pin == Some(req.lsb) {
                        return Err(TransportError::Usb("pipe error".into()));
                    }
                    self.pwm[req.lsb as usize & 0x03] = req.msb;
                }
                WriteCommand::ToggleEventCounter => self.counter_enabled = req.lsb != 0,
                WriteCommand::BuzzerCtrl => self.buzzer = Some(req),
                WriteCommand::AutoClearAutoConfirmCtrl => self.auto_flags = req.lsb,
            }
            Ok(())
        }

        fn answer(&mut self, report_id: u8) -> [u8; REPORT_LEN] {
            match MajorCommand::from_u8(report_id) {
                Some(MajorCommand::ReadFirmware) => self.firmware,
                Some(MajorCommand::ReadPorts) => [
                    self.port0,
                    self.port1,
                    (self.clock_mask != 0) as u8,
                    self.port2,
                    0,
                    0,
                    0,
                    0,
                ],
                Some(MajorCommand::ReadEventCounter) => {
                    let mut out = [0u8; REPORT_LEN];
                    out[..4].copy_from_slice(&self.event_counter.to_le_bytes());
                    out[4] = if self.counter_overflow { 0xFF } else { 0x00 };
                    self.event_counter = 0;
                    self.counter_overflow = false;
                    out
                }
                _ => [0; REPORT_LEN],
            }
        }

        fn take_failure(&mut self) -> Option<TransportError> {
            if self.fail_transfers > 0 {
                self.fail_transfers -= 1;
                return Some(self.fail_error.clone());
            }
            None
        }
    }

    /// Cloneable handle to a simulated device; clones share state.
    #[derive(Debug, Clone, Default)]
    pub struct MockBeacon {
        state: Arc<Mutex<MockState>>,
    }

    impl MockBeacon {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn state(&self) -> MutexGuard<'_, MockState> {
            self.state.lock().unwrap()
        }
    }

    impl ControlTransport for MockBeacon {
        fn detach_kernel_driver(
            &mut self,
            _interface: u8,
        ) -> std::result::Result<(), TransportError> {
            self.state().detaches += 1;
            Ok(())
        }

        fn claim_interface(&mut self, _interface: u8) -> std::result::Result<(), TransportError> {
            let mut state = self.state();
            if let Some(err) = state.fail_claim.clone() {
                return Err(err);
            }
            state.claims += 1;
            Ok(())
        }

        fn release_interface(&mut self, _interface: u8) -> std::result::Result<(), TransportError> {
            let mut state = self.state();
            state.releases += 1;
            match state.fail_release.clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        fn read_control(
            &self,
            request_type: u8,
            request: u8,
            value: u16,
            _index: u16,
            buf: &mut [u8],
            _timeout: Duration,
        ) -> std::result::Result<usize, TransportError> {
            assert_eq!(request_type, request_type::CLASS_INTERFACE_IN);
            assert_eq!(request, class_request::GET_REPORT);
            assert_eq!(value >> 8, report_type::FEATURE as u16);

            let mut state = self.state();
            state.reads += 1;
            if let Some(err) = state.take_failure() {
                return Err(err);
            }
            let answer = state.answer(value as u8);
            let n = state.short_reply.unwrap_or(REPORT_LEN).min(buf.len());
            buf[..n].copy_from_slice(&answer[..n]);
            Ok(n)
        }

        fn write_control(
            &self,
            request_type: u8,
            request: u8,
            value: u16,
            _index: u16,
            buf: &[u8],
            _timeout: Duration,
        ) -> std::result::Result<usize, TransportError> {
            assert_eq!(request_type, request_type::CLASS_INTERFACE_OUT);
            assert_eq!(request, class_request::SET_REPORT);
            assert_eq!(value, feature_value(0));

            let report = Report::from_slice(buf)
                .map_err(|e| TransportError::Usb(format!("mock: {e}")))?;
            let req = WriteRequest::decode(&report)
                .map_err(|e| TransportError::Usb(format!("mock: {e}")))?;

            let mut state = self.state();
            state.writes.push(req);
            if let Some(err) = state.take_failure() {
                return Err(err);
            }
            state.apply(req)?;
            Ok(buf.len())
        }
    }
}
