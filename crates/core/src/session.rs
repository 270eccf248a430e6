//! Device session: the open, claimed and initialized beacon.
//!
//! A session walks `Closed -> Opening -> Claimed -> Initialized -> Operating`
//! on open and `Operating -> Closing -> Closed` on close. Every write is
//! validated against the command catalog before it is encoded, so an
//! out-of-range argument never costs a transfer.
//!
//! Timed turn-offs run on background threads that share the transport with
//! the session. Their writes are not ordered against calls made on the
//! session while they sleep: whichever write reaches the device last wins.
//! Teardown waits for every pending timer before the interface is released.

use crate::catalog::{
    MajorCommand, PinMask, WriteCommand, AUTO_CLEAR_BIT, AUTO_CONFIRM_BIT, PIN_INDEX_MAX,
};
use crate::comm::{check_device_status, query_with_retry, DeviceStatus};
use crate::config::SessionConfig;
use crate::device::{self, UsbHandle};
use crate::error::{Error, Result};
use crate::report::{
    decode_event_counter, decode_firmware, decode_ports, EventCounter, FirmwareInfo, PortState,
    WriteRequest,
};
use crate::safety;
use crate::timer::TimerSet;
use crate::transport::{get_report, set_report, ControlTransport};
use crate::{pids, DELCOM_VID};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle position of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SessionState {
    Closed,
    Opening,
    Claimed,
    Initialized,
    Operating,
    Closing,
}

/// Buzzer control parameters. The three timing fields are sent in the
/// extension bytes of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuzzerSettings {
    pub enabled: bool,
    /// Frequency divider.
    pub frequency: u8,
    /// Number of repeats, 0 for continuous.
    pub repeat: u8,
    /// On time in 50 ms units.
    pub on_time: u8,
    /// Off time in 50 ms units.
    pub off_time: u8,
}

impl BuzzerSettings {
    fn to_request(self) -> WriteRequest {
        WriteRequest::new(WriteCommand::BuzzerCtrl, self.enabled as u8, self.frequency).with_ext([
            self.repeat,
            self.on_time,
            self.off_time,
            0,
        ])
    }
}

/// An exclusive session with one beacon.
pub struct Session<T: ControlTransport + 'static = UsbHandle> {
    transport: Option<Arc<T>>,
    config: SessionConfig,
    state: SessionState,
    timers: TimerSet,
    vid: u16,
    pid: u16,
}

impl Session<UsbHandle> {
    /// Discover, open, claim and initialize the first device matching
    /// `vid:pid`.
    pub fn open(vid: u16, pid: u16, config: SessionConfig) -> Result<Self> {
        Self::open_in(&device::usb_context(false)?, vid, pid, config)
    }

    /// Like [`Session::open`], using an existing libusb context.
    pub fn open_in(
        context: &rusb::Context,
        vid: u16,
        pid: u16,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        debug!(
            vid = format_args!("0x{:04X}", vid),
            pid = format_args!("0x{:04X}", pid),
            "Session opening"
        );
        let handle = device::find_and_open(context, vid, pid)?;
        Self::establish(handle, vid, pid, config)
    }
}

impl<T: ControlTransport + 'static> Session<T> {
    /// Claim and initialize an already open transport, reported as the
    /// Delcom visual indicator.
    pub fn open_with(transport: T, config: SessionConfig) -> Result<Self> {
        Self::establish(transport, DELCOM_VID, pids::VISUAL_INDICATOR, config)
    }

    fn establish(transport: T, vid: u16, pid: u16, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let mut session = Self {
            timers: TimerSet::new(config.max_pending_timers),
            transport: Some(Arc::new(transport)),
            config,
            state: SessionState::Opening,
            vid,
            pid,
        };

        session.claim()?;
        if let Err(e) = session.initialize() {
            session.teardown(false);
            return Err(e);
        }
        session.set_state(SessionState::Operating);
        info!(
            vid = format_args!("0x{:04X}", vid),
            pid = format_args!("0x{:04X}", pid),
            "Session open"
        );
        Ok(session)
    }

    fn set_state(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }

    /// Detach the kernel driver and claim the interface. On failure the
    /// handle is closed without a release.
    fn claim(&mut self) -> Result<()> {
        let interface = self.config.interface;
        let transport = self
            .transport
            .as_mut()
            .and_then(Arc::get_mut)
            .ok_or(Error::SessionClosed)?;
        let claimed = transport
            .detach_kernel_driver(interface)
            .and_then(|()| transport.claim_interface(interface));
        match claimed {
            Ok(()) => {
                debug!(interface, "Interface claimed");
                self.set_state(SessionState::Claimed);
                Ok(())
            }
            Err(source) => {
                self.transport = None;
                self.set_state(SessionState::Closed);
                Err(Error::Claim { interface, source })
            }
        }
    }

    /// All LEDs off, then the default PWM on every LED pin.
    fn initialize(&mut self) -> Result<()> {
        self.init_write("leds_off", WriteRequest::leds_off(PinMask::ALL))?;
        let pct = safety::validate_intensity(self.config.default_intensity)?;
        for pin in PinMask::ALL.pins() {
            self.init_write("default_pwm", WriteRequest::new(WriteCommand::SetPwm, pin, pct))?;
        }
        self.set_state(SessionState::Initialized);
        debug!(default_intensity = pct, "Device initialized");
        Ok(())
    }

    fn init_write(&self, step: &'static str, req: WriteRequest) -> Result<()> {
        safety::validate_write(&req)?;
        self.send(&req).map_err(|e| match e {
            Error::Transport(source) => Error::Init { step, source },
            other => other,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn vendor_id(&self) -> u16 {
        self.vid
    }

    pub fn product_id(&self) -> u16 {
        self.pid
    }

    fn transport(&self) -> Result<&T> {
        match (&self.transport, self.state) {
            (Some(t), SessionState::Operating) => Ok(&**t),
            _ => Err(Error::SessionClosed),
        }
    }

    fn send(&self, req: &WriteRequest) -> Result<()> {
        let transport = self.transport.as_deref().ok_or(Error::SessionClosed)?;
        debug!(
            command = req.command.name(),
            lsb = req.lsb,
            msb = req.msb,
            "write"
        );
        set_report(
            transport,
            self.config.interface,
            &req.encode(),
            self.config.timeout(),
        )
    }

    fn write(&self, req: WriteRequest) -> Result<()> {
        self.transport()?;
        safety::validate_write(&req)?;
        self.send(&req)
    }

    /// Validate every request, then send each one. A failed write does not
    /// stop the rest; the first error is returned.
    fn write_each(&self, reqs: &[WriteRequest]) -> Result<()> {
        self.transport()?;
        for req in reqs {
            safety::validate_write(req)?;
        }
        let mut first_err = None;
        for req in reqs {
            if let Err(e) = self.send(req) {
                warn!(command = req.command.name(), lsb = req.lsb, "write failed: {}", e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    // --- queries ---

    /// Read serial number, firmware version and date.
    pub fn read_firmware_info(&self) -> Result<FirmwareInfo> {
        let report = query_with_retry(
            self.transport()?,
            self.config.interface,
            MajorCommand::ReadFirmware,
            self.config.timeout(),
            self.config.query_retries,
        )?;
        decode_firmware(report.as_bytes())
    }

    /// Read the raw port registers and the clock enable flag.
    ///
    /// A short reply fails with [`crate::error::TransportError::ShortTransfer`]; no default
    /// state is ever returned.
    pub fn read_port_state(&self) -> Result<PortState> {
        let report = query_with_retry(
            self.transport()?,
            self.config.interface,
            MajorCommand::ReadPorts,
            self.config.timeout(),
            self.config.query_retries,
        )?;
        decode_ports(report.as_bytes())
    }

    /// Read the button event counter. The device clears it on every read,
    /// so this is issued exactly once and never retried.
    pub fn read_and_reset_event_counter(&self) -> Result<EventCounter> {
        let report = get_report(
            self.transport()?,
            self.config.interface,
            MajorCommand::ReadEventCounter.as_u8(),
            self.config.timeout(),
        )?;
        decode_event_counter(report.as_bytes())
    }

    /// Ping the device with a firmware read.
    pub fn status(&self) -> DeviceStatus {
        match self.transport() {
            Ok(t) => check_device_status(t, self.config.interface, self.config.timeout()),
            Err(_) => DeviceStatus::Disconnected,
        }
    }

    // --- LEDs ---

    /// Light (`enable`) or extinguish the LEDs in `mask`.
    pub fn set_pin_state(&self, mask: PinMask, enable: bool) -> Result<()> {
        let req = if enable {
            WriteRequest::leds_on(mask)
        } else {
            WriteRequest::leds_off(mask)
        };
        self.write(req)
    }

    pub fn turn_on(&self, mask: PinMask) -> Result<()> {
        self.set_pin_state(mask, true)
    }

    pub fn turn_off(&self, mask: PinMask) -> Result<()> {
        self.set_pin_state(mask, false)
    }

    /// Write the whole port 1 register. LEDs are lit where bits are 0.
    pub fn write_port1(&self, value: u8) -> Result<()> {
        self.write(WriteRequest::new(WriteCommand::Port1, value, 0))
    }

    /// Turn the LEDs in `mask` on and, for a nonzero `duration`, schedule
    /// them off again. Returns without waiting for the timer.
    pub fn turn_on_timed(&mut self, mask: PinMask, duration: Duration) -> Result<()> {
        self.transport()?;
        let transport = Arc::clone(self.transport.as_ref().ok_or(Error::SessionClosed)?);
        if !duration.is_zero() {
            self.timers.ensure_capacity()?;
        }
        self.turn_on(mask)?;
        if duration.is_zero() {
            return Ok(());
        }

        let interface = self.config.interface;
        let timeout = self.config.timeout();
        let off = WriteRequest::leds_off(mask);
        safety::validate_write(&off)?;
        let scheduled = self.timers.schedule(duration, move || {
            match set_report(&*transport, interface, &off.encode(), timeout) {
                Ok(()) => debug!(mask = %mask, "timed turn-off done"),
                Err(e) => warn!(mask = %mask, "timed turn-off failed: {}", e),
            }
        });
        if let Err(e) = scheduled {
            // No timer will turn these off, so do it now.
            if let Err(off_err) = self.send(&off) {
                warn!(mask = %mask, "turn-off after failed schedule: {}", off_err);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Issue the "on" write `repeat` times back to back. Stops at the
    /// first failure.
    pub fn flash(&self, mask: PinMask, repeat: usize) -> Result<()> {
        self.transport()?;
        let req = WriteRequest::leds_on(mask);
        safety::validate_write(&req)?;
        for i in 0..repeat {
            if let Err(e) = self.send(&req) {
                warn!(attempt = i + 1, repeat, "flash aborted: {}", e);
                return Err(e);
            }
        }
        debug!(mask = %mask, repeat, "flash done");
        Ok(())
    }

    /// [`Session::flash`] with the configured repeat count.
    pub fn flash_default(&self, mask: PinMask) -> Result<()> {
        self.flash(mask, self.config.flash_repeat)
    }

    // --- PWM and clock generator ---

    /// Set the PWM percentage of every pin in `mask`, one write per pin.
    pub fn set_intensity(&self, mask: PinMask, pct: u8) -> Result<()> {
        let pct = safety::validate_intensity(pct)?;
        let reqs = mask
            .pins()
            .map(|pin| {
                let pin = safety::validate_pin_index(pin)?;
                Ok(WriteRequest::new(WriteCommand::SetPwm, pin, pct))
            })
            .collect::<Result<Vec<_>>>()?;
        self.write_each(&reqs)
    }

    /// Set the clock generator duty cycle of every pin in `mask`.
    pub fn set_duty_cycle(&self, mask: PinMask, on_ticks: u8, off_ticks: u8) -> Result<()> {
        let reqs = per_pin(mask, WriteCommand::duty_cycle_for_pin, |cmd| {
            WriteRequest::new(cmd, on_ticks, off_ticks)
        })?;
        self.write_each(&reqs)
    }

    /// Start the clock generator on `mask`.
    pub fn enable_clock(&self, mask: PinMask) -> Result<()> {
        self.write(WriteRequest::new(
            WriteCommand::ToggleClockGenPort1,
            0,
            mask.bits(),
        ))
    }

    /// Stop the clock generator on `mask`.
    pub fn disable_clock(&self, mask: PinMask) -> Result<()> {
        self.write(WriteRequest::new(
            WriteCommand::ToggleClockGenPort1,
            mask.bits(),
            0,
        ))
    }

    /// Set the clock generator prescaler, 1..=255.
    pub fn set_clock_prescaler(&self, value: u8) -> Result<()> {
        let value = safety::validate_prescaler(value)?;
        self.write(WriteRequest::new(WriteCommand::SetClockGen, value, 0))
    }

    /// Restart the clocks in `enable_mask` in phase. Pins in `preset_mask`
    /// start in the on half of their cycle.
    pub fn sync_clocks(&self, enable_mask: PinMask, preset_mask: PinMask) -> Result<()> {
        self.write(WriteRequest::new(
            WriteCommand::SyncClockGen,
            enable_mask.bits(),
            preset_mask.bits(),
        ))
    }

    /// Initial phase delay, in 10 ms units, for every pin in `mask`.
    pub fn set_phase_delay(&self, mask: PinMask, delay_10ms: u8) -> Result<()> {
        let reqs = per_pin(mask, WriteCommand::phase_delay_for_pin, |cmd| {
            WriteRequest::new(cmd, delay_10ms, 0)
        })?;
        self.write_each(&reqs)
    }

    // --- misc ---

    pub fn set_event_counter(&self, enabled: bool) -> Result<()> {
        self.write(WriteRequest::new(
            WriteCommand::ToggleEventCounter,
            enabled as u8,
            0,
        ))
    }

    pub fn set_buzzer(&self, settings: BuzzerSettings) -> Result<()> {
        self.write(settings.to_request())
    }

    /// Auto-clear turns the LEDs off on a button press; auto-confirm beeps.
    pub fn set_auto_clear_confirm(&self, auto_clear: bool, auto_confirm: bool) -> Result<()> {
        let mut bits = 0;
        if auto_clear {
            bits |= AUTO_CLEAR_BIT;
        }
        if auto_confirm {
            bits |= AUTO_CONFIRM_BIT;
        }
        self.write(WriteRequest::new(
            WriteCommand::AutoClearAutoConfirmCtrl,
            bits,
            0,
        ))
    }

    // --- teardown ---

    /// Wait for pending timers, release the interface and close the handle.
    /// Closing a closed session does nothing.
    pub fn close(&mut self) {
        self.teardown(false);
    }

    fn teardown(&mut self, expedite: bool) {
        if self.state == SessionState::Closed {
            return;
        }
        self.set_state(SessionState::Closing);
        debug!(pending = self.timers.len(), expedite, "Session closing");
        if expedite {
            self.timers.expedite_all();
        } else {
            self.timers.join_all();
        }

        if let Some(mut transport) = self.transport.take() {
            let interface = self.config.interface;
            match Arc::get_mut(&mut transport) {
                Some(t) => match t.release_interface(interface) {
                    Ok(()) => debug!(interface, "Interface released"),
                    Err(e) => warn!(interface, "failed to release interface: {}", e),
                },
                None => warn!(interface, "transport still shared, interface not released"),
            }
        }
        self.set_state(SessionState::Closed);
        info!("Session closed");
    }
}

impl<T: ControlTransport + 'static> Drop for Session<T> {
    fn drop(&mut self) {
        self.teardown(true);
    }
}

/// Build one request per pin in `mask` using the per-pin command table.
fn per_pin(
    mask: PinMask,
    command_for_pin: fn(u8) -> Option<WriteCommand>,
    build: impl Fn(WriteCommand) -> WriteRequest,
) -> Result<Vec<WriteRequest>> {
    mask.pins()
        .map(|pin| {
            let pin = safety::validate_pin_index(pin)?;
            let cmd = command_for_pin(pin).ok_or(Error::InvalidArgument {
                field: "pin_index",
                value: pin as u32,
                min: 0,
                max: PIN_INDEX_MAX as u32,
            })?;
            Ok(build(cmd))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::mock::MockBeacon;

    fn open(mock: &MockBeacon) -> Session<MockBeacon> {
        Session::open_with(mock.clone(), SessionConfig::default()).unwrap()
    }

    #[test]
    fn open_reaches_operating() {
        let mock = MockBeacon::new();
        let session = open(&mock);
        assert_eq!(session.state(), SessionState::Operating);
        assert_eq!(session.vendor_id(), 0x0FC5);
        assert_eq!(session.product_id(), 0xB080);
        let state = mock.state();
        assert_eq!(state.detaches, 1);
        assert_eq!(state.claims, 1);
    }

    #[test]
    fn invalid_config_is_rejected_before_claim() {
        let mock = MockBeacon::new();
        let config = SessionConfig {
            default_intensity: 101,
            ..SessionConfig::default()
        };
        assert!(Session::open_with(mock.clone(), config).is_err());
        assert_eq!(mock.state().claims, 0);
    }

    #[test]
    fn turn_on_uses_reset_mask() {
        let mock = MockBeacon::new();
        let session = open(&mock);
        session.turn_on(PinMask::RED.union(PinMask::BLUE)).unwrap();
        let state = mock.state();
        let last = state.writes.last().unwrap();
        assert_eq!(last.command, WriteCommand::SetOrResetPort1);
        assert_eq!((last.lsb, last.msb), (0b110, 0));
        assert_eq!(state.port1 & 0b111, 0b001);
    }

    #[test]
    fn turn_off_uses_set_mask() {
        let mock = MockBeacon::new();
        let session = open(&mock);
        session.turn_on(PinMask::ALL).unwrap();
        session.turn_off(PinMask::GREEN).unwrap();
        assert_eq!(
            session.read_port_state().unwrap().leds_on(),
            PinMask::RED.union(PinMask::BLUE)
        );
    }

    #[test]
    fn duty_cycle_writes_one_command_per_pin() {
        let mock = MockBeacon::new();
        let session = open(&mock);
        let before = mock.state().writes.len();
        session
            .set_duty_cycle(PinMask::GREEN.union(PinMask::BLUE), 5, 15)
            .unwrap();
        let state = mock.state();
        assert_eq!(state.writes.len() - before, 2);
        assert_eq!(state.duty[0], (5, 15));
        assert_eq!(state.duty[1], (0, 0));
        assert_eq!(state.duty[2], (5, 15));
    }

    #[test]
    fn clock_enable_and_disable_nibbles() {
        let mock = MockBeacon::new();
        let session = open(&mock);
        session.enable_clock(PinMask::ALL).unwrap();
        assert_eq!(mock.state().clock_mask, 0b111);
        assert!(session.read_port_state().unwrap().clock_enabled);
        session.disable_clock(PinMask::RED).unwrap();
        assert_eq!(mock.state().clock_mask, 0b101);
    }

    #[test]
    fn prescaler_zero_is_rejected_locally() {
        let mock = MockBeacon::new();
        let session = open(&mock);
        let before = mock.state().transfers();
        assert!(matches!(
            session.set_clock_prescaler(0),
            Err(Error::InvalidArgument { .. })
        ));
        assert_eq!(mock.state().transfers(), before);
        session.set_clock_prescaler(20).unwrap();
        assert_eq!(mock.state().prescaler, 20);
    }

    #[test]
    fn phase_delay_per_pin() {
        let mock = MockBeacon::new();
        let session = open(&mock);
        session.set_phase_delay(PinMask::RED, 7).unwrap();
        assert_eq!(mock.state().phase_delay, [0, 7, 0, 0]);
    }

    #[test]
    fn sync_clocks_sends_both_masks() {
        let mock = MockBeacon::new();
        let session = open(&mock);
        session.sync_clocks(PinMask::ALL, PinMask::GREEN).unwrap();
        let state = mock.state();
        let last = state.writes.last().unwrap();
        assert_eq!(last.command, WriteCommand::SyncClockGen);
        assert_eq!((last.lsb, last.msb), (0b111, 0b001));
    }

    #[test]
    fn buzzer_uses_extension_bytes() {
        let mock = MockBeacon::new();
        let session = open(&mock);
        session
            .set_buzzer(BuzzerSettings {
                enabled: true,
                frequency: 0x20,
                repeat: 3,
                on_time: 4,
                off_time: 5,
            })
            .unwrap();
        let buzzer = mock.state().buzzer.unwrap();
        assert_eq!((buzzer.lsb, buzzer.msb), (1, 0x20));
        assert_eq!(buzzer.ext, [3, 4, 5, 0]);
    }

    #[test]
    fn auto_clear_confirm_bits() {
        let mock = MockBeacon::new();
        let session = open(&mock);
        session.set_auto_clear_confirm(true, false).unwrap();
        assert_eq!(mock.state().auto_flags, 0x40);
        session.set_auto_clear_confirm(true, true).unwrap();
        assert_eq!(mock.state().auto_flags, 0xC0);
    }

    #[test]
    fn event_counter_toggle() {
        let mock = MockBeacon::new();
        let session = open(&mock);
        session.set_event_counter(true).unwrap();
        assert!(mock.state().counter_enabled);
        session.set_event_counter(false).unwrap();
        assert!(!mock.state().counter_enabled);
    }

    #[test]
    fn flash_repeats_the_on_write() {
        let mock = MockBeacon::new();
        let session = open(&mock);
        let before = mock.state().writes.len();
        session.flash(PinMask::BLUE, 25).unwrap();
        let state = mock.state();
        assert_eq!(state.writes.len() - before, 25);
        assert!(state.writes[before..]
            .iter()
            .all(|w| *w == WriteRequest::leds_on(PinMask::BLUE)));
    }

    #[test]
    fn flash_aborts_on_first_failure() {
        let mock = MockBeacon::new();
        let session = open(&mock);
        let before = mock.state().writes.len();
        {
            let mut state = mock.state();
            state.fail_transfers = 1;
            state.fail_error = TransportError::Disconnected;
        }
        assert!(session.flash(PinMask::GREEN, 10).is_err());
        assert_eq!(mock.state().writes.len() - before, 1);
    }

    #[test]
    fn flash_default_uses_configured_repeat() {
        let mock = MockBeacon::new();
        let config = SessionConfig {
            flash_repeat: 7,
            ..SessionConfig::default()
        };
        let session = Session::open_with(mock.clone(), config).unwrap();
        let before = mock.state().writes.len();
        session.flash_default(PinMask::RED).unwrap();
        assert_eq!(mock.state().writes.len() - before, 7);
    }

    #[test]
    fn status_reflects_session() {
        let mock = MockBeacon::new();
        let mut session = open(&mock);
        assert_eq!(session.status(), DeviceStatus::Connected);
        session.close();
        assert_eq!(session.status(), DeviceStatus::Disconnected);
    }

    #[test]
    fn write_port1_sets_raw_value() {
        let mock = MockBeacon::new();
        let session = open(&mock);
        session.write_port1(0xFA).unwrap();
        assert_eq!(mock.state().port1, 0xFA);
        assert_eq!(
            session.read_port_state().unwrap().leds_on(),
            PinMask::GREEN.union(PinMask::BLUE)
        );
    }

    #[test]
    fn timer_limit_leaves_leds_untouched() {
        let mock = MockBeacon::new();
        let config = SessionConfig {
            max_pending_timers: 1,
            ..SessionConfig::default()
        };
        let mut session = Session::open_with(mock.clone(), config).unwrap();
        session
            .turn_on_timed(PinMask::GREEN, Duration::from_secs(30))
            .unwrap();
        let before = mock.state().writes.len();
        assert!(matches!(
            session.turn_on_timed(PinMask::RED, Duration::from_secs(30)),
            Err(Error::TimerLimit { limit: 1 })
        ));
        assert_eq!(mock.state().writes.len(), before);
        drop(session);
        // Dropping expedites the pending turn-off.
        assert!(mock.state().port1 & 0b001 != 0);
    }

    #[test]
    fn failed_timer_spawn_turns_leds_back_off() {
        let mock = MockBeacon::new();
        let mut session = open(&mock);
        session.timers.fail_spawn = true;

        assert!(matches!(
            session.turn_on_timed(PinMask::BLUE, Duration::from_secs(30)),
            Err(Error::TimerSpawn(_))
        ));
        assert!(session.read_port_state().unwrap().leds_on().is_empty());
        let state = mock.state();
        let n = state.writes.len();
        assert_eq!(state.writes[n - 2], WriteRequest::leds_on(PinMask::BLUE));
        assert_eq!(state.writes[n - 1], WriteRequest::leds_off(PinMask::BLUE));
    }

    #[test]
    fn claim_failure_never_releases() {
        let mock = MockBeacon::new();
        mock.state().fail_claim = Some(TransportError::PermissionDenied);
        let result = Session::open_with(mock.clone(), SessionConfig::default());
        assert!(matches!(result, Err(Error::Claim { .. })));
        drop(result);
        assert_eq!(mock.state().releases, 0);
        assert_eq!(mock.state().detaches, 1);
    }

    #[test]
    fn zero_duration_does_not_schedule() {
        let mock = MockBeacon::new();
        let mut session = open(&mock);
        session.turn_on_timed(PinMask::RED, Duration::ZERO).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(session.read_port_state().unwrap().leds_on(), PinMask::RED);
    }
}
