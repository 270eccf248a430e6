//! Command catalog for the Delcom USB visual indicator (firmware v58).
//!
//! The device understands a small set of "major" commands. Three are queries
//! whose 8-byte result is fetched with a HID Get_Report; the write major
//! commands carry a "minor" command selecting the register being written,
//! plus two data bytes (`lsb`, `msb`) whose meaning depends on the minor.
//!
//! # Port 1 pin map (Beacon GRB indicator)
//! - pin 0: green
//! - pin 1: red
//! - pin 2: blue
//! - pin 3: buzzer
//!
//! LED pins are active low: a reset (low) pin is lit.

use crate::error::{Error, Result};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Top-level operation selector, byte 0 of every report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MajorCommand {
    /// Returns the 32-bit event counter and overflow flag, then clears it.
    ReadEventCounter = 8,
    /// Returns serial number, firmware version and firmware date.
    ReadFirmware = 10,
    /// Returns port 0, port 1, the port 1 clock enable state and port 2.
    ReadPorts = 100,
    /// Writes an 8-byte command packet. Qualified by a [`WriteCommand`].
    Write8Bytes = 101,
    /// Writes a 16-byte command packet. Not issued by this crate.
    Write16Bytes = 102,
}

impl MajorCommand {
    pub const ALL: &'static [MajorCommand] = &[
        MajorCommand::ReadEventCounter,
        MajorCommand::ReadFirmware,
        MajorCommand::ReadPorts,
        MajorCommand::Write8Bytes,
        MajorCommand::Write16Bytes,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| *c as u8 == value)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether the command is fetched with Get_Report.
    pub fn is_query(self) -> bool {
        matches!(
            self,
            Self::ReadEventCounter | Self::ReadFirmware | Self::ReadPorts
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ReadEventCounter => "ReadEventCounter",
            Self::ReadFirmware => "ReadFirmware",
            Self::ReadPorts => "ReadPorts",
            Self::Write8Bytes => "Write8Bytes",
            Self::Write16Bytes => "Write16Bytes",
        }
    }
}

/// Register selector for a [`MajorCommand::Write8Bytes`] report, byte 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WriteCommand {
    /// LSB is written to port 0.
    Port0 = 1,
    /// LSB is written to port 1.
    Port1 = 2,
    /// LSB to port 0, MSB to port 1.
    Port0and1 = 10,
    /// LSB resets, MSB sets port 0 pins. Reset wins.
    SetOrResetPort0 = 11,
    /// LSB resets, MSB sets port 1 pins. Reset wins.
    SetOrResetPort1 = 12,
    /// LSB is the global clock prescaler (1..=255, boot default 10).
    SetClockGen = 19,
    /// Low nibble of LSB disables, low nibble of MSB enables the port 1
    /// clock generator per pin. Disable wins.
    ToggleClockGenPort1 = 20,
    /// LSB high duty, MSB low duty for port 1 pin 0.
    SetDutyCyclePort1Pin0 = 21,
    /// LSB high duty, MSB low duty for port 1 pin 1.
    SetDutyCyclePort1Pin1 = 22,
    /// LSB high duty, MSB low duty for port 1 pin 2.
    SetDutyCyclePort1Pin2 = 23,
    /// Restart all clock generators. Low nibble of LSB selects pins, low
    /// nibble of MSB presets their initial value.
    SyncClockGen = 25,
    /// LSB is the initial phase delay (10 ms units) for port 1 pin 0.
    SetInitialPhaseDelayPort1Pin0 = 26,
    SetInitialPhaseDelayPort1Pin1 = 27,
    SetInitialPhaseDelayPort1Pin2 = 28,
    SetInitialPhaseDelayPort1Pin3 = 29,
    /// LSB is the pin index (0..=3), MSB the PWM percentage (0..=100).
    SetPwm = 34,
    /// LSB enables (1) or disables (0) the event counter on P0.0.
    ToggleEventCounter = 38,
    /// Drives the buzzer on P1.3. Uses the extension bytes.
    BuzzerCtrl = 70,
    /// Bit 6 of LSB is auto clear, bit 7 auto confirm.
    AutoClearAutoConfirmCtrl = 72,
}

impl WriteCommand {
    pub const ALL: &'static [WriteCommand] = &[
        WriteCommand::Port0,
        WriteCommand::Port1,
        WriteCommand::Port0and1,
        WriteCommand::SetOrResetPort0,
        WriteCommand::SetOrResetPort1,
        WriteCommand::SetClockGen,
        WriteCommand::ToggleClockGenPort1,
        WriteCommand::SetDutyCyclePort1Pin0,
        WriteCommand::SetDutyCyclePort1Pin1,
        WriteCommand::SetDutyCyclePort1Pin2,
        WriteCommand::SyncClockGen,
        WriteCommand::SetInitialPhaseDelayPort1Pin0,
        WriteCommand::SetInitialPhaseDelayPort1Pin1,
        WriteCommand::SetInitialPhaseDelayPort1Pin2,
        WriteCommand::SetInitialPhaseDelayPort1Pin3,
        WriteCommand::SetPwm,
        WriteCommand::ToggleEventCounter,
        WriteCommand::BuzzerCtrl,
        WriteCommand::AutoClearAutoConfirmCtrl,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| *c as u8 == value)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Duty-cycle register for a port 1 LED pin.
    pub fn duty_cycle_for_pin(pin: u8) -> Option<Self> {
        match pin {
            0 => Some(Self::SetDutyCyclePort1Pin0),
            1 => Some(Self::SetDutyCyclePort1Pin1),
            2 => Some(Self::SetDutyCyclePort1Pin2),
            _ => None,
        }
    }

    /// Initial phase delay register for a port 1 pin.
    pub fn phase_delay_for_pin(pin: u8) -> Option<Self> {
        match pin {
            0 => Some(Self::SetInitialPhaseDelayPort1Pin0),
            1 => Some(Self::SetInitialPhaseDelayPort1Pin1),
            2 => Some(Self::SetInitialPhaseDelayPort1Pin2),
            3 => Some(Self::SetInitialPhaseDelayPort1Pin3),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Port0 => "Port0",
            Self::Port1 => "Port1",
            Self::Port0and1 => "Port0and1",
            Self::SetOrResetPort0 => "SetOrResetPort0",
            Self::SetOrResetPort1 => "SetOrResetPort1",
            Self::SetClockGen => "SetClockGen",
            Self::ToggleClockGenPort1 => "ToggleClockGenPort1",
            Self::SetDutyCyclePort1Pin0 => "SetDutyCyclePort1Pin0",
            Self::SetDutyCyclePort1Pin1 => "SetDutyCyclePort1Pin1",
            Self::SetDutyCyclePort1Pin2 => "SetDutyCyclePort1Pin2",
            Self::SyncClockGen => "SyncClockGen",
            Self::SetInitialPhaseDelayPort1Pin0 => "SetInitialPhaseDelayPort1Pin0",
            Self::SetInitialPhaseDelayPort1Pin1 => "SetInitialPhaseDelayPort1Pin1",
            Self::SetInitialPhaseDelayPort1Pin2 => "SetInitialPhaseDelayPort1Pin2",
            Self::SetInitialPhaseDelayPort1Pin3 => "SetInitialPhaseDelayPort1Pin3",
            Self::SetPwm => "SetPWM",
            Self::ToggleEventCounter => "ToggleEventCounter",
            Self::BuzzerCtrl => "BuzzerCtrl",
            Self::AutoClearAutoConfirmCtrl => "AutoClearAutoConfirmCtrl",
        }
    }
}

impl fmt::Display for WriteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Highest PWM percentage the firmware accepts.
pub const PWM_MAX: u8 = 100;
/// Highest port 1 pin index addressable by PWM and phase-delay commands.
pub const PIN_INDEX_MAX: u8 = 3;
/// Boot-up clock prescaler.
pub const PRESCALER_DEFAULT: u8 = 10;
/// Auto clear flag in the AutoClearAutoConfirmCtrl LSB.
pub const AUTO_CLEAR_BIT: u8 = 1 << 6;
/// Auto confirm flag in the AutoClearAutoConfirmCtrl LSB.
pub const AUTO_CONFIRM_BIT: u8 = 1 << 7;

/// 3-bit selector over the LED pins of port 1.
///
/// Only bits 0..=2 are meaningful; construction from raw bits rejects the
/// rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PinMask(u8);

impl PinMask {
    pub const NONE: PinMask = PinMask(0);
    pub const GREEN: PinMask = PinMask(0b001);
    pub const RED: PinMask = PinMask(0b010);
    pub const BLUE: PinMask = PinMask(0b100);
    pub const ALL: PinMask = PinMask(0b111);

    const VALID_BITS: u8 = 0b111;

    /// Build a mask from raw bits, rejecting anything outside bits 0..=2.
    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits & !Self::VALID_BITS != 0 {
            return Err(Error::InvalidArgument {
                field: "pin_mask",
                value: bits as u32,
                min: 0,
                max: Self::VALID_BITS as u32,
            });
        }
        Ok(Self(bits))
    }

    /// Build a mask from raw bits, discarding anything outside bits 0..=2.
    pub fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::VALID_BITS)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn union(self, other: PinMask) -> PinMask {
        PinMask(self.0 | other.0)
    }

    pub fn intersection(self, other: PinMask) -> PinMask {
        PinMask(self.0 & other.0)
    }

    pub fn contains(self, other: PinMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Indices of the selected pins, lowest first.
    pub fn pins(self) -> impl Iterator<Item = u8> {
        (0..3u8).filter(move |i| self.0 & (1 << i) != 0)
    }

    fn color_name(pin: u8) -> &'static str {
        match pin {
            0 => "green",
            1 => "red",
            _ => "blue",
        }
    }
}

impl fmt::Display for PinMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = self.pins().map(Self::color_name).collect();
        write!(f, "{}", names.join(","))
    }
}

impl FromStr for PinMask {
    type Err = Error;

    /// Accepts color names joined by commas (`red,blue`), `all`, `none`,
    /// or a binary/hex/decimal bit value (`0b101`, `0x5`, `5`).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if let Some(bin) = s.strip_prefix("0b") {
            let bits = u8::from_str_radix(bin, 2).map_err(|_| parse_error(&s))?;
            return Self::from_bits(bits);
        }
        if let Some(hex) = s.strip_prefix("0x") {
            let bits = u8::from_str_radix(hex, 16).map_err(|_| parse_error(&s))?;
            return Self::from_bits(bits);
        }
        if let Ok(bits) = s.parse::<u8>() {
            return Self::from_bits(bits);
        }

        let mut mask = PinMask::NONE;
        for part in s.split(',').map(str::trim) {
            let pin = match part {
                "green" | "g" => PinMask::GREEN,
                "red" | "r" => PinMask::RED,
                "blue" | "b" => PinMask::BLUE,
                "all" => PinMask::ALL,
                "none" => PinMask::NONE,
                _ => return Err(parse_error(&s)),
            };
            mask = mask.union(pin);
        }
        Ok(mask)
    }
}

fn parse_error(input: &str) -> Error {
    Error::Config(format!(
        "invalid pin mask '{input}' (expected green, red, blue, all, none, or 0b000..0b111)"
    ))
}

/// Whether a command is fetched or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Query,
    Write,
}

/// Meaning of a data byte in a write report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRole {
    /// Not interpreted by the firmware; sent as zero.
    Unused,
    /// Raw port value.
    PortValue,
    /// Pins to force low. Takes precedence over [`ByteRole::SetMask`].
    ResetMask,
    /// Pins to force high.
    SetMask,
    /// Clock prescaler, 1..=255.
    Prescaler,
    /// Low nibble selects pins to disable. Takes precedence over enable.
    DisableNibble,
    /// Low nibble selects pins to enable.
    EnableNibble,
    /// Duty cycle tick count.
    DutyTicks,
    /// Phase delay in 10 ms units.
    PhaseDelay,
    /// Pin index, 0..=3.
    PinIndex,
    /// Percentage, 0..=100.
    Percent,
    /// 0 or 1.
    Flag,
    /// Individual flag bits.
    Bits,
    /// Buzzer frequency divider.
    Frequency,
}

impl ByteRole {
    /// Accepted values for this role.
    pub fn range(self) -> RangeInclusive<u8> {
        match self {
            Self::Unused => 0..=0,
            Self::Prescaler => 1..=u8::MAX,
            Self::DisableNibble | Self::EnableNibble => 0..=0x0F,
            Self::PinIndex => 0..=PIN_INDEX_MAX,
            Self::Percent => 0..=PWM_MAX,
            Self::Flag => 0..=1,
            _ => 0..=u8::MAX,
        }
    }
}

/// One row of the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub major: MajorCommand,
    pub minor: Option<WriteCommand>,
    pub kind: CommandKind,
    pub lsb: ByteRole,
    pub msb: ByteRole,
    /// Whether bytes 4..8 carry command data.
    pub uses_ext: bool,
}

const fn query(major: MajorCommand) -> CommandSpec {
    CommandSpec {
        major,
        minor: None,
        kind: CommandKind::Query,
        lsb: ByteRole::Unused,
        msb: ByteRole::Unused,
        uses_ext: false,
    }
}

const fn write(minor: WriteCommand, lsb: ByteRole, msb: ByteRole) -> CommandSpec {
    CommandSpec {
        major: MajorCommand::Write8Bytes,
        minor: Some(minor),
        kind: CommandKind::Write,
        lsb,
        msb,
        uses_ext: false,
    }
}

/// Every command this crate knows how to issue.
pub const COMMANDS: &[CommandSpec] = &[
    query(MajorCommand::ReadEventCounter),
    query(MajorCommand::ReadFirmware),
    query(MajorCommand::ReadPorts),
    write(WriteCommand::Port0, ByteRole::PortValue, ByteRole::Unused),
    write(WriteCommand::Port1, ByteRole::PortValue, ByteRole::Unused),
    write(
        WriteCommand::Port0and1,
        ByteRole::PortValue,
        ByteRole::PortValue,
    ),
    write(
        WriteCommand::SetOrResetPort0,
        ByteRole::ResetMask,
        ByteRole::SetMask,
    ),
    write(
        WriteCommand::SetOrResetPort1,
        ByteRole::ResetMask,
        ByteRole::SetMask,
    ),
    write(
        WriteCommand::SetClockGen,
        ByteRole::Prescaler,
        ByteRole::Unused,
    ),
    write(
        WriteCommand::ToggleClockGenPort1,
        ByteRole::DisableNibble,
        ByteRole::EnableNibble,
    ),
    write(
        WriteCommand::SetDutyCyclePort1Pin0,
        ByteRole::DutyTicks,
        ByteRole::DutyTicks,
    ),
    write(
        WriteCommand::SetDutyCyclePort1Pin1,
        ByteRole::DutyTicks,
        ByteRole::DutyTicks,
    ),
    write(
        WriteCommand::SetDutyCyclePort1Pin2,
        ByteRole::DutyTicks,
        ByteRole::DutyTicks,
    ),
    write(
        WriteCommand::SyncClockGen,
        ByteRole::EnableNibble,
        ByteRole::EnableNibble,
    ),
    write(
        WriteCommand::SetInitialPhaseDelayPort1Pin0,
        ByteRole::PhaseDelay,
        ByteRole::Unused,
    ),
    write(
        WriteCommand::SetInitialPhaseDelayPort1Pin1,
        ByteRole::PhaseDelay,
        ByteRole::Unused,
    ),
    write(
        WriteCommand::SetInitialPhaseDelayPort1Pin2,
        ByteRole::PhaseDelay,
        ByteRole::Unused,
    ),
    write(
        WriteCommand::SetInitialPhaseDelayPort1Pin3,
        ByteRole::PhaseDelay,
        ByteRole::Unused,
    ),
    write(WriteCommand::SetPwm, ByteRole::PinIndex, ByteRole::Percent),
    write(
        WriteCommand::ToggleEventCounter,
        ByteRole::Flag,
        ByteRole::Unused,
    ),
    CommandSpec {
        uses_ext: true,
        ..write(WriteCommand::BuzzerCtrl, ByteRole::Flag, ByteRole::Frequency)
    },
    write(
        WriteCommand::AutoClearAutoConfirmCtrl,
        ByteRole::Bits,
        ByteRole::Unused,
    ),
];

/// Look up the table row for a write minor command.
pub fn write_spec(minor: WriteCommand) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.minor == Some(minor))
}

/// Look up the table row for a query major command.
pub fn query_spec(major: MajorCommand) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| spec.kind == CommandKind::Query && spec.major == major)
}
