//! 8-byte report encoding and decoding.
//!
//! Every exchange with the device moves exactly one 8-byte feature report.
//! Outgoing write reports are laid out as:
//!
//! | byte | field                     |
//! |------|---------------------------|
//! | 0    | major command             |
//! | 1    | minor (write) command     |
//! | 2    | LSB data                  |
//! | 3    | MSB data                  |
//! | 4..8 | extension data, usually 0 |
//!
//! Query reports carry only the major command in byte 0; the device
//! overwrites all 8 bytes with its answer.

use crate::catalog::{MajorCommand, PinMask, WriteCommand};
use crate::error::{Error, Result, TransportError};
use serde::Serialize;
use std::fmt;

/// Size of every report in both directions.
pub const REPORT_LEN: usize = 8;
/// Number of extension bytes following LSB/MSB.
pub const EXT_LEN: usize = 4;

/// Year offset applied to the firmware date byte.
const FIRMWARE_YEAR_BASE: u16 = 2000;
/// Overflow status byte value meaning the event counter wrapped.
const COUNTER_OVERFLOW: u8 = 0xFF;

/// A raw 8-byte feature report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Report([u8; REPORT_LEN]);

impl Report {
    pub fn from_bytes(bytes: [u8; REPORT_LEN]) -> Self {
        Self(bytes)
    }

    /// Copy a report out of a received buffer. Fails on fewer than 8 bytes;
    /// anything past byte 7 is ignored.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let bytes: [u8; REPORT_LEN] = data
            .get(..REPORT_LEN)
            .and_then(|head| head.try_into().ok())
            .ok_or(TransportError::ShortTransfer {
                expected: REPORT_LEN,
                actual: data.len(),
            })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; REPORT_LEN] {
        &self.0
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8; REPORT_LEN] {
        &mut self.0
    }

    /// First byte: the major command the report belongs to.
    pub fn major(&self) -> u8 {
        self.0[0]
    }

    /// Encode a write report. Extension bytes are zero.
    pub fn encode(major: MajorCommand, minor: WriteCommand, lsb: u8, msb: u8) -> Self {
        Self::encode_with_ext(major, minor, lsb, msb, [0; EXT_LEN])
    }

    /// Encode a write report carrying extension data in bytes 4..8.
    pub fn encode_with_ext(
        major: MajorCommand,
        minor: WriteCommand,
        lsb: u8,
        msb: u8,
        ext: [u8; EXT_LEN],
    ) -> Self {
        let mut buf = [0u8; REPORT_LEN];
        buf[0] = major.as_u8();
        buf[1] = minor.as_u8();
        buf[2] = lsb;
        buf[3] = msb;
        buf[4..].copy_from_slice(&ext);
        Self(buf)
    }

    /// Encode a query report: major command in byte 0, zeros elsewhere.
    pub fn encode_query(major: MajorCommand) -> Self {
        let mut buf = [0u8; REPORT_LEN];
        buf[0] = major.as_u8();
        Self(buf)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X?}", self.0)
    }
}

/// A typed write command: the minor selector plus its data bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRequest {
    pub command: WriteCommand,
    pub lsb: u8,
    pub msb: u8,
    pub ext: [u8; EXT_LEN],
}

impl WriteRequest {
    pub fn new(command: WriteCommand, lsb: u8, msb: u8) -> Self {
        Self {
            command,
            lsb,
            msb,
            ext: [0; EXT_LEN],
        }
    }

    pub fn with_ext(mut self, ext: [u8; EXT_LEN]) -> Self {
        self.ext = ext;
        self
    }

    /// Set/reset port 1: `reset` pins go low, `set` pins go high.
    ///
    /// Both masks are encoded as given. When a pin appears in both, the
    /// firmware resets it.
    pub fn set_reset_port1(reset: u8, set: u8) -> Self {
        Self::new(WriteCommand::SetOrResetPort1, reset, set)
    }

    /// Light the LEDs in `mask` (drive their pins low).
    pub fn leds_on(mask: PinMask) -> Self {
        Self::set_reset_port1(mask.bits(), 0)
    }

    /// Extinguish the LEDs in `mask` (drive their pins high).
    pub fn leds_off(mask: PinMask) -> Self {
        Self::set_reset_port1(0, mask.bits())
    }

    pub fn encode(&self) -> Report {
        Report::encode_with_ext(
            MajorCommand::Write8Bytes,
            self.command,
            self.lsb,
            self.msb,
            self.ext,
        )
    }

    /// Parse a write report back into its typed form.
    pub fn decode(report: &Report) -> Result<Self> {
        let bytes = report.as_bytes();
        if bytes[0] != MajorCommand::Write8Bytes.as_u8() {
            return Err(Error::Decode(format!(
                "expected write major command {}, got {}",
                MajorCommand::Write8Bytes.as_u8(),
                bytes[0]
            )));
        }
        let command = WriteCommand::from_u8(bytes[1])
            .ok_or_else(|| Error::Decode(format!("unknown write command {}", bytes[1])))?;
        let mut ext = [0u8; EXT_LEN];
        ext.copy_from_slice(&bytes[4..]);
        Ok(Self {
            command,
            lsb: bytes[2],
            msb: bytes[3],
            ext,
        })
    }
}

/// Firmware identification returned by [`MajorCommand::ReadFirmware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirmwareInfo {
    pub serial_number: u32,
    pub version: u8,
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "serial 0x{:08X}, firmware v{} ({:04}-{:02}-{:02})",
            self.serial_number, self.version, self.year, self.month, self.day
        )
    }
}

/// Port snapshot returned by [`MajorCommand::ReadPorts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortState {
    pub port0: u8,
    pub port1: u8,
    pub port2: u8,
    pub clock_enabled: bool,
}

impl PortState {
    /// LED pins currently lit (low on port 1).
    pub fn leds_on(&self) -> PinMask {
        PinMask::from_bits_truncate(!self.port1)
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "port0=0x{:02X} port1=0x{:02X} port2=0x{:02X} clock={} leds_on={}",
            self.port0,
            self.port1,
            self.port2,
            if self.clock_enabled { "on" } else { "off" },
            self.leds_on()
        )
    }
}

/// Event counter snapshot returned by [`MajorCommand::ReadEventCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventCounter {
    pub count: u32,
    pub overflow: bool,
}

impl From<EventCounter> for (u32, bool) {
    fn from(c: EventCounter) -> Self {
        (c.count, c.overflow)
    }
}

impl fmt::Display for EventCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} events", self.count)?;
        if self.overflow {
            write!(f, " (overflow)")?;
        }
        Ok(())
    }
}

fn require_len(data: &[u8], needed: usize) -> Result<()> {
    if data.len() < needed {
        return Err(TransportError::ShortTransfer {
            expected: needed,
            actual: data.len(),
        }
        .into());
    }
    Ok(())
}

/// Bytes 0..4 serial (little endian), 4 version, 5 day, 6 month, 7 year
/// offset from 2000.
pub fn decode_firmware(data: &[u8]) -> Result<FirmwareInfo> {
    require_len(data, REPORT_LEN)?;
    Ok(FirmwareInfo {
        serial_number: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        version: data[4],
        day: data[5],
        month: data[6],
        year: FIRMWARE_YEAR_BASE + data[7] as u16,
    })
}

/// Byte 0 port 0, byte 1 port 1, byte 2 clock enable, byte 3 port 2.
pub fn decode_ports(data: &[u8]) -> Result<PortState> {
    require_len(data, 4)?;
    Ok(PortState {
        port0: data[0],
        port1: data[1],
        clock_enabled: data[2] != 0,
        port2: data[3],
    })
}

/// Bytes 0..4 counter (little endian), byte 4 overflow status.
pub fn decode_event_counter(data: &[u8]) -> Result<EventCounter> {
    require_len(data, 5)?;
    Ok(EventCounter {
        count: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        overflow: data[4] == COUNTER_OVERFLOW,
    })
}
