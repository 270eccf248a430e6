//! Safety layer: validates every write against the command catalog before
//! it is encoded.
//!
//! # Ranges
//!
//! ## PWM
//! - **Pin index**: 0–3 (P1.0 through P1.3)
//! - **Percentage**: 0–100. Firmware default is 80, this crate initializes
//!   to a configurable value (50 unless overridden).
//!
//! ## Clock generator
//! - **Prescaler**: 1–255, boot default 10. Zero would stall every clock.
//! - **Enable/disable masks**: low nibble only (P1.0 through P1.3).
//!
//! ## Pin masks
//! - 3 bits over the LED pins. Higher bits are rejected when parsing raw
//!   input (see [`catalog::PinMask::from_bits`]).
//!
//! ## Invariant
//! All validation happens before any transfer. An out-of-range value never
//! reaches the device and surfaces as [`Error::InvalidArgument`].

use crate::catalog::{self, ByteRole, CommandKind, PIN_INDEX_MAX, PWM_MAX};
use crate::error::{Error, Result};
use crate::report::WriteRequest;

fn out_of_range(field: &'static str, value: u32, min: u32, max: u32) -> Error {
    Error::InvalidArgument {
        field,
        value,
        min,
        max,
    }
}

fn check_byte(field: &'static str, role: ByteRole, value: u8) -> Result<()> {
    let range = role.range();
    if !range.contains(&value) {
        return Err(out_of_range(
            field,
            value as u32,
            *range.start() as u32,
            *range.end() as u32,
        ));
    }
    Ok(())
}

/// Validate a write request against its catalog row.
pub fn validate_write(req: &WriteRequest) -> Result<()> {
    let spec = catalog::write_spec(req.command).ok_or_else(|| {
        out_of_range("write_command", req.command.as_u8() as u32, 0, u8::MAX as u32)
    })?;
    if spec.kind != CommandKind::Write {
        return Err(out_of_range(
            "write_command",
            req.command.as_u8() as u32,
            0,
            u8::MAX as u32,
        ));
    }
    check_byte("lsb", spec.lsb, req.lsb)?;
    check_byte("msb", spec.msb, req.msb)?;
    if !spec.uses_ext {
        if let Some(&nonzero) = req.ext.iter().find(|b| **b != 0) {
            return Err(out_of_range("ext", nonzero as u32, 0, 0));
        }
    }
    Ok(())
}

/// Validate a PWM percentage.
pub fn validate_intensity(pct: u8) -> Result<u8> {
    if pct > PWM_MAX {
        return Err(out_of_range("intensity", pct as u32, 0, PWM_MAX as u32));
    }
    Ok(pct)
}

/// Validate a port 1 pin index.
pub fn validate_pin_index(pin: u8) -> Result<u8> {
    if pin > PIN_INDEX_MAX {
        return Err(out_of_range("pin_index", pin as u32, 0, PIN_INDEX_MAX as u32));
    }
    Ok(pin)
}

/// Validate the clock generator prescaler.
pub fn validate_prescaler(value: u8) -> Result<u8> {
    if value == 0 {
        return Err(out_of_range("prescaler", 0, 1, u8::MAX as u32));
    }
    Ok(value)
}
