//! beacon-core: report codec, transport and device session for Delcom USB
//! visual indicators.
//!
//! The beacon is a HID device driven entirely through 8-byte feature
//! reports sent as USB control transfers. This crate encodes those reports,
//! frames them as HID class requests over libusb, and wraps an open device
//! in a [`Session`] that owns the claimed interface.

pub mod catalog;
pub mod comm;
pub mod config;
pub mod device;
pub mod error;
pub mod report;
pub mod safety;
pub mod session;
mod timer;
pub mod transport;

pub use catalog::PinMask;
pub use config::SessionConfig;
pub use error::{Error, Result, TransportError};
pub use session::{BuzzerSettings, Session, SessionState};

/// Delcom USB Vendor ID.
pub const DELCOM_VID: u16 = 0x0FC5;

/// Known Delcom product IDs.
pub mod pids {
    /// USB HID Visual Indicator (generation 2 and later).
    pub const VISUAL_INDICATOR: u16 = 0xB080;
}
