//! Error types for beacon-core.

use thiserror::Error;

/// Failure of a single USB control transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transfer did not complete within the configured timeout.
    #[error("control transfer timed out")]
    Timeout,

    /// Fewer bytes than a full report were moved.
    #[error("short transfer: {actual} of {expected} bytes")]
    ShortTransfer { expected: usize, actual: usize },

    /// Insufficient permissions on the device node.
    #[error("permission denied")]
    PermissionDenied,

    /// The device went away.
    #[error("device disconnected")]
    Disconnected,

    /// Resource busy (interface claimed elsewhere, endpoint stalled).
    #[error("device busy")]
    Busy,

    /// Any other libusb failure.
    #[error("usb: {0}")]
    Usb(String),
}

impl From<rusb::Error> for TransportError {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::Timeout => Self::Timeout,
            rusb::Error::Access => Self::PermissionDenied,
            rusb::Error::NoDevice | rusb::Error::NotFound => Self::Disconnected,
            rusb::Error::Busy => Self::Busy,
            other => Self::Usb(other.to_string()),
        }
    }
}

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Discovery found no device with the requested vendor/product id.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// A matching device was found but could not be opened.
    #[error("failed to open device {vid:04x}:{pid:04x}: {source}")]
    Open {
        vid: u16,
        pid: u16,
        #[source]
        source: TransportError,
    },

    /// The HID interface could not be detached from the kernel or claimed.
    #[error("failed to claim interface {interface}: {source}")]
    Claim {
        interface: u8,
        #[source]
        source: TransportError,
    },

    /// The post-claim setup sequence failed.
    #[error("device initialization failed during {step}: {source}")]
    Init {
        step: &'static str,
        #[source]
        source: TransportError,
    },

    /// A control transfer failed during an operation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Locally detected out-of-range input. Never sent to the device.
    #[error("invalid argument: {field} = {value} (allowed {min}..={max})")]
    InvalidArgument {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// A report could not be interpreted.
    #[error("malformed report: {0}")]
    Decode(String),

    /// Operation issued after the session was closed.
    #[error("session is closed")]
    SessionClosed,

    /// Too many timed turn-offs are still pending.
    #[error("too many pending timers (limit {limit})")]
    TimerLimit { limit: usize },

    /// The timer thread could not be started.
    #[error("failed to spawn timer: {0}")]
    TimerSpawn(#[source] std::io::Error),

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// The underlying transfer failure, if this error carries one.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(e)
            | Self::Open { source: e, .. }
            | Self::Claim { source: e, .. }
            | Self::Init { source: e, .. } => Some(e),
            _ => None,
        }
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
