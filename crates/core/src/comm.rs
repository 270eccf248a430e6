//! Device communication layer with error handling and retry logic.
//!
//! Classifies failures so the session can retry transient ones on
//! non-destructive queries. Writes and the event-counter read are never
//! retried.

use crate::catalog::MajorCommand;
use crate::error::{Error, Result, TransportError};
use crate::report::Report;
use crate::transport::{get_report, ControlTransport};
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of extra attempts for transient query failures.
pub const MAX_RETRIES: u32 = 3;

/// Classification of communication errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient errors that may succeed on retry (timeout, busy).
    Transient,
    /// Device is disconnected. Stop retrying.
    Disconnected,
    /// Permission denied on the device node.
    PermissionDenied,
    /// Short, corrupted or unexpected data, or a local rejection.
    InvalidResponse,
}

impl ErrorClass {
    pub fn classify_transport(err: &TransportError) -> Self {
        match err {
            TransportError::Timeout | TransportError::Busy => Self::Transient,
            TransportError::Disconnected => Self::Disconnected,
            TransportError::PermissionDenied => Self::PermissionDenied,
            TransportError::ShortTransfer { .. } => Self::InvalidResponse,
            TransportError::Usb(msg) => {
                let lower = msg.to_lowercase();
                if lower.contains("no such device") || lower.contains("disconnect") {
                    Self::Disconnected
                } else if lower.contains("timeout") || lower.contains("timed out") {
                    Self::Transient
                } else {
                    Self::InvalidResponse
                }
            }
        }
    }

    /// Classify an error for retry decisions.
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::DeviceNotFound(_) | Error::SessionClosed => Self::Disconnected,
            other => match other.transport_error() {
                Some(t) => Self::classify_transport(t),
                None => Self::InvalidResponse,
            },
        }
    }

    /// Whether this error class is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `max_retries` extra attempts are used up.
pub fn with_retry<T>(max_retries: u32, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => {
                if attempt > 0 {
                    debug!("request succeeded on attempt {}", attempt + 1);
                }
                return Ok(value);
            }
            Err(e) => {
                let class = ErrorClass::classify(&e);
                if !class.is_retryable() || attempt == max_retries {
                    warn!(
                        "request failed (class={:?}, attempt={}/{}): {}",
                        class,
                        attempt + 1,
                        max_retries + 1,
                        e
                    );
                    return Err(e);
                }
                debug!(
                    "transient error (attempt {}/{}): {}, retrying...",
                    attempt + 1,
                    max_retries + 1,
                    e
                );
                attempt += 1;
            }
        }
    }
}

/// Fetch a query report, retrying transient failures.
pub fn query_with_retry<T: ControlTransport + ?Sized>(
    transport: &T,
    interface: u8,
    major: MajorCommand,
    timeout: Duration,
    max_retries: u32,
) -> Result<Report> {
    with_retry(max_retries, || {
        get_report(transport, interface, major.as_u8(), timeout)
    })
}

/// Device connection status for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DeviceStatus {
    /// Device is connected and responding.
    Connected,
    /// Device is not found / disconnected.
    Disconnected,
    /// Permission denied. Needs a udev rule or elevated rights.
    PermissionError,
    /// Communication error (transient or garbled).
    Error,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::PermissionError => "permission denied",
            Self::Error => "error",
        };
        write!(f, "{label}")
    }
}

/// Map the outcome of a ping to a display status.
pub fn status_from<T>(result: &Result<T>) -> DeviceStatus {
    match result {
        Ok(_) => DeviceStatus::Connected,
        Err(e) => match ErrorClass::classify(e) {
            ErrorClass::Disconnected => DeviceStatus::Disconnected,
            ErrorClass::PermissionDenied => DeviceStatus::PermissionError,
            _ => DeviceStatus::Error,
        },
    }
}

/// Check connectivity by reading the firmware report once.
pub fn check_device_status<T: ControlTransport + ?Sized>(
    transport: &T,
    interface: u8,
    timeout: Duration,
) -> DeviceStatus {
    status_from(&get_report(
        transport,
        interface,
        MajorCommand::ReadFirmware.as_u8(),
        timeout,
    ))
}
