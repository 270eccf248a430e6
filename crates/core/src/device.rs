//! Device model: discovery and the libusb-backed handle.

use crate::error::{Error, Result, TransportError};
use crate::transport::ControlTransport;
use crate::{pids, DELCOM_VID};
use rusb::{Context, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::{debug, info};

/// Supported indicator models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum BeaconModel {
    VisualIndicator,
}

impl BeaconModel {
    /// Look up model from vendor and product ID.
    pub fn from_ids(vid: u16, pid: u16) -> Option<Self> {
        match (vid, pid) {
            (DELCOM_VID, pids::VISUAL_INDICATOR) => Some(Self::VisualIndicator),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::VisualIndicator => "Delcom USB Visual Indicator",
        }
    }

    pub fn vid(&self) -> u16 {
        DELCOM_VID
    }

    pub fn pid(&self) -> u16 {
        match self {
            Self::VisualIndicator => pids::VISUAL_INDICATOR,
        }
    }
}

/// Information about a discovered beacon.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeviceInfo {
    pub model: BeaconModel,
    pub vid: u16,
    pub pid: u16,
    pub bus: u8,
    pub address: u8,
}

/// Create a libusb context, optionally with libusb's own debug output.
pub fn usb_context(libusb_debug: bool) -> Result<Context> {
    let mut context = Context::new().map_err(TransportError::from)?;
    if libusb_debug {
        context.set_log_level(rusb::LogLevel::Debug);
    }
    Ok(context)
}

/// List attached beacons of every known model.
pub fn discover_devices(context: &Context) -> Result<Vec<DeviceInfo>> {
    debug!("Starting USB device enumeration");
    let mut found = Vec::new();
    for device in context.devices().map_err(TransportError::from)?.iter() {
        let Ok(desc) = device.device_descriptor() else {
            continue;
        };
        if let Some(model) = BeaconModel::from_ids(desc.vendor_id(), desc.product_id()) {
            info!(
                model = model.name(),
                vid = format_args!("0x{:04X}", desc.vendor_id()),
                pid = format_args!("0x{:04X}", desc.product_id()),
                bus = device.bus_number(),
                address = device.address(),
                "Found beacon"
            );
            found.push(DeviceInfo {
                model,
                vid: desc.vendor_id(),
                pid: desc.product_id(),
                bus: device.bus_number(),
                address: device.address(),
            });
        }
    }
    debug!(count = found.len(), "Device enumeration complete");
    Ok(found)
}

/// The first candidate whose ids equal `vid:pid`.
fn first_match<D>(
    candidates: impl IntoIterator<Item = (D, u16, u16)>,
    vid: u16,
    pid: u16,
) -> Result<D> {
    candidates
        .into_iter()
        .find(|(_, v, p)| *v == vid && *p == pid)
        .map(|(device, _, _)| device)
        .ok_or_else(|| Error::DeviceNotFound(format!("{vid:04x}:{pid:04x}")))
}

/// Open the first device matching `vid:pid` exactly.
pub fn find_and_open(context: &Context, vid: u16, pid: u16) -> Result<UsbHandle> {
    let devices = context.devices().map_err(TransportError::from)?;
    let device = first_match(
        devices.iter().filter_map(|device| {
            let desc = device.device_descriptor().ok()?;
            Some((device, desc.vendor_id(), desc.product_id()))
        }),
        vid,
        pid,
    )?;

    let handle = device.open().map_err(|e| Error::Open {
        vid,
        pid,
        source: e.into(),
    })?;
    info!(
        vid = format_args!("0x{:04X}", vid),
        pid = format_args!("0x{:04X}", pid),
        bus = device.bus_number(),
        address = device.address(),
        "Opened device"
    );
    Ok(UsbHandle { handle, vid, pid })
}

/// An open libusb device handle. Closed when dropped.
pub struct UsbHandle {
    handle: DeviceHandle<Context>,
    vid: u16,
    pid: u16,
}

impl std::fmt::Debug for UsbHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsbHandle")
            .field("vid", &format_args!("0x{:04X}", self.vid))
            .field("pid", &format_args!("0x{:04X}", self.pid))
            .finish()
    }
}

impl ControlTransport for UsbHandle {
    fn detach_kernel_driver(&mut self, interface: u8) -> std::result::Result<(), TransportError> {
        match self.handle.set_auto_detach_kernel_driver(true) {
            Ok(()) => {
                debug!(interface, "Enabled automatic kernel driver detach");
                Ok(())
            }
            // Platforms without auto-detach: detach by hand if a driver is bound.
            Err(rusb::Error::NotSupported) => match self.handle.kernel_driver_active(interface) {
                Ok(true) => {
                    debug!(interface, "Detaching kernel driver");
                    self.handle.detach_kernel_driver(interface)?;
                    Ok(())
                }
                Ok(false) => Ok(()),
                Err(rusb::Error::NotSupported) => Ok(()),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    fn claim_interface(&mut self, interface: u8) -> std::result::Result<(), TransportError> {
        self.handle.claim_interface(interface)?;
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> std::result::Result<(), TransportError> {
        self.handle.release_interface(interface)?;
        Ok(())
    }

    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> std::result::Result<usize, TransportError> {
        Ok(self
            .handle
            .read_control(request_type, request, value, index, buf, timeout)?)
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> std::result::Result<usize, TransportError> {
        Ok(self
            .handle
            .write_control(request_type, request, value, index, buf, timeout)?)
    }
}
