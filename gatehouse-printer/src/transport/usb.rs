//! USB printer adapter (bulk OUT endpoint)
//!
//! Speaks to the printer through `rusb`. The libusb calls are synchronous,
//! so writes run on the blocking pool, the same way driver printing does in
//! desktop POS setups. Access errors surface as `permissions` (udev rules /
//! group membership on Linux), not as connection failures.

use super::{LinkKind, PaperLevel, PrinterHealth, SendReport, Transport, TransportTuning, UsbLink};
use crate::error::{PrintError, PrintResult};
use async_trait::async_trait;
use rusb::{Context, DeviceHandle, UsbContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Known thermal printer vendor ids, used by discovery
const VENDOR_IDS: &[(u16, &str)] = &[
    (0x04b8, "Epson"),
    (0x0519, "Star Micronics"),
    (0x04f9, "Brother"),
    (0x1d90, "Citizen"),
    (0x0fe6, "ICS Advent"),
    (0x154f, "Wincor Nixdorf"),
];

/// Upper bound on one bulk transfer; larger buffers go out as a small
/// number of OS-level writes.
const SEGMENT_SIZE: usize = 16 * 1024;

fn map_usb_error(e: rusb::Error, context: &str) -> PrintError {
    match e {
        rusb::Error::Access => PrintError::Permissions(format!("{}: {}", context, e)),
        rusb::Error::Timeout => PrintError::Timeout(format!("{}: {}", context, e)),
        rusb::Error::NoDevice | rusb::Error::NotFound => {
            PrintError::Connection(format!("{}: {}", context, e))
        }
        other => PrintError::Transmission(format!("{}: {}", context, other)),
    }
}

pub struct UsbTransport {
    link: UsbLink,
    tuning: TransportTuning,
    handle: Option<Arc<DeviceHandle<Context>>>,
}

impl UsbTransport {
    pub fn new(link: UsbLink, tuning: TransportTuning) -> Self {
        Self {
            link,
            tuning,
            handle: None,
        }
    }

    fn open_device(&self) -> PrintResult<DeviceHandle<Context>> {
        let context =
            Context::new().map_err(|e| map_usb_error(e, "usb context init failed"))?;

        let devices = context
            .devices()
            .map_err(|e| map_usb_error(e, "usb enumeration failed"))?;

        for device in devices.iter() {
            let desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(_) => continue,
            };
            if desc.vendor_id() != self.link.vendor_id
                || desc.product_id() != self.link.product_id
            {
                continue;
            }

            let mut handle = device
                .open()
                .map_err(|e| map_usb_error(e, "usb open failed"))?;

            // The kernel usblp driver claims printers by default on Linux.
            if handle
                .kernel_driver_active(self.link.interface)
                .unwrap_or(false)
            {
                if let Err(e) = handle.detach_kernel_driver(self.link.interface) {
                    warn!(error = %e, "kernel driver detach failed");
                }
            }

            handle
                .claim_interface(self.link.interface)
                .map_err(|e| map_usb_error(e, "usb claim failed"))?;

            return Ok(handle);
        }

        Err(PrintError::Connection(format!(
            "usb device {:04x}:{:04x} not found",
            self.link.vendor_id, self.link.product_id
        )))
    }

    /// Whether the configured device currently enumerates on the bus
    fn device_present(&self) -> bool {
        let Ok(context) = Context::new() else {
            return false;
        };
        let Ok(devices) = context.devices() else {
            return false;
        };
        devices.iter().any(|d| {
            d.device_descriptor()
                .map(|desc| {
                    desc.vendor_id() == self.link.vendor_id
                        && desc.product_id() == self.link.product_id
                })
                .unwrap_or(false)
        })
    }
}

#[async_trait]
impl Transport for UsbTransport {
    fn kind(&self) -> LinkKind {
        LinkKind::Usb
    }

    fn describe(&self) -> String {
        format!(
            "usb {:04x}:{:04x}",
            self.link.vendor_id, self.link.product_id
        )
    }

    fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    #[instrument(skip(self), fields(target = %self.describe()))]
    async fn connect(&mut self) -> PrintResult<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let this = UsbTransport {
            link: self.link.clone(),
            tuning: self.tuning.clone(),
            handle: None,
        };
        let handle = tokio::time::timeout(
            self.tuning.connect_timeout,
            tokio::task::spawn_blocking(move || this.open_device()),
        )
        .await
        .map_err(|_| PrintError::Timeout("usb open timeout".to_string()))?
        .map_err(|e| PrintError::Connection(format!("usb open task failed: {}", e)))??;

        info!("connected");
        self.handle = Some(Arc::new(handle));
        Ok(())
    }

    async fn disconnect(&mut self) -> PrintResult<()> {
        // Dropping the handle releases the claimed interface.
        self.handle = None;
        Ok(())
    }

    #[instrument(skip(self, data), fields(target = %self.describe(), data_len = data.len()))]
    async fn send(&mut self, data: &[u8]) -> PrintResult<SendReport> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| PrintError::Connection("not connected".to_string()))?
            .clone();

        let endpoint = self.link.endpoint;
        let write_timeout = self.tuning.write_timeout;
        let data = data.to_vec();
        let total = data.len();
        let started = Instant::now();

        tokio::task::spawn_blocking(move || -> PrintResult<()> {
            for segment in data.chunks(SEGMENT_SIZE) {
                let mut offset = 0;
                while offset < segment.len() {
                    let written = handle
                        .write_bulk(endpoint, &segment[offset..], write_timeout)
                        .map_err(|e| map_usb_error(e, "bulk write failed"))?;
                    if written == 0 {
                        return Err(PrintError::Transmission(
                            "bulk write made no progress".to_string(),
                        ));
                    }
                    offset += written;
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| PrintError::Transmission(format!("usb write task failed: {}", e)))??;

        info!(bytes = total, "print data sent");
        Ok(SendReport::whole_buffer(total, started.elapsed()))
    }

    #[instrument(skip(self), fields(target = %self.describe()))]
    async fn check_status(&mut self) -> PrintResult<PrinterHealth> {
        let this = UsbTransport {
            link: self.link.clone(),
            tuning: self.tuning.clone(),
            handle: None,
        };
        let present = tokio::task::spawn_blocking(move || this.device_present())
            .await
            .unwrap_or(false);

        if present {
            // Bulk-only printers expose no paper sensor without a vendor
            // IN endpoint protocol.
            Ok(PrinterHealth::online(PaperLevel::Unknown))
        } else {
            Ok(PrinterHealth::offline(format!(
                "device {:04x}:{:04x} not on bus",
                self.link.vendor_id, self.link.product_id
            )))
        }
    }
}

/// A USB device that looks like a thermal printer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredUsbPrinter {
    pub vendor_id: u16,
    pub product_id: u16,
    pub vendor: String,
    pub product: Option<String>,
    pub bus: u8,
    pub address: u8,
}

/// Enumerate USB devices whose vendor id matches a known thermal printer
/// manufacturer.
#[instrument]
pub fn discover_printers() -> PrintResult<Vec<DiscoveredUsbPrinter>> {
    let context = Context::new().map_err(|e| map_usb_error(e, "usb context init failed"))?;
    let devices = context
        .devices()
        .map_err(|e| map_usb_error(e, "usb enumeration failed"))?;

    let mut found = Vec::new();
    for device in devices.iter() {
        let desc = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };

        let Some((_, vendor)) = VENDOR_IDS.iter().find(|(vid, _)| *vid == desc.vendor_id())
        else {
            continue;
        };

        // Product string is best-effort; opening the device may need
        // permissions discovery should not require.
        let product = device.open().ok().and_then(|handle| {
            let timeout = std::time::Duration::from_secs(1);
            let languages = handle.read_languages(timeout).ok()?;
            let language = languages.first()?;
            handle.read_product_string(*language, &desc, timeout).ok()
        });

        found.push(DiscoveredUsbPrinter {
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            vendor: vendor.to_string(),
            product,
            bus: device.bus_number(),
            address: device.address(),
        });
    }

    info!(count = found.len(), "usb discovery complete");
    Ok(found)
}
