//! Transport adapters for sending ESC/POS data
//!
//! One trait, three physical link types:
//! - Network printers (raw TCP, port 9100)
//! - USB printers (bulk OUT endpoint)
//! - Bluetooth Low Energy printers (GATT write characteristic, chunked)
//!
//! A [`Connection`] is owned by exactly one adapter instance and torn down
//! explicitly on `disconnect()` or drop. Adapters translate every platform
//! error into the [`crate::error::PrintError`] taxonomy at this boundary.

pub mod bluetooth;
pub mod chunk;
pub mod network;
pub mod usb;

pub use bluetooth::{BleTransport, DiscoveredBlePrinter, pair_device, scan_for_printers};
pub use chunk::{ChunkEngine, ChunkFailure, ChunkTuning, split};
pub use network::NetworkTransport;
pub use usb::{DiscoveredUsbPrinter, UsbTransport, discover_printers};

use crate::error::PrintResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Physical link type of a printer profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Usb,
    Network,
    Bluetooth,
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkKind::Usb => write!(f, "usb"),
            LinkKind::Network => write!(f, "network"),
            LinkKind::Bluetooth => write!(f, "bluetooth"),
        }
    }
}

/// USB link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbLink {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Bulk OUT endpoint address
    #[serde(default = "default_usb_endpoint")]
    pub endpoint: u8,
    #[serde(default)]
    pub interface: u8,
}

fn default_usb_endpoint() -> u8 {
    0x01
}

/// Network link settings (raw TCP printing)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkLink {
    pub host: String,
    #[serde(default = "default_network_port")]
    pub port: u16,
}

fn default_network_port() -> u16 {
    9100
}

/// Bluetooth LE link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleLink {
    /// Platform device identifier (MAC address on Linux, UUID on macOS)
    pub address: String,
    /// GATT service advertising the printer
    pub service_uuid: Uuid,
    /// Write characteristic that accepts ESC/POS bytes
    pub write_characteristic: Uuid,
}

/// Kind-specific connection settings, the tagged variant dispatched through
/// the single [`Transport`] interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkConfig {
    Usb(UsbLink),
    Network(NetworkLink),
    Bluetooth(BleLink),
}

impl LinkConfig {
    pub fn kind(&self) -> LinkKind {
        match self {
            LinkConfig::Usb(_) => LinkKind::Usb,
            LinkConfig::Network(_) => LinkKind::Network,
            LinkConfig::Bluetooth(_) => LinkKind::Bluetooth,
        }
    }
}

/// Timeouts and link tuning shared by all adapters
#[derive(Debug, Clone)]
pub struct TransportTuning {
    /// Bound on connection establishment
    pub connect_timeout: Duration,
    /// Bound on one write operation
    pub write_timeout: Duration,
    /// Bound on one status probe
    pub status_timeout: Duration,
    /// BLE chunking parameters
    pub chunk: ChunkTuning,
    /// Heartbeat period while idle-connected over BLE
    pub keep_alive_interval: Duration,
    /// Re-establish a dropped BLE link mid-job
    pub auto_reconnect: bool,
    /// Bound on discovery/pairing scans, distinct from send timeouts
    pub scan_duration: Duration,
}

impl Default for TransportTuning {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            status_timeout: Duration::from_millis(800),
            chunk: ChunkTuning::default(),
            keep_alive_interval: Duration::from_secs(15),
            auto_reconnect: true,
            scan_duration: Duration::from_secs(10),
        }
    }
}

/// Paper sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperLevel {
    Ok,
    Low,
    Empty,
    Unknown,
}

/// Outcome of one health check; never mutated after construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterHealth {
    pub online: bool,
    pub paper: PaperLevel,
    pub battery_percent: Option<u8>,
    pub rssi: Option<i16>,
    pub checked_at: DateTime<Utc>,
    pub detail: Option<String>,
}

impl PrinterHealth {
    pub fn online(paper: PaperLevel) -> Self {
        Self {
            online: true,
            paper,
            battery_percent: None,
            rssi: None,
            checked_at: Utc::now(),
            detail: None,
        }
    }

    pub fn offline(detail: impl Into<String>) -> Self {
        Self {
            online: false,
            paper: PaperLevel::Unknown,
            battery_percent: None,
            rssi: None,
            checked_at: Utc::now(),
            detail: Some(detail.into()),
        }
    }

    /// Whether a job may be dispatched to this printer right now
    pub fn is_printable(&self) -> bool {
        self.online && self.paper != PaperLevel::Empty
    }
}

/// Outcome of one transmission; never mutated after construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReport {
    pub bytes_sent: usize,
    pub chunks_sent: usize,
    /// Set when a BLE transmission recovered from a link drop and resumed
    pub resumed_from_chunk: Option<usize>,
    pub elapsed_ms: u64,
}

impl SendReport {
    pub fn whole_buffer(bytes_sent: usize, elapsed: Duration) -> Self {
        Self {
            bytes_sent,
            chunks_sent: 1,
            resumed_from_chunk: None,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Capability interface every adapter implements
///
/// `send` transmits one complete, already-compiled buffer. Ordering across
/// jobs and per-printer serialization are the queue manager's concern, not
/// the adapter's.
#[async_trait]
pub trait Transport: Send {
    fn kind(&self) -> LinkKind;

    /// Human-readable target description for logs
    fn describe(&self) -> String;

    fn is_connected(&self) -> bool;

    async fn connect(&mut self) -> PrintResult<()>;

    async fn disconnect(&mut self) -> PrintResult<()>;

    async fn send(&mut self, data: &[u8]) -> PrintResult<SendReport>;

    async fn check_status(&mut self) -> PrintResult<PrinterHealth>;
}

/// Construct the adapter for a link configuration
pub fn open_transport(link: &LinkConfig, tuning: &TransportTuning) -> Box<dyn Transport> {
    match link {
        LinkConfig::Usb(usb) => Box::new(UsbTransport::new(usb.clone(), tuning.clone())),
        LinkConfig::Network(net) => Box::new(NetworkTransport::new(net.clone(), tuning.clone())),
        LinkConfig::Bluetooth(ble) => Box::new(BleTransport::new(ble.clone(), tuning.clone())),
    }
}

/// Connect, probe status, disconnect - no bytes printed.
///
/// Used by configuration collaborators to validate a profile before saving.
pub async fn test_connection(
    link: &LinkConfig,
    tuning: &TransportTuning,
) -> PrintResult<PrinterHealth> {
    let mut transport = open_transport(link, tuning);
    transport.connect().await?;
    let health = transport.check_status().await;
    let _ = transport.disconnect().await;
    health
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_config_tagging() {
        let json = serde_json::json!({
            "kind": "network",
            "host": "192.168.1.50",
        });
        let link: LinkConfig = serde_json::from_value(json).unwrap();
        assert_eq!(link.kind(), LinkKind::Network);
        match link {
            LinkConfig::Network(net) => assert_eq!(net.port, 9100),
            other => panic!("unexpected link: {:?}", other),
        }
    }

    #[test]
    fn test_usb_link_defaults() {
        let json = serde_json::json!({
            "kind": "usb",
            "vendor_id": 0x04b8,
            "product_id": 0x0202,
        });
        let link: LinkConfig = serde_json::from_value(json).unwrap();
        match link {
            LinkConfig::Usb(usb) => {
                assert_eq!(usb.endpoint, 0x01);
                assert_eq!(usb.interface, 0);
            }
            other => panic!("unexpected link: {:?}", other),
        }
    }

    #[test]
    fn test_health_printable() {
        assert!(PrinterHealth::online(PaperLevel::Ok).is_printable());
        assert!(PrinterHealth::online(PaperLevel::Low).is_printable());
        assert!(!PrinterHealth::online(PaperLevel::Empty).is_printable());
        assert!(!PrinterHealth::offline("unreachable").is_printable());
    }
}
