//! Bluetooth LE printer adapter (GATT write characteristic)
//!
//! BLE enforces small per-write payloads, so compiled tickets go through the
//! chunking engine with an inter-chunk delay. The adapter owns the link
//! state machine:
//!
//! ```text
//! disconnected -> connecting -> connected -> disconnected
//!                                   |              ^
//!                                   v              |
//!                              reconnecting -------+ (on repeated failure)
//!                                   |
//!                                   +--> connected (resume from failed chunk)
//! ```
//!
//! `reconnecting` is entered only when `auto_reconnect` is enabled and the
//! drop happened mid-job; the transmission then resumes from the first
//! unacknowledged chunk rather than restarting the ticket. While the link
//! is idle a keep-alive heartbeat (DLE EOT 1 status poll) holds the GATT
//! session open; beats are skipped whenever a send holds the link.

use super::chunk::ChunkEngine;
use super::{BleLink, LinkKind, PaperLevel, PrinterHealth, SendReport, Transport, TransportTuning};
use crate::error::{PrintError, PrintResult};
use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// DLE EOT 1 - harmless status poll used as the keep-alive beat
const KEEP_ALIVE_BEAT: [u8; 3] = [0x10, 0x04, 0x01];

/// Standard GATT battery level characteristic (0x2A19)
const BATTERY_LEVEL_UUID: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// Bound on mid-job reconnection attempts before the job fails
const MAX_RECONNECTS: u32 = 2;

/// Poll step while waiting for a scanned peripheral to appear
const SCAN_POLL: std::time::Duration = std::time::Duration::from_millis(500);

/// Connection lifecycle; transitions are owned by [`BleTransport`] alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Live GATT handle; exactly one per adapter instance
struct GattLink {
    peripheral: Peripheral,
    write_char: Characteristic,
    write_type: WriteType,
}

pub struct BleTransport {
    link: BleLink,
    tuning: TransportTuning,
    engine: ChunkEngine,
    adapter: Option<Adapter>,
    /// Shared with the keep-alive task; a send holds this lock for the
    /// whole transmission so heartbeats never interleave with job bytes.
    gatt: Arc<Mutex<Option<GattLink>>>,
    state: LinkState,
    keepalive: Option<tokio::task::JoinHandle<()>>,
}

impl BleTransport {
    pub fn new(link: BleLink, tuning: TransportTuning) -> Self {
        let engine = ChunkEngine::new(tuning.chunk.clone());
        Self {
            link,
            tuning,
            engine,
            adapter: None,
            gatt: Arc::new(Mutex::new(None)),
            state: LinkState::Disconnected,
            keepalive: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    async fn adapter(&mut self) -> PrintResult<&Adapter> {
        if self.adapter.is_none() {
            self.adapter = Some(first_adapter().await?);
        }
        Ok(self.adapter.as_ref().unwrap())
    }

    /// Locate the configured peripheral, scanning if it is not yet cached
    /// by the platform stack.
    async fn find_peripheral(&mut self) -> PrintResult<Peripheral> {
        let address = self.link.address.clone();
        let service = self.link.service_uuid;
        let scan_duration = self.tuning.scan_duration;
        let adapter = self.adapter().await?.clone();

        if let Some(p) = peripheral_by_address(&adapter, &address).await {
            return Ok(p);
        }

        adapter
            .start_scan(ScanFilter {
                services: vec![service],
            })
            .await
            .map_err(|e| PrintError::Connection(format!("scan start failed: {}", e)))?;

        let deadline = Instant::now() + scan_duration;
        let found = loop {
            tokio::time::sleep(SCAN_POLL).await;
            if let Some(p) = peripheral_by_address(&adapter, &address).await {
                break Some(p);
            }
            if Instant::now() >= deadline {
                break None;
            }
        };

        let _ = adapter.stop_scan().await;

        found.ok_or_else(|| {
            PrintError::Connection(format!("printer {} not found in scan", address))
        })
    }

    /// Connect the peripheral and resolve the write characteristic
    async fn establish(&mut self, peripheral: &Peripheral) -> PrintResult<GattLink> {
        tokio::time::timeout(self.tuning.connect_timeout, peripheral.connect())
            .await
            .map_err(|_| PrintError::Timeout("gatt connect timeout".to_string()))?
            .map_err(|e| PrintError::Connection(format!("gatt connect failed: {}", e)))?;

        peripheral
            .discover_services()
            .await
            .map_err(|e| PrintError::Connection(format!("service discovery failed: {}", e)))?;

        let write_char = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == self.link.write_characteristic)
            .ok_or_else(|| {
                PrintError::Connection(format!(
                    "write characteristic {} not found",
                    self.link.write_characteristic
                ))
            })?;

        // Acknowledged writes give a deterministic resume point after a
        // reconnect; fall back to unacknowledged only when the printer
        // does not offer them.
        let write_type = if write_char
            .properties
            .contains(btleplug::api::CharPropFlags::WRITE)
        {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        Ok(GattLink {
            peripheral: peripheral.clone(),
            write_char,
            write_type,
        })
    }

    /// Re-establish a dropped link mid-job, reusing the known peripheral
    async fn reestablish(&mut self, slot: &mut Option<GattLink>) -> PrintResult<()> {
        let peripheral = match slot.as_ref() {
            Some(link) => link.peripheral.clone(),
            None => self.find_peripheral().await?,
        };

        let _ = peripheral.disconnect().await;
        let link = self.establish(&peripheral).await?;
        *slot = Some(link);
        Ok(())
    }

    fn spawn_keepalive(&mut self) {
        let gatt = Arc::clone(&self.gatt);
        let interval = self.tuning.keep_alive_interval;
        if interval.is_zero() {
            return;
        }

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                // A send in progress holds the lock; skip the beat rather
                // than contend for the link.
                let Ok(guard) = gatt.try_lock() else {
                    continue;
                };
                let Some(link) = guard.as_ref() else {
                    break;
                };
                if let Err(e) = link
                    .peripheral
                    .write(&link.write_char, &KEEP_ALIVE_BEAT, link.write_type)
                    .await
                {
                    debug!(error = %e, "keep-alive beat failed");
                }
            }
        });
        self.keepalive = Some(handle);
    }

    fn stop_keepalive(&mut self) {
        if let Some(handle) = self.keepalive.take() {
            handle.abort();
        }
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        self.stop_keepalive();
    }
}

#[async_trait]
impl Transport for BleTransport {
    fn kind(&self) -> LinkKind {
        LinkKind::Bluetooth
    }

    fn describe(&self) -> String {
        format!("bluetooth {}", self.link.address)
    }

    fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    #[instrument(skip(self), fields(target = %self.describe()))]
    async fn connect(&mut self) -> PrintResult<()> {
        if self.state == LinkState::Connected {
            return Ok(());
        }

        self.state = LinkState::Connecting;
        let result = async {
            let peripheral = self.find_peripheral().await?;
            self.establish(&peripheral).await
        }
        .await;

        match result {
            Ok(link) => {
                *self.gatt.lock().await = Some(link);
                self.state = LinkState::Connected;
                self.spawn_keepalive();
                info!("connected");
                Ok(())
            }
            Err(e) => {
                self.state = LinkState::Disconnected;
                Err(e)
            }
        }
    }

    #[instrument(skip(self), fields(target = %self.describe()))]
    async fn disconnect(&mut self) -> PrintResult<()> {
        self.stop_keepalive();
        if let Some(link) = self.gatt.lock().await.take() {
            let _ = link.peripheral.disconnect().await;
        }
        self.state = LinkState::Disconnected;
        Ok(())
    }

    #[instrument(skip(self, data), fields(target = %self.describe(), data_len = data.len()))]
    async fn send(&mut self, data: &[u8]) -> PrintResult<SendReport> {
        if self.state != LinkState::Connected {
            return Err(PrintError::Connection("not connected".to_string()));
        }

        // Owned guard: the keep-alive task skips beats while we hold it.
        let mut guard = Arc::clone(&self.gatt).lock_owned().await;

        let started = Instant::now();
        let total = self.engine.total_chunks(data.len());
        let write_timeout = self.tuning.write_timeout;
        let mut start_index = 0usize;
        let mut resumed_from: Option<usize> = None;
        let mut reconnects = 0u32;

        loop {
            let link = guard
                .as_ref()
                .ok_or_else(|| PrintError::Connection("link torn down".to_string()))?;

            let peripheral = link.peripheral.clone();
            let write_char = link.write_char.clone();
            let write_type = link.write_type;

            let outcome = self
                .engine
                .transmit(data, start_index, move |index, chunk| {
                    let peripheral = peripheral.clone();
                    let write_char = write_char.clone();
                    async move {
                        tokio::time::timeout(
                            write_timeout,
                            peripheral.write(&write_char, &chunk, write_type),
                        )
                        .await
                        .map_err(|_| {
                            PrintError::Timeout(format!("chunk {} write timeout", index + 1))
                        })?
                        .map_err(|e| {
                            PrintError::Transmission(format!(
                                "chunk {} write failed: {}",
                                index + 1,
                                e
                            ))
                        })
                    }
                })
                .await;

            match outcome {
                Ok(_) => break,
                Err(failure) => {
                    let can_resume = self.tuning.auto_reconnect
                        && reconnects < MAX_RECONNECTS
                        && failure.error.is_recoverable();

                    if !can_resume {
                        self.state = LinkState::Disconnected;
                        *guard = None;
                        return Err(failure.error);
                    }

                    warn!(
                        chunk = failure.index + 1,
                        total = failure.total,
                        "link dropped mid-job, reconnecting"
                    );
                    self.state = LinkState::Reconnecting;

                    match self.reestablish(&mut guard).await {
                        Ok(()) => {
                            self.state = LinkState::Connected;
                            resumed_from.get_or_insert(failure.index);
                            start_index = failure.index;
                            reconnects += 1;
                        }
                        Err(e) => {
                            self.state = LinkState::Disconnected;
                            *guard = None;
                            return Err(e);
                        }
                    }
                }
            }
        }

        info!(
            bytes = data.len(),
            chunks = total,
            resumed = ?resumed_from,
            "print data sent"
        );
        Ok(SendReport {
            bytes_sent: data.len(),
            chunks_sent: total,
            resumed_from_chunk: resumed_from,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    #[instrument(skip(self), fields(target = %self.describe()))]
    async fn check_status(&mut self) -> PrintResult<PrinterHealth> {
        let guard = self.gatt.lock().await;
        let Some(link) = guard.as_ref() else {
            return Ok(PrinterHealth::offline("not connected"));
        };

        let connected = link.peripheral.is_connected().await.unwrap_or(false);
        if !connected {
            return Ok(PrinterHealth::offline("gatt session lost"));
        }

        let rssi = link
            .peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|p| p.rssi);

        // Battery level is a standard characteristic on battery-powered
        // mobile printers; absent on mains-powered ones.
        let battery = match link
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == BATTERY_LEVEL_UUID)
        {
            Some(c) => link
                .peripheral
                .read(&c)
                .await
                .ok()
                .and_then(|v| v.first().copied()),
            None => None,
        };

        let mut health = PrinterHealth::online(PaperLevel::Unknown);
        health.rssi = rssi;
        health.battery_percent = battery;
        Ok(health)
    }
}

/// A BLE peripheral that advertised the printer service during a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredBlePrinter {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
}

async fn first_adapter() -> PrintResult<Adapter> {
    let manager = Manager::new()
        .await
        .map_err(|e| PrintError::Connection(format!("bluetooth manager init failed: {}", e)))?;

    let adapters = manager
        .adapters()
        .await
        .map_err(|e| PrintError::Connection(format!("bluetooth adapter list failed: {}", e)))?;

    adapters
        .into_iter()
        .next()
        .ok_or_else(|| PrintError::Connection("no bluetooth adapter found".to_string()))
}

async fn peripheral_by_address(adapter: &Adapter, address: &str) -> Option<Peripheral> {
    let peripherals = adapter.peripherals().await.ok()?;
    for p in peripherals {
        if p.id().to_string().eq_ignore_ascii_case(address) {
            return Some(p);
        }
        if let Ok(Some(props)) = p.properties().await {
            if props.address.to_string().eq_ignore_ascii_case(address) {
                return Some(p);
            }
        }
    }
    None
}

/// Scan for peripherals advertising the given printer service.
///
/// Discovery runs under its own `scan_duration` bound, separate from any
/// per-job send timeout.
#[instrument(skip(service_uuid))]
pub async fn scan_for_printers(
    service_uuid: Option<Uuid>,
    scan_duration: std::time::Duration,
) -> PrintResult<Vec<DiscoveredBlePrinter>> {
    let adapter = first_adapter().await?;

    let filter = match service_uuid {
        Some(uuid) => ScanFilter {
            services: vec![uuid],
        },
        None => ScanFilter::default(),
    };

    adapter
        .start_scan(filter)
        .await
        .map_err(|e| PrintError::Connection(format!("scan start failed: {}", e)))?;

    tokio::time::sleep(scan_duration).await;

    let mut found = Vec::new();
    if let Ok(peripherals) = adapter.peripherals().await {
        for p in peripherals {
            let Ok(Some(props)) = p.properties().await else {
                continue;
            };
            let matches = match service_uuid {
                Some(uuid) => props.services.contains(&uuid),
                None => true,
            };
            if matches {
                found.push(DiscoveredBlePrinter {
                    name: props.local_name.unwrap_or_default(),
                    address: p.id().to_string(),
                    rssi: props.rssi,
                });
            }
        }
    }

    let _ = adapter.stop_scan().await;
    info!(count = found.len(), "bluetooth scan complete");
    Ok(found)
}

/// Pair with a printer: locate it, open a GATT session, verify the write
/// characteristic, then release the link.
///
/// Longer-running than a job send on purpose; bounded by `scan_duration`
/// plus one connect timeout.
#[instrument(skip(tuning))]
pub async fn pair_device(link: &BleLink, tuning: &TransportTuning) -> PrintResult<()> {
    let mut transport = BleTransport::new(link.clone(), tuning.clone());
    transport.connect().await.map_err(|e| match e {
        // Everything that goes wrong while bonding surfaces as a pairing
        // failure to the caller.
        PrintError::Connection(msg) | PrintError::Timeout(msg) => PrintError::Pairing(msg),
        other => other,
    })?;
    transport.disconnect().await?;
    info!(address = %link.address, "paired");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> BleLink {
        BleLink {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            service_uuid: Uuid::parse_str("000018f0-0000-1000-8000-00805f9b34fb").unwrap(),
            write_characteristic: Uuid::parse_str("00002af1-0000-1000-8000-00805f9b34fb").unwrap(),
        }
    }

    #[test]
    fn test_initial_state() {
        let t = BleTransport::new(link(), TransportTuning::default());
        assert_eq!(t.state(), LinkState::Disconnected);
        assert!(!t.is_connected());
        assert_eq!(t.describe(), "bluetooth AA:BB:CC:DD:EE:FF");
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let mut t = BleTransport::new(link(), TransportTuning::default());
        let err = t.send(&[0x1B, 0x40]).await.unwrap_err();
        assert!(matches!(err, PrintError::Connection(_)));
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected_is_noop() {
        let mut t = BleTransport::new(link(), TransportTuning::default());
        t.disconnect().await.unwrap();
        assert_eq!(t.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_status_without_link_reports_offline() {
        let mut t = BleTransport::new(link(), TransportTuning::default());
        let health = t.check_status().await.unwrap();
        assert!(!health.online);
    }
}
