//! Transport dispatch
//!
//! The queue manager reaches hardware through a factory so tests can swap
//! in recording transports. One factory call yields one owned connection;
//! the manager's per-profile lock guarantees a single live connection per
//! physical printer.

use crate::types::PrinterProfile;
use gatehouse_printer::transport::{Transport, TransportTuning, open_transport};
use gatehouse_printer::{PrintResult, SendReport};

/// Opens a transport for a profile's link configuration
pub trait TransportFactory: Send + Sync {
    fn open(&self, profile: &PrinterProfile) -> Box<dyn Transport>;
}

/// Production factory backed by the real USB/network/BLE adapters
pub struct HardwareTransportFactory {
    tuning: TransportTuning,
}

impl HardwareTransportFactory {
    pub fn new(tuning: TransportTuning) -> Self {
        Self { tuning }
    }
}

impl TransportFactory for HardwareTransportFactory {
    fn open(&self, profile: &PrinterProfile) -> Box<dyn Transport> {
        open_transport(&profile.link, &self.tuning)
    }
}

/// Connect, send the compiled buffer `copies` times, disconnect.
///
/// Copies go out back-to-back inside one connection window; each copy
/// carries its own cut/feed trailer from the compile step. Teardown runs
/// even when a send fails so no adapter leaks a half-open connection.
pub async fn transmit(
    transport: &mut Box<dyn Transport>,
    data: &[u8],
    copies: u8,
) -> PrintResult<SendReport> {
    transport.connect().await?;

    let mut result: PrintResult<SendReport> = Err(gatehouse_printer::PrintError::Validation(
        "zero copies requested".to_string(),
    ));

    for copy in 1..=copies.max(1) {
        result = transport.send(data).await;
        if let Err(ref e) = result {
            tracing::warn!(copy, error = %e, "copy transmission failed");
            break;
        }
    }

    let _ = transport.disconnect().await;
    result
}
