//! # gatehouse-printer
//!
//! ESC/POS thermal printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - Typed ESC/POS command streams, compiled against printer capabilities
//! - Windows-1252 encoding for Western-European receipt text
//! - Network printing (TCP port 9100)
//! - USB printing (bulk OUT endpoint via rusb)
//! - Bluetooth LE printing (GATT writes with chunking and keep-alive)
//! - Device discovery (USB vendor table, BLE service scan)
//!
//! Business logic (WHAT to print) stays in application code: ticket and
//! receipt composition lives in `gatehouse-spool`.
//!
//! ## Example
//!
//! ```ignore
//! use gatehouse_printer::escpos::{Alignment, Capabilities, CommandStream, CutMode};
//! use gatehouse_printer::transport::{open_transport, LinkConfig, NetworkLink, TransportTuning};
//!
//! // Compose and compile a ticket
//! let mut stream = CommandStream::new();
//! stream
//!     .init()
//!     .align(Alignment::Center)
//!     .size(2, 2)
//!     .line("GATEHOUSE PARKING")
//!     .size(1, 1)
//!     .align(Alignment::Left)
//!     .pair_line("PLATE", "AB-123-CD")
//!     .cut(CutMode::Full);
//! let ticket = stream.compile(&Capabilities::default())?;
//!
//! // Send it over the wire
//! let link = LinkConfig::Network(NetworkLink { host: "192.168.1.100".into(), port: 9100 });
//! let mut transport = open_transport(&link, &TransportTuning::default());
//! transport.connect().await?;
//! transport.send(ticket.bytes()).await?;
//! transport.disconnect().await?;
//! ```

pub mod encoding;
pub mod error;
pub mod escpos;
pub mod transport;

// Re-exports
pub use encoding::{column_width, convert_to_cp1252, pad_columns, truncate_columns};
pub use error::{ErrorKind, PrintError, PrintResult};
pub use escpos::{
    Alignment, BarcodeKind, Capabilities, CommandStream, CompiledTicket, CutMode, RasterBitmap,
    TicketOp,
};
pub use transport::{
    BleLink, BleTransport, ChunkEngine, ChunkTuning, DiscoveredBlePrinter, DiscoveredUsbPrinter,
    LinkConfig, LinkKind, NetworkLink, NetworkTransport, PaperLevel, PrinterHealth, SendReport,
    Transport, TransportTuning, UsbLink, UsbTransport, open_transport, test_connection,
};
