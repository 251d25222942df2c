//! Network printer adapter (raw TCP, port 9100)
//!
//! Most thermal printers accept raw ESC/POS bytes on TCP port 9100. The
//! whole compiled buffer goes out as a single write bounded by the
//! configured timeout.

use super::{LinkKind, NetworkLink, PaperLevel, PrinterHealth, SendReport, Transport, TransportTuning};
use crate::error::{PrintError, PrintResult};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

/// DLE EOT 4 - real-time paper sensor status request
const PAPER_STATUS_REQUEST: [u8; 3] = [0x10, 0x04, 0x04];

pub struct NetworkTransport {
    link: NetworkLink,
    tuning: TransportTuning,
    stream: Option<TcpStream>,
}

impl NetworkTransport {
    pub fn new(link: NetworkLink, tuning: TransportTuning) -> Self {
        Self {
            link,
            tuning,
            stream: None,
        }
    }

    fn addr(&self) -> PrintResult<SocketAddr> {
        let addr_str = format!("{}:{}", self.link.host, self.link.port);
        addr_str
            .parse()
            .map_err(|_| PrintError::Validation(format!("invalid address: {}", addr_str)))
    }

    /// Decode a DLE EOT 4 response byte into a paper level
    fn parse_paper_status(status: u8) -> PaperLevel {
        // bits 5-6: paper end sensor, bits 2-3: near-end sensor
        if status & 0x60 != 0 {
            PaperLevel::Empty
        } else if status & 0x0C != 0 {
            PaperLevel::Low
        } else {
            PaperLevel::Ok
        }
    }
}

#[async_trait]
impl Transport for NetworkTransport {
    fn kind(&self) -> LinkKind {
        LinkKind::Network
    }

    fn describe(&self) -> String {
        format!("network {}:{}", self.link.host, self.link.port)
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    #[instrument(skip(self), fields(target = %self.describe()))]
    async fn connect(&mut self) -> PrintResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addr = self.addr()?;
        let stream = tokio::time::timeout(self.tuning.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| PrintError::Timeout(format!("connection timeout: {}", addr)))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", addr, e)))?;

        info!("connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> PrintResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    #[instrument(skip(self, data), fields(target = %self.describe(), data_len = data.len()))]
    async fn send(&mut self, data: &[u8]) -> PrintResult<SendReport> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| PrintError::Connection("not connected".to_string()))?;

        let started = Instant::now();

        tokio::time::timeout(self.tuning.write_timeout, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| PrintError::Timeout(format!("write timeout after {} bytes", data.len())))?
        .map_err(|e| PrintError::Transmission(format!("write failed: {}", e)))?;

        info!(bytes = data.len(), "print data sent");
        Ok(SendReport::whole_buffer(data.len(), started.elapsed()))
    }

    #[instrument(skip(self), fields(target = %self.describe()))]
    async fn check_status(&mut self) -> PrintResult<PrinterHealth> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| PrintError::Connection("not connected".to_string()))?;

        stream
            .write_all(&PAPER_STATUS_REQUEST)
            .await
            .map_err(|e| PrintError::Transmission(format!("status request failed: {}", e)))?;

        let mut byte = [0u8; 1];
        match tokio::time::timeout(self.tuning.status_timeout, stream.read_exact(&mut byte)).await {
            Ok(Ok(_)) => Ok(PrinterHealth::online(Self::parse_paper_status(byte[0]))),
            Ok(Err(e)) => {
                warn!(error = %e, "status read failed");
                Ok(PrinterHealth::offline(format!("status read failed: {}", e)))
            }
            // Many printers never answer DLE EOT over TCP; connected but
            // silent counts as online with unknown paper state.
            Err(_) => Ok(PrinterHealth::online(PaperLevel::Unknown)),
        }
    }
}
