//! ESC/POS command stream
//!
//! Tickets are composed as an ordered sequence of typed primitives which
//! `compile` turns into a single binary buffer for one transmission. The
//! compile step is capability-aware: it consults the target printer's
//! [`Capabilities`] and either downgrades gracefully (cut on a cutterless
//! printer is omitted with a warning) or rejects the build outright
//! (unsupported barcode symbology), before any bytes reach a transport.

use crate::encoding::{column_width, convert_to_cp1252};
use crate::error::{PrintError, PrintResult};
use serde::{Deserialize, Serialize};

/// Text alignment, modal until changed or reset by `Init`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// Paper cut mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutMode {
    Full,
    Partial,
}

/// Barcode symbologies addressable via GS k function B
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeKind {
    UpcA,
    UpcE,
    Ean13,
    Ean8,
    Code39,
    Itf,
    Codabar,
    Code93,
    Code128,
}

impl BarcodeKind {
    /// GS k function B symbology selector
    fn selector(self) -> u8 {
        match self {
            BarcodeKind::UpcA => 65,
            BarcodeKind::UpcE => 66,
            BarcodeKind::Ean13 => 67,
            BarcodeKind::Ean8 => 68,
            BarcodeKind::Code39 => 69,
            BarcodeKind::Itf => 70,
            BarcodeKind::Codabar => 71,
            BarcodeKind::Code93 => 72,
            BarcodeKind::Code128 => 73,
        }
    }
}

impl std::fmt::Display for BarcodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BarcodeKind::UpcA => "UPC-A",
            BarcodeKind::UpcE => "UPC-E",
            BarcodeKind::Ean13 => "EAN-13",
            BarcodeKind::Ean8 => "EAN-8",
            BarcodeKind::Code39 => "CODE39",
            BarcodeKind::Itf => "ITF",
            BarcodeKind::Codabar => "CODABAR",
            BarcodeKind::Code93 => "CODE93",
            BarcodeKind::Code128 => "CODE128",
        };
        f.write_str(s)
    }
}

/// What a printer profile reports it can do
///
/// Stored on the profile by the configuration collaborators; consulted at
/// compile time, never at transmission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    /// Paper width in characters (58mm: 32, 80mm: 48)
    pub columns: usize,
    /// Raster width in dots (58mm: 384, 80mm: 576)
    pub dots_per_line: u32,
    /// Has an automatic cutter
    pub cutter: bool,
    /// Has a cash drawer port
    pub cash_drawer: bool,
    /// Supported barcode symbologies
    pub barcodes: Vec<BarcodeKind>,
    /// Can render QR codes (GS ( k model 2)
    pub qr: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            columns: 48,
            dots_per_line: 576,
            cutter: true,
            cash_drawer: false,
            barcodes: vec![
                BarcodeKind::Ean13,
                BarcodeKind::Ean8,
                BarcodeKind::Code39,
                BarcodeKind::Code128,
            ],
            qr: true,
        }
    }
}

/// 1-bit packed raster image, one byte per 8 horizontal dots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterBitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RasterBitmap {
    /// Build from pre-packed rows. `data` must hold
    /// `ceil(width / 8) * height` bytes.
    pub fn from_packed(width: u32, height: u32, data: Vec<u8>) -> PrintResult<Self> {
        let row_bytes = width.div_ceil(8) as usize;
        if data.len() != row_bytes * height as usize {
            return Err(PrintError::Validation(format!(
                "raster data length {} does not match {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Decode an encoded image (PNG/JPEG), resize to fit `max_width` dots
    /// and threshold to 1-bit monochrome.
    ///
    /// Transparent pixels print white; opaque pixels print black when their
    /// luminance is below 50%.
    #[cfg(feature = "image")]
    pub fn from_image_bytes(bytes: &[u8], max_width: u32) -> Option<Self> {
        use image::GenericImageView;

        let img = match image::load_from_memory(bytes) {
            Ok(i) => i,
            Err(e) => {
                tracing::error!(error = %e, "decode logo failed");
                return None;
            }
        };

        let (w, h) = img.dimensions();
        let (new_w, new_h) = if w > max_width {
            let ratio = max_width as f64 / w as f64;
            (max_width, (h as f64 * ratio) as u32)
        } else {
            (w, h)
        };

        let resized = img.resize(new_w, new_h, image::imageops::FilterType::Nearest);
        let rgba = resized.to_rgba8();
        let row_bytes = new_w.div_ceil(8);

        let mut data = Vec::with_capacity((row_bytes * new_h) as usize);
        for y in 0..new_h {
            for x_byte in 0..row_bytes {
                let mut byte = 0u8;
                for bit in 0..8 {
                    let x = x_byte * 8 + bit;
                    if x < new_w {
                        let pixel = rgba.get_pixel(x, y);
                        let alpha = pixel[3];
                        if alpha >= 128 {
                            let luma = (0.299 * pixel[0] as f32
                                + 0.587 * pixel[1] as f32
                                + 0.114 * pixel[2] as f32) as u8;
                            if luma < 128 {
                                byte |= 1 << (7 - bit);
                            }
                        }
                    }
                }
                data.push(byte);
            }
        }

        Some(Self {
            width: new_w,
            height: new_h,
            data,
        })
    }
}

/// One typed ESC/POS primitive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum TicketOp {
    /// ESC @ - reset to defaults (alignment, size, bold)
    Init,
    /// Raw text, no trailing newline
    Text { content: String },
    /// Text followed by newline
    Line { content: String },
    /// Left and right text on one line, gap filled with spaces
    PairLine { left: String, right: String },
    /// A full line of one repeated character
    Separator { fill: char },
    /// ESC E n
    Bold { enabled: bool },
    /// ESC a n
    Align { alignment: Alignment },
    /// GS ! n - width/height multipliers 1..=8
    Size { width: u8, height: u8 },
    /// ESC d n - print and feed n lines
    Feed { lines: u8 },
    /// GS V m - omitted with a warning when the profile has no cutter
    Cut { mode: CutMode },
    /// GS v 0 raster image
    Image { bitmap: RasterBitmap },
    /// GS k function B - rejected at compile time when unsupported
    Barcode { data: String, kind: BarcodeKind },
    /// GS ( k model 2 - rejected at compile time when unsupported
    QrCode { data: String, size: u8 },
    /// ESC p - cash drawer pulse, omitted with a warning when absent
    DrawerPulse,
}

/// The immutable result of compiling a command stream
#[derive(Debug, Clone)]
pub struct CompiledTicket {
    bytes: Vec<u8>,
    warnings: Vec<String>,
}

impl CompiledTicket {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Ordered, append-only sequence of ticket primitives
///
/// The chained builder API mirrors how tickets read top to bottom:
///
/// ```
/// use gatehouse_printer::escpos::{Alignment, Capabilities, CommandStream, CutMode};
///
/// let mut stream = CommandStream::new();
/// stream
///     .init()
///     .align(Alignment::Center)
///     .size(2, 2)
///     .line("GATEHOUSE PARKING")
///     .size(1, 1)
///     .separator('=')
///     .align(Alignment::Left)
///     .pair_line("PLATE", "AB-123-CD")
///     .feed(3)
///     .cut(CutMode::Full);
///
/// let ticket = stream.compile(&Capabilities::default()).unwrap();
/// assert!(!ticket.bytes().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandStream {
    ops: Vec<TicketOp>,
}

impl CommandStream {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn ops(&self) -> &[TicketOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn push(&mut self, op: TicketOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn init(&mut self) -> &mut Self {
        self.push(TicketOp::Init)
    }

    pub fn text(&mut self, content: impl Into<String>) -> &mut Self {
        self.push(TicketOp::Text {
            content: content.into(),
        })
    }

    pub fn line(&mut self, content: impl Into<String>) -> &mut Self {
        self.push(TicketOp::Line {
            content: content.into(),
        })
    }

    pub fn pair_line(&mut self, left: impl Into<String>, right: impl Into<String>) -> &mut Self {
        self.push(TicketOp::PairLine {
            left: left.into(),
            right: right.into(),
        })
    }

    pub fn separator(&mut self, fill: char) -> &mut Self {
        self.push(TicketOp::Separator { fill })
    }

    pub fn bold(&mut self, enabled: bool) -> &mut Self {
        self.push(TicketOp::Bold { enabled })
    }

    pub fn align(&mut self, alignment: Alignment) -> &mut Self {
        self.push(TicketOp::Align { alignment })
    }

    pub fn size(&mut self, width: u8, height: u8) -> &mut Self {
        self.push(TicketOp::Size { width, height })
    }

    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.push(TicketOp::Feed { lines })
    }

    pub fn cut(&mut self, mode: CutMode) -> &mut Self {
        self.push(TicketOp::Cut { mode })
    }

    pub fn image(&mut self, bitmap: RasterBitmap) -> &mut Self {
        self.push(TicketOp::Image { bitmap })
    }

    pub fn barcode(&mut self, data: impl Into<String>, kind: BarcodeKind) -> &mut Self {
        self.push(TicketOp::Barcode {
            data: data.into(),
            kind,
        })
    }

    pub fn qr_code(&mut self, data: impl Into<String>, size: u8) -> &mut Self {
        self.push(TicketOp::QrCode {
            data: data.into(),
            size,
        })
    }

    pub fn drawer_pulse(&mut self) -> &mut Self {
        self.push(TicketOp::DrawerPulse)
    }

    /// Compile the stream against a printer's capabilities.
    ///
    /// Capability violations that change ticket content (barcode, QR) fail
    /// the build; violations that only drop hardware actions (cut, drawer)
    /// are downgraded to warnings so the ticket still prints.
    pub fn compile(&self, caps: &Capabilities) -> PrintResult<CompiledTicket> {
        let mut buf = Vec::with_capacity(4096);
        let mut warnings = Vec::new();

        for op in &self.ops {
            match op {
                TicketOp::Init => buf.extend_from_slice(&[0x1B, 0x40]),
                TicketOp::Text { content } => buf.extend_from_slice(content.as_bytes()),
                TicketOp::Line { content } => {
                    buf.extend_from_slice(content.as_bytes());
                    buf.push(b'\n');
                }
                TicketOp::PairLine { left, right } => {
                    emit_pair_line(&mut buf, left, right, caps.columns);
                }
                TicketOp::Separator { fill } => {
                    let line: String = std::iter::repeat(*fill).take(caps.columns).collect();
                    buf.extend_from_slice(line.as_bytes());
                    buf.push(b'\n');
                }
                TicketOp::Bold { enabled } => {
                    buf.extend_from_slice(&[0x1B, 0x45, u8::from(*enabled)]);
                }
                TicketOp::Align { alignment } => {
                    let n = match alignment {
                        Alignment::Left => 0x00,
                        Alignment::Center => 0x01,
                        Alignment::Right => 0x02,
                    };
                    buf.extend_from_slice(&[0x1B, 0x61, n]);
                }
                TicketOp::Size { width, height } => {
                    let w = (*width).clamp(1, 8) - 1;
                    let h = (*height).clamp(1, 8) - 1;
                    buf.extend_from_slice(&[0x1D, 0x21, (w << 4) | h]);
                }
                TicketOp::Feed { lines } => {
                    buf.extend_from_slice(&[0x1B, 0x64, *lines]);
                }
                TicketOp::Cut { mode } => {
                    if !caps.cutter {
                        warnings.push("cut requested but printer has no cutter".to_string());
                        continue;
                    }
                    let m = match mode {
                        CutMode::Full => 0x00,
                        CutMode::Partial => 0x01,
                    };
                    buf.extend_from_slice(&[0x1D, 0x56, m]);
                }
                TicketOp::Image { bitmap } => {
                    if bitmap.width > caps.dots_per_line {
                        warnings.push(format!(
                            "image {} dots wide exceeds printable width {}",
                            bitmap.width, caps.dots_per_line
                        ));
                        continue;
                    }
                    emit_raster(&mut buf, bitmap);
                }
                TicketOp::Barcode { data, kind } => {
                    if !caps.barcodes.contains(kind) {
                        return Err(PrintError::Capability(format!(
                            "barcode symbology {} not supported by printer",
                            kind
                        )));
                    }
                    emit_barcode(&mut buf, data, *kind)?;
                }
                TicketOp::QrCode { data, size } => {
                    if !caps.qr {
                        return Err(PrintError::Capability(
                            "QR codes not supported by printer".to_string(),
                        ));
                    }
                    emit_qr_code(&mut buf, data, *size);
                }
                TicketOp::DrawerPulse => {
                    if !caps.cash_drawer {
                        warnings
                            .push("drawer pulse requested but printer has no drawer".to_string());
                        continue;
                    }
                    // ESC p m t1 t2 - pulse on pin 2
                    buf.extend_from_slice(&[0x1B, 0x70, 0x00, 25, 250]);
                }
            }
        }

        Ok(CompiledTicket {
            bytes: convert_to_cp1252(&buf),
            warnings,
        })
    }
}

/// Left text left-aligned, right text right-aligned, spaces filling the gap
fn emit_pair_line(buf: &mut Vec<u8>, left: &str, right: &str, columns: usize) {
    let lw = column_width(left);
    let rw = column_width(right);

    buf.extend_from_slice(left.as_bytes());
    if lw + rw >= columns {
        buf.push(b' ');
    } else {
        let spaces = columns - lw - rw;
        buf.extend_from_slice(" ".repeat(spaces).as_bytes());
    }
    buf.extend_from_slice(right.as_bytes());
    buf.push(b'\n');
}

/// GS v 0 raster bit image
fn emit_raster(buf: &mut Vec<u8>, bitmap: &RasterBitmap) {
    let x_bytes = bitmap.width.div_ceil(8);

    buf.extend_from_slice(&[0x1D, 0x76, 0x30, 0x00]);
    buf.push(x_bytes as u8);
    buf.push((x_bytes >> 8) as u8);
    buf.push(bitmap.height as u8);
    buf.push((bitmap.height >> 8) as u8);
    buf.extend_from_slice(&bitmap.data);
    buf.push(0x0A);
}

/// GS k function B with HRI below and sane height/module defaults
fn emit_barcode(buf: &mut Vec<u8>, data: &str, kind: BarcodeKind) -> PrintResult<()> {
    // CODE128 payloads carry a 2-byte code-set prefix inside the same
    // single-byte length field.
    let max_len = if kind == BarcodeKind::Code128 { 253 } else { 255 };
    if data.is_empty() || data.len() > max_len {
        return Err(PrintError::Validation(format!(
            "barcode data length {} out of range",
            data.len()
        )));
    }
    if !data.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
        return Err(PrintError::Validation(
            "barcode data must be printable ASCII".to_string(),
        ));
    }

    // GS h n - height, GS w n - module width, GS H n - HRI below
    buf.extend_from_slice(&[0x1D, 0x68, 80]);
    buf.extend_from_slice(&[0x1D, 0x77, 2]);
    buf.extend_from_slice(&[0x1D, 0x48, 2]);

    // CODE128 requires an explicit code-set prefix in function B
    let payload: Vec<u8> = if kind == BarcodeKind::Code128 {
        let mut p = Vec::with_capacity(data.len() + 2);
        p.extend_from_slice(b"{B");
        p.extend_from_slice(data.as_bytes());
        p
    } else {
        data.as_bytes().to_vec()
    };

    buf.extend_from_slice(&[0x1D, 0x6B, kind.selector(), payload.len() as u8]);
    buf.extend_from_slice(&payload);
    Ok(())
}

/// GS ( k model 2 QR sequence: model, module size, error correction,
/// store data, print
fn emit_qr_code(buf: &mut Vec<u8>, data: &str, size: u8) {
    let size = size.clamp(1, 16);

    // Function 165: select model 2
    buf.extend_from_slice(&[0x1D, 0x28, 0x6B, 0x04, 0x00, 0x31, 0x41, 0x31, 0x00]);

    // Function 167: module size
    buf.extend_from_slice(&[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x43, size]);

    // Function 169: error correction level L
    buf.extend_from_slice(&[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x45, 0x31]);

    // Function 180: store data
    let data_bytes = data.as_bytes();
    let len = data_bytes.len() + 3;
    let p_l = (len & 0xFF) as u8;
    let p_h = ((len >> 8) & 0xFF) as u8;
    buf.extend_from_slice(&[0x1D, 0x28, 0x6B, p_l, p_h, 0x31, 0x50, 0x30]);
    buf.extend_from_slice(data_bytes);

    // Function 181: print
    buf.extend_from_slice(&[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[test]
    fn test_init_and_text() {
        let mut s = CommandStream::new();
        s.init().line("TICKET 42");

        let ticket = s.compile(&Capabilities::default()).unwrap();
        assert!(find(ticket.bytes(), &[0x1B, 0x40]).is_some());
        assert!(find(ticket.bytes(), b"TICKET 42\n").is_some());
        assert!(ticket.warnings().is_empty());
    }

    #[test]
    fn test_modal_style_opcodes() {
        let mut s = CommandStream::new();
        s.align(Alignment::Center)
            .bold(true)
            .size(2, 2)
            .line("HEADER")
            .bold(false)
            .size(1, 1);

        let ticket = s.compile(&Capabilities::default()).unwrap();
        let bytes = ticket.bytes();
        assert!(find(bytes, &[0x1B, 0x61, 0x01]).is_some()); // center
        assert!(find(bytes, &[0x1B, 0x45, 0x01]).is_some()); // bold on
        assert!(find(bytes, &[0x1B, 0x45, 0x00]).is_some()); // bold off
        assert!(find(bytes, &[0x1D, 0x21, 0x11]).is_some()); // 2x2
        assert!(find(bytes, &[0x1D, 0x21, 0x00]).is_some()); // reset size
    }

    #[test]
    fn test_cut_omitted_without_cutter() {
        let caps = Capabilities {
            cutter: false,
            ..Capabilities::default()
        };

        let mut s = CommandStream::new();
        s.line("no cutter here").cut(CutMode::Full);

        let ticket = s.compile(&caps).unwrap();
        assert!(find(ticket.bytes(), &[0x1D, 0x56, 0x00]).is_none());
        assert_eq!(ticket.warnings().len(), 1);
        assert!(ticket.warnings()[0].contains("no cutter"));
    }

    #[test]
    fn test_cut_emitted_with_cutter() {
        let mut s = CommandStream::new();
        s.cut(CutMode::Partial);

        let ticket = s.compile(&Capabilities::default()).unwrap();
        assert!(find(ticket.bytes(), &[0x1D, 0x56, 0x01]).is_some());
        assert!(ticket.warnings().is_empty());
    }

    #[test]
    fn test_unsupported_barcode_rejected() {
        let caps = Capabilities {
            barcodes: vec![BarcodeKind::Ean13],
            ..Capabilities::default()
        };

        let mut s = CommandStream::new();
        s.barcode("TCK-0001", BarcodeKind::Code128);

        let err = s.compile(&caps).unwrap_err();
        assert!(matches!(err, PrintError::Capability(_)));
    }

    #[test]
    fn test_code128_payload_prefixed() {
        let mut s = CommandStream::new();
        s.barcode("TCK-0001", BarcodeKind::Code128);

        let ticket = s.compile(&Capabilities::default()).unwrap();
        // GS k 73 len { B T C K ...
        let pos = find(ticket.bytes(), &[0x1D, 0x6B, 73]).expect("barcode emitted");
        let bytes = ticket.bytes();
        assert_eq!(bytes[pos + 3], 10); // "{B" + 8 data bytes
        assert_eq!(&bytes[pos + 4..pos + 6], b"{B");
    }

    #[test]
    fn test_qr_rejected_without_support() {
        let caps = Capabilities {
            qr: false,
            ..Capabilities::default()
        };

        let mut s = CommandStream::new();
        s.qr_code("https://example.test/t/42", 6);

        let err = s.compile(&caps).unwrap_err();
        assert!(matches!(err, PrintError::Capability(_)));
    }

    #[test]
    fn test_qr_store_and_print_sequence() {
        let mut s = CommandStream::new();
        s.qr_code("TCK-0001", 4);

        let ticket = s.compile(&Capabilities::default()).unwrap();
        let bytes = ticket.bytes();
        // store-data header with length 8 + 3
        assert!(find(bytes, &[0x1D, 0x28, 0x6B, 11, 0, 0x31, 0x50, 0x30]).is_some());
        // print function
        assert!(find(bytes, &[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30]).is_some());
    }

    #[test]
    fn test_pair_line_fills_width() {
        let caps = Capabilities {
            columns: 20,
            ..Capabilities::default()
        };

        let mut s = CommandStream::new();
        s.pair_line("FEE", "12,50");

        let ticket = s.compile(&caps).unwrap();
        let text = String::from_utf8_lossy(ticket.bytes());
        let line = text
            .lines()
            .find(|l| l.contains("FEE"))
            .expect("pair line present");
        // Skip the code-page selection bytes preceding the text
        let start = line.find("FEE").unwrap();
        assert_eq!(line[start..].chars().count(), 20);
        assert!(line.ends_with("12,50"));
    }

    #[test]
    fn test_separator_uses_profile_width() {
        let caps = Capabilities {
            columns: 10,
            ..Capabilities::default()
        };

        let mut s = CommandStream::new();
        s.separator('=');

        let ticket = s.compile(&caps).unwrap();
        assert!(find(ticket.bytes(), b"==========\n").is_some());
    }

    #[test]
    fn test_raster_header() {
        let bitmap = RasterBitmap::from_packed(16, 2, vec![0xFF, 0x00, 0x0F, 0xF0]).unwrap();

        let mut s = CommandStream::new();
        s.image(bitmap);

        let ticket = s.compile(&Capabilities::default()).unwrap();
        // GS v 0 0, xL=2 xH=0, yL=2 yH=0
        assert!(find(ticket.bytes(), &[0x1D, 0x76, 0x30, 0x00, 2, 0, 2, 0]).is_some());
    }

    #[test]
    fn test_oversized_image_dropped_with_warning() {
        let caps = Capabilities {
            dots_per_line: 8,
            ..Capabilities::default()
        };
        let bitmap = RasterBitmap::from_packed(16, 1, vec![0xFF, 0xFF]).unwrap();

        let mut s = CommandStream::new();
        s.image(bitmap);

        let ticket = s.compile(&caps).unwrap();
        assert!(find(ticket.bytes(), &[0x1D, 0x76]).is_none());
        assert_eq!(ticket.warnings().len(), 1);
    }

    #[test]
    fn test_raster_length_validated() {
        assert!(RasterBitmap::from_packed(16, 2, vec![0xFF]).is_err());
    }

    #[test]
    fn test_barcode_data_validated() {
        let mut s = CommandStream::new();
        s.barcode("", BarcodeKind::Code39);
        assert!(matches!(
            s.compile(&Capabilities::default()),
            Err(PrintError::Validation(_))
        ));

        let mut s = CommandStream::new();
        s.barcode("trocken\u{00e9}", BarcodeKind::Code39);
        assert!(matches!(
            s.compile(&Capabilities::default()),
            Err(PrintError::Validation(_))
        ));
    }
}
