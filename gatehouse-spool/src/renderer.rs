//! Ticket renderer
//!
//! Turns a structured ticket payload into an ESC/POS command stream for one
//! printer profile. Composition only: fee amounts and texts arrive already
//! decided; this module lays them out for thermal paper.

use crate::types::{PrintSettings, PrinterProfile, TicketData, TicketKind};
use base64::Engine;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use gatehouse_printer::escpos::{
    Alignment, BarcodeKind, Capabilities, CommandStream, CutMode, RasterBitmap,
};

/// Ticket renderer bound to a display timezone
pub struct TicketRenderer {
    timezone: Tz,
}

impl TicketRenderer {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Render one ticket for one printer profile.
    ///
    /// The stream is still untyped bytes-wise; capability enforcement
    /// happens when the caller compiles it against the profile.
    pub fn render(
        &self,
        kind: TicketKind,
        ticket: &TicketData,
        profile: &PrinterProfile,
    ) -> CommandStream {
        let caps = &profile.capabilities;
        let settings = &profile.defaults;
        let mut stream = CommandStream::new();

        stream.init();
        self.render_header(&mut stream, kind, ticket, caps);

        match kind {
            TicketKind::Entry => self.render_entry(&mut stream, ticket),
            TicketKind::Exit | TicketKind::Receipt => self.render_exit(&mut stream, ticket),
            TicketKind::Thermal => self.render_plain(&mut stream, ticket),
        }

        self.render_reference(&mut stream, ticket, caps);
        self.render_footer(&mut stream, ticket, settings);

        stream
    }

    fn render_header(
        &self,
        stream: &mut CommandStream,
        kind: TicketKind,
        ticket: &TicketData,
        caps: &Capabilities,
    ) {
        stream.align(Alignment::Center);

        if let Some(logo) = ticket.logo_base64.as_deref() {
            if let Some(bitmap) = decode_logo(logo, caps.dots_per_line) {
                stream.image(bitmap);
            }
        }

        stream.bold(true).size(2, 2).line(&ticket.site_name);
        stream.size(1, 1).bold(false);

        for line in &ticket.header_lines {
            stream.line(line);
        }

        let title = match kind {
            TicketKind::Entry => "ENTRY TICKET",
            TicketKind::Exit => "EXIT TICKET",
            TicketKind::Receipt => "PAYMENT RECEIPT",
            TicketKind::Thermal => "",
        };
        if !title.is_empty() {
            stream.bold(true).line(title).bold(false);
        }

        stream.align(Alignment::Left).separator('=');
    }

    fn render_entry(&self, stream: &mut CommandStream, ticket: &TicketData) {
        if let Some(serial) = ticket.serial {
            stream.pair_line("TICKET NO", format!("{:06}", serial));
        }

        stream.bold(true).size(1, 2);
        stream.pair_line("PLATE", &ticket.vehicle_number);
        stream.size(1, 1).bold(false);

        if let Some(vehicle_type) = ticket.vehicle_type.as_deref() {
            stream.pair_line("VEHICLE", vehicle_type);
        }
        if let Some(driver) = ticket.driver_name.as_deref() {
            stream.pair_line("DRIVER", driver);
        }
        if let Some(entry) = ticket.entry_time {
            stream.pair_line("ENTRY", self.format_time(entry));
        }
        if let Some(notes) = ticket.notes.as_deref() {
            stream.separator('-');
            stream.line(notes);
        }
    }

    fn render_exit(&self, stream: &mut CommandStream, ticket: &TicketData) {
        if let Some(serial) = ticket.serial {
            stream.pair_line("TICKET NO", format!("{:06}", serial));
        }
        stream.pair_line("PLATE", &ticket.vehicle_number);

        if let Some(entry) = ticket.entry_time {
            stream.pair_line("ENTRY", self.format_time(entry));
        }
        if let Some(exit) = ticket.exit_time {
            stream.pair_line("EXIT", self.format_time(exit));
        }
        if let (Some(entry), Some(exit)) = (ticket.entry_time, ticket.exit_time) {
            stream.pair_line("DURATION", format_duration(entry, exit));
        }

        if !ticket.fee_lines.is_empty() {
            stream.separator('-');
            for fee in &ticket.fee_lines {
                stream.pair_line(&fee.label, &fee.amount);
            }
        }

        if let Some(status) = ticket.payment_status.as_deref() {
            stream.separator('-');
            stream.pair_line("PAYMENT", status);
        }
        if let Some(payment_type) = ticket.payment_type.as_deref() {
            stream.pair_line("METHOD", payment_type);
        }
    }

    fn render_plain(&self, stream: &mut CommandStream, ticket: &TicketData) {
        if !ticket.vehicle_number.is_empty() {
            stream.pair_line("PLATE", &ticket.vehicle_number);
        }
        if let Some(notes) = ticket.notes.as_deref() {
            stream.line(notes);
        }
    }

    /// Machine-readable reference: QR when the profile can, else a Code128
    /// barcode, else nothing. Compile-time capability checks stay authoritative;
    /// this just avoids composing something the profile is known to reject.
    fn render_reference(
        &self,
        stream: &mut CommandStream,
        ticket: &TicketData,
        caps: &Capabilities,
    ) {
        let Some(reference) = ticket.reference.as_deref() else {
            return;
        };

        stream.separator('-');
        stream.align(Alignment::Center);
        if caps.qr {
            stream.qr_code(reference, 6);
        } else if caps.barcodes.contains(&BarcodeKind::Code128) {
            stream.barcode(reference, BarcodeKind::Code128);
        }
        stream.line(reference);
        stream.align(Alignment::Left);
    }

    fn render_footer(
        &self,
        stream: &mut CommandStream,
        ticket: &TicketData,
        settings: &PrintSettings,
    ) {
        if !ticket.footer_lines.is_empty() {
            stream.align(Alignment::Center);
            for line in &ticket.footer_lines {
                stream.line(line);
            }
            stream.align(Alignment::Left);
        }

        stream.feed(settings.feed_margin);
        if settings.auto_cut {
            stream.cut(CutMode::Full);
        }
    }

    fn format_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.timezone)
            .format("%d/%m/%Y %H:%M")
            .to_string()
    }
}

/// Human-readable stay duration, e.g. "2d 3h 05m"
fn format_duration(entry: DateTime<Utc>, exit: DateTime<Utc>) -> String {
    let minutes = (exit - entry).num_minutes().max(0);
    let days = minutes / (24 * 60);
    let hours = (minutes % (24 * 60)) / 60;
    let mins = minutes % 60;
    if days > 0 {
        format!("{}d {}h {:02}m", days, hours, mins)
    } else {
        format!("{}h {:02}m", hours, mins)
    }
}

fn decode_logo(encoded: &str, max_width: u32) -> Option<RasterBitmap> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    RasterBitmap::from_image_bytes(&bytes, max_width)
}
