//! Windows-1252 encoding utilities for Western-European thermal printers
//!
//! Parking tickets carry plate numbers, driver names and fee amounts in
//! Latin scripts; most ESC/POS printers expect these as a single-byte code
//! page rather than UTF-8. This module provides:
//! - Column-width calculation, truncation and padding for tabular layout
//! - UTF-8 to CP1252 conversion that preserves ESC/POS command bytes

use tracing::instrument;

/// ESC t 16 - select the WPC1252 code page table
const SELECT_CP1252: [u8; 3] = [0x1B, 0x74, 16];

/// Printed column width of a string under CP1252
///
/// One byte per character; characters the code page cannot represent still
/// occupy a single replacement column.
pub fn column_width(s: &str) -> usize {
    s.chars().count()
}

/// Truncate a string to fit within a column width
pub fn truncate_columns(s: &str, max_width: usize) -> String {
    s.chars().take(max_width).collect()
}

/// Pad a string to a specific column width
///
/// If the string is longer than the width, it will be truncated.
pub fn pad_columns(s: &str, width: usize, align_right: bool) -> String {
    let current = column_width(s);
    if current >= width {
        return truncate_columns(s, width);
    }
    let spaces = width - current;
    if align_right {
        format!("{}{}", " ".repeat(spaces), s)
    } else {
        format!("{}{}", s, " ".repeat(spaces))
    }
}

/// Convert mixed UTF-8 content (with ESC/POS commands) to CP1252
///
/// ASCII bytes (0x00-0x7F) pass through exactly as-is, which protects
/// ESC/POS commands from being corrupted. Bytes >= 0x80 are treated as UTF-8
/// sequences and re-encoded as Windows-1252; characters outside the code
/// page become '?'.
///
/// The code page selection (ESC t 16) is emitted at the start and re-emitted
/// after any embedded INIT command (ESC @), since initialization resets the
/// printer's character table.
#[instrument(skip(bytes))]
pub fn convert_to_cp1252(bytes: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(bytes.len() + 8);

    result.extend_from_slice(&SELECT_CP1252);

    let mut buffer = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        // INIT (ESC @ = 0x1B 0x40) resets the character table; re-select
        // the code page right after it.
        if b == 0x1B && i + 1 < bytes.len() && bytes[i + 1] == 0x40 {
            flush_buffer(&mut buffer, &mut result);
            result.push(0x1B);
            result.push(0x40);
            result.extend_from_slice(&SELECT_CP1252);
            i += 2;
            continue;
        }

        if b < 128 {
            // ASCII byte (command or ASCII text)
            flush_buffer(&mut buffer, &mut result);
            result.push(b);
        } else {
            // Part of a UTF-8 multi-byte sequence
            buffer.push(b);
        }
        i += 1;
    }

    flush_buffer(&mut buffer, &mut result);

    result
}

/// Flush the non-ASCII buffer, converting UTF-8 to CP1252
fn flush_buffer(buffer: &mut Vec<u8>, result: &mut Vec<u8>) {
    if buffer.is_empty() {
        return;
    }

    let s = String::from_utf8_lossy(buffer);
    let (encoded, _, had_errors) = encoding_rs::WINDOWS_1252.encode(&s);
    if had_errors {
        // encoding_rs emits numeric character references for unmappable
        // characters; printed output wants a plain replacement instead.
        for c in s.chars() {
            let mut one = [0u8; 4];
            let (enc, _, bad) = encoding_rs::WINDOWS_1252.encode(c.encode_utf8(&mut one));
            if bad {
                result.push(b'?');
            } else {
                result.extend_from_slice(&enc);
            }
        }
    } else {
        result.extend_from_slice(&encoded);
    }
    buffer.clear();
}
