//! Offset / hex / ASCII dumps of byte buffers
//!
//! ```text
//! payload:
//!   0000  48 65 6c 6c 6f 2c 20 77 6f 72 6c 64 21 0a 00 01  Hello, world!...
//!   0010  ff                                               .
//! ```

use core::fmt::{self, Write};

use log::debug;

const BYTES_PER_ROW: usize = 16;

/// One rendered row: indent, offset, 16 hex columns, gap, 16 ASCII columns.
pub type HexRow = heapless::String<80>;

/// Write a dump of `bytes` to `out`, one row per 16 bytes.
///
/// When `desc` is given it is written first as `"{desc}:"` on its own line.
/// Every line, including the last, ends in `'\n'`.
pub fn write_hex_dump<W: Write>(out: &mut W, desc: Option<&str>, bytes: &[u8]) -> fmt::Result {
    if let Some(desc) = desc {
        writeln!(out, "{}:", desc)?;
    }
    for (index, chunk) in bytes.chunks(BYTES_PER_ROW).enumerate() {
        write_row(out, index * BYTES_PER_ROW, chunk)?;
        out.write_char('\n')?;
    }
    Ok(())
}

/// Log a dump of `bytes` at debug level, one log record per row.
pub fn log_hex_dump(desc: Option<&str>, bytes: &[u8]) {
    if let Some(desc) = desc {
        debug!("{}:", desc);
    }
    for (index, chunk) in bytes.chunks(BYTES_PER_ROW).enumerate() {
        let mut row = HexRow::new();
        // A row is at most 73 characters, so it always fits.
        let _ = write_row(&mut row, index * BYTES_PER_ROW, chunk);
        debug!("{}", row);
    }
}

fn write_row<W: Write>(out: &mut W, offset: usize, chunk: &[u8]) -> fmt::Result {
    write!(out, "  {:04x} ", offset)?;
    for byte in chunk {
        write!(out, " {:02x}", byte)?;
    }
    for _ in chunk.len()..BYTES_PER_ROW {
        out.write_str("   ")?;
    }
    out.write_str("  ")?;
    for &byte in chunk {
        out.write_char(printable(byte))?;
    }
    Ok(())
}

fn printable(byte: u8) -> char {
    if (0x20..=0x7e).contains(&byte) {
        byte as char
    } else {
        '.'
    }
}
