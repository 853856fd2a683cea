//! Formatting helpers for the log stream.

use core::fmt;

/// Hex-and-ASCII dump of a byte buffer, sixteen bytes per line in the
/// classic offset/hex/printable layout. Borrows the data and allocates
/// nothing, so it is safe to embed in a `trace!` from interrupt context.
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (line, chunk) in self.0.chunks(16).enumerate() {
            if line > 0 {
                writeln!(f)?;
            }
            write!(f, "{:04x}: ", line * 16)?;
            for offset in 0..16 {
                match chunk.get(offset) {
                    Some(byte) => write!(f, "{:02x} ", byte)?,
                    None => write!(f, "   ")?,
                }
            }
            for &byte in chunk {
                let shown = if byte.is_ascii_graphic() || byte == b' ' { byte as char } else { '.' };
                write!(f, "{}", shown)?;
            }
        }
        Ok(())
    }
}

#[test]
fn test() {
    let dump = std::format!("{}", HexDump(&[0x41, 0x00, 0x7f]));
    assert!(dump.starts_with("0000: 41 00 7f"));
    assert!(dump.ends_with("A.."));

    let dump = std::format!("{}", HexDump(&[0u8; 17]));
    assert_eq!(dump.lines().count(), 2);
    assert!(dump.lines().nth(1).unwrap().starts_with("0010: 00"));
}
