//! Fixed-offset field helpers shared by the message codecs.

use byteorder::{BigEndian, ByteOrder};
use std::net::Ipv4Addr;

/// Reads a NUL-terminated ASCII field. Bytes after the first NUL are ignored.
pub(crate) fn read_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    field[..end]
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

/// Writes `value` into a fixed-width field, NUL padded. At most `field.len() - 1`
/// characters are kept so the field always carries a terminator.
pub(crate) fn write_str(field: &mut [u8], value: &str) {
    field.fill(0);
    let room = field.len().saturating_sub(1);
    for (slot, b) in field.iter_mut().zip(value.bytes().take(room)) {
        *slot = if b.is_ascii() { b } else { b'?' };
    }
}

/// Big-endian u16 at `offset`, or zero when the buffer stops before it.
pub(crate) fn be_u16_or_zero(buf: &[u8], offset: usize) -> u16 {
    buf.get(offset..offset + 2)
        .map(BigEndian::read_u16)
        .unwrap_or(0)
}

/// Byte at `offset`, or zero when the buffer stops before it.
pub(crate) fn u8_or_zero(buf: &[u8], offset: usize) -> u8 {
    buf.get(offset).copied().unwrap_or(0)
}

/// Fixed array at `offset`, or all zeros when the buffer stops before its end.
pub(crate) fn array_or_zero<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    if let Some(src) = buf.get(offset..offset + N) {
        out.copy_from_slice(src);
    }
    out
}

pub(crate) fn read_ipv4(buf: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::from(array_or_zero::<4>(buf, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_str_stops_at_nul() {
        assert_eq!(read_str(b"Node\0junk"), "Node");
        assert_eq!(read_str(b"full"), "full");
        assert_eq!(read_str(b"\0"), "");
    }

    #[test]
    fn test_write_str_keeps_terminator() {
        let mut field = [0xffu8; 6];
        write_str(&mut field, "abcdefgh");
        assert_eq!(&field, b"abcde\0");
    }

    #[test]
    fn test_write_str_replaces_non_ascii() {
        let mut field = [0u8; 8];
        write_str(&mut field, "é");
        // two UTF-8 bytes, each replaced
        assert_eq!(&field[..3], b"??\0");
    }

    #[test]
    fn test_missing_tail_reads_as_zero() {
        let buf = [1u8, 2, 3];
        assert_eq!(be_u16_or_zero(&buf, 1), 0x0203);
        assert_eq!(be_u16_or_zero(&buf, 2), 0);
        assert_eq!(u8_or_zero(&buf, 3), 0);
        assert_eq!(array_or_zero::<2>(&buf, 2), [0, 0]);
        assert_eq!(read_ipv4(&buf, 0), Ipv4Addr::UNSPECIFIED);
    }
}
