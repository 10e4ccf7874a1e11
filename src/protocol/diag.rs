//! ArtDiagData.

use byteorder::{BigEndian, ByteOrder};

use super::fields::read_str;
use super::{OpCode, Packet, ProtocolError};

/// Largest diagnostic payload, terminator included.
pub const MAX_DIAG_TEXT: usize = 512;

/// Diagnostic text sent by nodes when a controller enables diagnostics in ArtPoll.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArtDiagData {
    pub priority: u8,
    pub logical_port: u8,
    /// NUL-terminated ASCII on the wire. Encoding writes each non-ASCII byte
    /// as `?`, and decoding stops at the first NUL, so such text does not
    /// survive a round trip.
    pub text: String,
}

impl ArtDiagData {
    fn text_len(&self) -> usize {
        self.text.len().min(MAX_DIAG_TEXT - 1)
    }
}

impl Packet for ArtDiagData {
    const OPCODE: OpCode = OpCode::DiagData;
    const MIN_SIZE: usize = 18;

    fn decode_body(buf: &[u8]) -> Result<Self, ProtocolError> {
        let declared = usize::from(BigEndian::read_u16(&buf[16..18]));
        let len = declared.min(buf.len() - 18).min(MAX_DIAG_TEXT);
        Ok(Self {
            priority: buf[13],
            logical_port: buf[14],
            text: read_str(&buf[18..18 + len]),
        })
    }

    fn encoded_len(&self) -> usize {
        18 + self.text_len() + 1
    }

    fn encode_body(&self, buf: &mut [u8]) {
        let len = self.text_len();
        buf[13] = self.priority;
        buf[14] = self.logical_port;
        BigEndian::write_u16(&mut buf[16..18], (len + 1) as u16);
        for (slot, b) in buf[18..18 + len].iter_mut().zip(self.text.bytes()) {
            *slot = if b.is_ascii() { b } else { b'?' };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_packet, Message};

    #[test]
    fn test_diag_round_trip_longest_text() {
        let diag = ArtDiagData {
            priority: 0x80,
            logical_port: 3,
            text: "x".repeat(MAX_DIAG_TEXT - 1),
        };
        let bytes = Message::DiagData(diag.clone()).to_bytes();
        assert_eq!(bytes.len(), 18 + MAX_DIAG_TEXT);
        assert_eq!(*bytes.last().unwrap(), 0);
        assert_eq!(decode_packet::<ArtDiagData>(&bytes).unwrap(), diag);
    }

    #[test]
    fn test_diag_text_longer_than_limit_is_cut() {
        let diag = ArtDiagData {
            text: "y".repeat(700),
            ..Default::default()
        };
        let bytes = Message::DiagData(diag).to_bytes();
        let decoded = decode_packet::<ArtDiagData>(&bytes).unwrap();
        assert_eq!(decoded.text.len(), MAX_DIAG_TEXT - 1);
    }

    #[test]
    fn test_diag_empty_text() {
        let bytes = Message::DiagData(ArtDiagData::default()).to_bytes();
        assert_eq!(bytes.len(), 19);
        assert_eq!(decode_packet::<ArtDiagData>(&bytes).unwrap().text, "");
    }

    #[test]
    fn test_diag_text_is_ascii_up_to_first_nul() {
        let diag = ArtDiagData {
            text: "temp\0hidden".to_string(),
            ..Default::default()
        };
        let bytes = Message::DiagData(diag).to_bytes();
        assert_eq!(decode_packet::<ArtDiagData>(&bytes).unwrap().text, "temp");

        let diag = ArtDiagData {
            text: "caf\u{e9}".to_string(),
            ..Default::default()
        };
        let bytes = Message::DiagData(diag).to_bytes();
        assert_eq!(decode_packet::<ArtDiagData>(&bytes).unwrap().text, "caf??");
    }
}
