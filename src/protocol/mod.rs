//! Art-Net 4 wire codec.
//!
//! Every packet starts with the 8-byte identifier `Art-Net\0` and a
//! little-endian [`OpCode`]. All packets except ArtPollReply then carry a
//! big-endian protocol version, which must be at least 14.
//!
//! The codec works on caller-provided byte slices at fixed offsets. Decoding
//! validates header, opcode, version and minimum size; encoding writes
//! header, opcode and version and then the body. Opcodes this crate does not
//! model decode to [`Message::Unsupported`] with the raw datagram attached.

mod address;
mod diag;
mod dmx;
mod error;
pub(crate) mod fields;
mod opcode;
mod poll;
mod rdm;
mod tod;

pub use address::{address_command, ArtAddress, SWITCH_PROGRAM};
pub use diag::{ArtDiagData, MAX_DIAG_TEXT};
pub use dmx::{ArtDmx, ArtSync, MAX_DMX_CHANNELS};
pub use error::ProtocolError;
pub(crate) use error::{ensure_capacity, ensure_len};
pub use opcode::OpCode;
pub use poll::{
    poll_flags, ArtPoll, ArtPollReply, MergeMode, GOOD_INPUT_DISABLED, GOOD_OUTPUT_B_RDM_DISABLED,
    GOOD_OUTPUT_DATA, GOOD_OUTPUT_MERGE_LTP, POLL_REPLY_MIN_SIZE, POLL_REPLY_SIZE, PORT_TYPE_INPUT,
    PORT_TYPE_OUTPUT, STATUS1_RDM_CAPABLE, STATUS2_PORT_ADDRESS_15BIT,
};
pub use rdm::{ArtRdm, ART_RDM_HEADER_SIZE};
pub use tod::{
    ArtTodControl, ArtTodData, ArtTodRequest, TodCommand, TodResponse, MAX_TOD_REQUEST_ADDRESSES,
    MAX_TOD_UIDS, RDM_VERSION,
};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Packet identifier that opens every Art-Net datagram.
pub const ARTNET_ID: &[u8; 8] = b"Art-Net\0";

/// Default Art-Net UDP port.
pub const ARTNET_PORT: u16 = 6454;

/// Protocol revision written by this codec.
pub const PROTOCOL_VERSION: u16 = 14;

/// Oldest protocol revision accepted on decode.
pub const MIN_PROTOCOL_VERSION: u16 = 14;

/// Identifier plus opcode.
pub const HEADER_SIZE: usize = 10;

/// Identifier, opcode and protocol version.
pub const VERSIONED_HEADER_SIZE: usize = 12;

/// Largest datagram any supported message encodes to.
pub const MAX_PACKET_SIZE: usize = 1024;

/// Codec for one Art-Net message body.
///
/// Implementors see the whole datagram at fixed offsets; the header has
/// already been validated when `decode_body` runs.
pub trait Packet: Sized {
    const OPCODE: OpCode;
    /// Smallest datagram this message may arrive in.
    const MIN_SIZE: usize;

    fn decode_body(buf: &[u8]) -> Result<Self, ProtocolError>;

    /// Full datagram length, header included.
    fn encoded_len(&self) -> usize;

    /// Writes the body. `buf` is exactly `encoded_len()` long and zeroed.
    fn encode_body(&self, buf: &mut [u8]);
}

/// Decoded Art-Net datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Poll(ArtPoll),
    PollReply(Box<ArtPollReply>),
    DiagData(ArtDiagData),
    Dmx(ArtDmx),
    Sync(ArtSync),
    Address(Box<ArtAddress>),
    TodRequest(ArtTodRequest),
    TodData(ArtTodData),
    TodControl(ArtTodControl),
    Rdm(ArtRdm),
    /// Well-formed datagram with an opcode this crate does not model.
    Unsupported { opcode: OpCode, data: Vec<u8> },
}

type Decoder = fn(&[u8]) -> Result<Message, ProtocolError>;

fn decode_poll(buf: &[u8]) -> Result<Message, ProtocolError> {
    decode_packet::<ArtPoll>(buf).map(Message::Poll)
}

fn decode_poll_reply(buf: &[u8]) -> Result<Message, ProtocolError> {
    decode_packet::<ArtPollReply>(buf).map(|p| Message::PollReply(Box::new(p)))
}

fn decode_diag(buf: &[u8]) -> Result<Message, ProtocolError> {
    decode_packet::<ArtDiagData>(buf).map(Message::DiagData)
}

fn decode_dmx(buf: &[u8]) -> Result<Message, ProtocolError> {
    decode_packet::<ArtDmx>(buf).map(Message::Dmx)
}

fn decode_sync(buf: &[u8]) -> Result<Message, ProtocolError> {
    decode_packet::<ArtSync>(buf).map(Message::Sync)
}

fn decode_address(buf: &[u8]) -> Result<Message, ProtocolError> {
    decode_packet::<ArtAddress>(buf).map(|p| Message::Address(Box::new(p)))
}

fn decode_tod_request(buf: &[u8]) -> Result<Message, ProtocolError> {
    decode_packet::<ArtTodRequest>(buf).map(Message::TodRequest)
}

fn decode_tod_data(buf: &[u8]) -> Result<Message, ProtocolError> {
    decode_packet::<ArtTodData>(buf).map(Message::TodData)
}

fn decode_tod_control(buf: &[u8]) -> Result<Message, ProtocolError> {
    decode_packet::<ArtTodControl>(buf).map(Message::TodControl)
}

fn decode_rdm(buf: &[u8]) -> Result<Message, ProtocolError> {
    decode_packet::<ArtRdm>(buf).map(Message::Rdm)
}

/// Decoder table keyed by opcode. `None` means pass the datagram through raw.
fn decoder_for(op: OpCode) -> Option<Decoder> {
    let decoder: Decoder = match op {
        OpCode::Poll => decode_poll,
        OpCode::PollReply => decode_poll_reply,
        OpCode::DiagData => decode_diag,
        OpCode::Dmx => decode_dmx,
        OpCode::Sync => decode_sync,
        OpCode::Address => decode_address,
        OpCode::TodRequest => decode_tod_request,
        OpCode::TodData => decode_tod_data,
        OpCode::TodControl => decode_tod_control,
        OpCode::Rdm => decode_rdm,
        _ => return None,
    };
    Some(decoder)
}

/// Reads the opcode of a datagram after checking its identifier.
pub fn peek_opcode(buf: &[u8]) -> Result<OpCode, ProtocolError> {
    if buf.len() < ARTNET_ID.len() || &buf[..ARTNET_ID.len()] != ARTNET_ID {
        return Err(ProtocolError::InvalidHeader);
    }
    ensure_len(buf, HEADER_SIZE)?;
    Ok(OpCode::from_code(LittleEndian::read_u16(&buf[8..10])))
}

/// Validates size and version, then decodes the body of `P`.
pub fn decode_packet<P: Packet>(buf: &[u8]) -> Result<P, ProtocolError> {
    ensure_len(buf, P::MIN_SIZE)?;
    if P::OPCODE.has_version() {
        let version = BigEndian::read_u16(&buf[10..12]);
        if version < MIN_PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
    }
    P::decode_body(buf)
}

/// Writes the header of `P` followed by its body. Returns bytes written.
pub fn encode_packet<P: Packet>(packet: &P, buf: &mut [u8]) -> Result<usize, ProtocolError> {
    let len = packet.encoded_len();
    ensure_capacity(buf, len)?;
    let out = &mut buf[..len];
    out.fill(0);
    out[..8].copy_from_slice(ARTNET_ID);
    LittleEndian::write_u16(&mut out[8..10], P::OPCODE.code());
    if P::OPCODE.has_version() {
        BigEndian::write_u16(&mut out[10..12], PROTOCOL_VERSION);
    }
    packet.encode_body(out);
    Ok(len)
}

impl Message {
    /// Decodes one datagram.
    pub fn decode(buf: &[u8]) -> Result<Message, ProtocolError> {
        let opcode = peek_opcode(buf)?;
        match decoder_for(opcode) {
            Some(decode) => decode(buf),
            None => Ok(Message::Unsupported {
                opcode,
                data: buf.to_vec(),
            }),
        }
    }

    pub fn opcode(&self) -> OpCode {
        match self {
            Message::Poll(_) => OpCode::Poll,
            Message::PollReply(_) => OpCode::PollReply,
            Message::DiagData(_) => OpCode::DiagData,
            Message::Dmx(_) => OpCode::Dmx,
            Message::Sync(_) => OpCode::Sync,
            Message::Address(_) => OpCode::Address,
            Message::TodRequest(_) => OpCode::TodRequest,
            Message::TodData(_) => OpCode::TodData,
            Message::TodControl(_) => OpCode::TodControl,
            Message::Rdm(_) => OpCode::Rdm,
            Message::Unsupported { opcode, .. } => *opcode,
        }
    }

    /// Number of bytes [`Message::encode`] writes.
    pub fn encoded_len(&self) -> usize {
        match self {
            Message::Poll(p) => p.encoded_len(),
            Message::PollReply(p) => p.encoded_len(),
            Message::DiagData(p) => p.encoded_len(),
            Message::Dmx(p) => p.encoded_len(),
            Message::Sync(p) => p.encoded_len(),
            Message::Address(p) => p.encoded_len(),
            Message::TodRequest(p) => p.encoded_len(),
            Message::TodData(p) => p.encoded_len(),
            Message::TodControl(p) => p.encoded_len(),
            Message::Rdm(p) => p.encoded_len(),
            Message::Unsupported { data, .. } => data.len(),
        }
    }

    /// Encodes into the start of `buf` and returns the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        match self {
            Message::Poll(p) => encode_packet(p, buf),
            Message::PollReply(p) => encode_packet(p.as_ref(), buf),
            Message::DiagData(p) => encode_packet(p, buf),
            Message::Dmx(p) => encode_packet(p, buf),
            Message::Sync(p) => encode_packet(p, buf),
            Message::Address(p) => encode_packet(p.as_ref(), buf),
            Message::TodRequest(p) => encode_packet(p, buf),
            Message::TodData(p) => encode_packet(p, buf),
            Message::TodControl(p) => encode_packet(p, buf),
            Message::Rdm(p) => encode_packet(p, buf),
            Message::Unsupported { data, .. } => {
                ensure_capacity(buf, data.len())?;
                buf[..data.len()].copy_from_slice(data);
                Ok(data.len())
            }
        }
    }

    /// Encodes at `offset` and returns the offset just past the message.
    pub fn encode_at(&self, buf: &mut [u8], offset: usize) -> Result<usize, ProtocolError> {
        let available = buf.len();
        let tail = buf.get_mut(offset..).ok_or(ProtocolError::BufferTooSmall {
            needed: offset + self.encoded_len(),
            available,
        })?;
        Ok(offset + self.encode(tail)?)
    }

    /// Encodes into a freshly allocated buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        match self.encode(&mut buf) {
            Ok(written) => buf.truncate(written),
            Err(e) => {
                log::warn!("failed to encode {:?}: {}", self.opcode(), e);
                buf.clear();
            }
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(op: u16, version: u16) -> Vec<u8> {
        let mut buf = ARTNET_ID.to_vec();
        buf.extend_from_slice(&op.to_le_bytes());
        buf.extend_from_slice(&version.to_be_bytes());
        buf
    }

    #[test]
    fn test_rejects_bad_identifier() {
        let mut buf = header(0x2000, 14);
        buf.extend_from_slice(&[0, 0]);
        buf[0] = b'X';
        assert_eq!(Message::decode(&buf), Err(ProtocolError::InvalidHeader));
        assert_eq!(Message::decode(b"Art"), Err(ProtocolError::InvalidHeader));
    }

    #[test]
    fn test_rejects_old_version() {
        let mut buf = header(0x2000, 13);
        buf.extend_from_slice(&[0, 0]);
        assert_eq!(
            Message::decode(&buf),
            Err(ProtocolError::UnsupportedVersion(13))
        );
    }

    #[test]
    fn test_rejects_short_buffer() {
        let buf = header(0x5000, 14);
        assert!(matches!(
            Message::decode(&buf),
            Err(ProtocolError::TooShort { expected: 18, .. })
        ));
    }

    #[test]
    fn test_unknown_opcode_passes_through_raw() {
        let mut buf = header(0x9700, 14);
        buf.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7]);
        let message = Message::decode(&buf).unwrap();
        assert_eq!(message.opcode(), OpCode::TimeCode);
        assert_eq!(message.to_bytes(), buf);
        match message {
            Message::Unsupported { data, .. } => assert_eq!(data, buf),
            other => panic!("expected passthrough, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_reports_small_buffer() {
        let message = Message::Sync(ArtSync::default());
        let mut buf = [0u8; 8];
        assert_eq!(
            message.encode(&mut buf),
            Err(ProtocolError::BufferTooSmall {
                needed: 14,
                available: 8
            })
        );
    }

    #[test]
    fn test_encode_at_offset_returns_end() {
        let message = Message::Sync(ArtSync::default());
        let mut buf = [0u8; 40];
        let end = message.encode_at(&mut buf, 20).unwrap();
        assert_eq!(end, 34);
        assert_eq!(&buf[20..28], ARTNET_ID);
        assert_eq!(Message::decode(&buf[20..end]).unwrap(), message);
    }

    #[test]
    fn test_encode_at_past_end_reports_whole_buffer() {
        let message = Message::Sync(ArtSync::default());
        let mut buf = [0u8; 10];
        assert_eq!(
            message.encode_at(&mut buf, 12),
            Err(ProtocolError::BufferTooSmall {
                needed: 26,
                available: 10
            })
        );
    }

    #[test]
    fn test_to_bytes_matches_encoded_len() {
        let messages = [
            Message::Sync(ArtSync::default()),
            Message::Poll(ArtPoll::default()),
            Message::Unsupported {
                opcode: OpCode::TimeCode,
                data: header(0x9700, 14),
            },
        ];
        for message in messages {
            let bytes = message.to_bytes();
            assert_eq!(bytes.len(), message.encoded_len());
            assert_eq!(Message::decode(&bytes).unwrap(), message);
        }
    }
}
