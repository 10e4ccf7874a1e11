//! ANSI E1.20 RDM message codec.
//!
//! Art-Net carries RDM messages without the leading start code, so the
//! encoded form here begins with the sub-start code. The checksum still
//! covers the start code.

use byteorder::{BigEndian, ByteOrder};
use std::fmt;
use std::time::Duration;

use super::ParameterId;
use crate::protocol::{ensure_capacity, ensure_len, ProtocolError};
use crate::types::Uid;

/// RDM start code. Implied on Art-Net, still part of the checksum.
pub const START_CODE: u8 = 0xcc;
/// E1.20 sub-start code.
pub const SUB_START_CODE: u8 = 0x01;
/// Bytes from sub-start code through PDL.
pub const RDM_HEADER_SIZE: usize = 23;
/// Trailing checksum.
pub const CHECKSUM_SIZE: usize = 2;
/// Largest parameter data block; the message length byte must stay within a u8.
pub const MAX_PARAM_DATA: usize = 231;

/// E1.20 command class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandClass {
    Discovery,
    DiscoveryResponse,
    Get,
    GetResponse,
    Set,
    SetResponse,
    Unknown(u8),
}

impl CommandClass {
    pub fn code(self) -> u8 {
        match self {
            CommandClass::Discovery => 0x10,
            CommandClass::DiscoveryResponse => 0x11,
            CommandClass::Get => 0x20,
            CommandClass::GetResponse => 0x21,
            CommandClass::Set => 0x30,
            CommandClass::SetResponse => 0x31,
            CommandClass::Unknown(c) => c,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0x10 => CommandClass::Discovery,
            0x11 => CommandClass::DiscoveryResponse,
            0x20 => CommandClass::Get,
            0x21 => CommandClass::GetResponse,
            0x30 => CommandClass::Set,
            0x31 => CommandClass::SetResponse,
            other => CommandClass::Unknown(other),
        }
    }

    pub fn is_response(self) -> bool {
        matches!(
            self,
            CommandClass::DiscoveryResponse | CommandClass::GetResponse | CommandClass::SetResponse
        )
    }

    /// The response class answering this request class.
    pub fn response(self) -> Option<CommandClass> {
        match self {
            CommandClass::Discovery => Some(CommandClass::DiscoveryResponse),
            CommandClass::Get => Some(CommandClass::GetResponse),
            CommandClass::Set => Some(CommandClass::SetResponse),
            _ => None,
        }
    }
}

/// Response type carried in the port-id byte of responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    Ack,
    /// The responder needs time; the data holds the delay in 100 ms units.
    AckTimer,
    NackReason,
    /// More data follows in further responses.
    AckOverflow,
    Unknown(u8),
}

impl ResponseType {
    pub fn code(self) -> u8 {
        match self {
            ResponseType::Ack => 0x00,
            ResponseType::AckTimer => 0x01,
            ResponseType::NackReason => 0x02,
            ResponseType::AckOverflow => 0x03,
            ResponseType::Unknown(c) => c,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => ResponseType::Ack,
            0x01 => ResponseType::AckTimer,
            0x02 => ResponseType::NackReason,
            0x03 => ResponseType::AckOverflow,
            other => ResponseType::Unknown(other),
        }
    }
}

/// Why a responder refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NackReason {
    UnknownPid,
    FormatError,
    HardwareFault,
    ProxyReject,
    WriteProtect,
    UnsupportedCommandClass,
    DataOutOfRange,
    BufferFull,
    PacketSizeUnsupported,
    SubDeviceOutOfRange,
    ProxyBufferFull,
    Other(u16),
}

impl NackReason {
    pub fn code(self) -> u16 {
        match self {
            NackReason::UnknownPid => 0x0000,
            NackReason::FormatError => 0x0001,
            NackReason::HardwareFault => 0x0002,
            NackReason::ProxyReject => 0x0003,
            NackReason::WriteProtect => 0x0004,
            NackReason::UnsupportedCommandClass => 0x0005,
            NackReason::DataOutOfRange => 0x0006,
            NackReason::BufferFull => 0x0007,
            NackReason::PacketSizeUnsupported => 0x0008,
            NackReason::SubDeviceOutOfRange => 0x0009,
            NackReason::ProxyBufferFull => 0x000a,
            NackReason::Other(c) => c,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            0x0000 => NackReason::UnknownPid,
            0x0001 => NackReason::FormatError,
            0x0002 => NackReason::HardwareFault,
            0x0003 => NackReason::ProxyReject,
            0x0004 => NackReason::WriteProtect,
            0x0005 => NackReason::UnsupportedCommandClass,
            0x0006 => NackReason::DataOutOfRange,
            0x0007 => NackReason::BufferFull,
            0x0008 => NackReason::PacketSizeUnsupported,
            0x0009 => NackReason::SubDeviceOutOfRange,
            0x000a => NackReason::ProxyBufferFull,
            other => NackReason::Other(other),
        }
    }
}

impl fmt::Display for NackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NackReason::UnknownPid => write!(f, "unknown PID"),
            NackReason::FormatError => write!(f, "format error"),
            NackReason::HardwareFault => write!(f, "hardware fault"),
            NackReason::ProxyReject => write!(f, "proxy reject"),
            NackReason::WriteProtect => write!(f, "write protected"),
            NackReason::UnsupportedCommandClass => write!(f, "unsupported command class"),
            NackReason::DataOutOfRange => write!(f, "data out of range"),
            NackReason::BufferFull => write!(f, "buffer full"),
            NackReason::PacketSizeUnsupported => write!(f, "packet size unsupported"),
            NackReason::SubDeviceOutOfRange => write!(f, "sub-device out of range"),
            NackReason::ProxyBufferFull => write!(f, "proxy buffer full"),
            NackReason::Other(c) => write!(f, "reason {:#06x}", c),
        }
    }
}

/// Additive checksum over `bytes`, seeded with the implied start code.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(u16::from(START_CODE), |sum, &b| sum.wrapping_add(u16::from(b)))
}

/// One RDM request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdmPacket {
    pub destination: Uid,
    pub source: Uid,
    pub transaction: u8,
    /// Port id in requests, response type in responses.
    pub port_or_response: u8,
    pub message_count: u8,
    pub sub_device: u16,
    pub command: CommandClass,
    pub parameter: u16,
    pub data: Vec<u8>,
}

impl RdmPacket {
    /// Request from `source` to `destination` on the root device.
    pub fn request(
        destination: Uid,
        source: Uid,
        transaction: u8,
        command: CommandClass,
        parameter: impl Into<u16>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            destination,
            source,
            transaction,
            port_or_response: 1,
            message_count: 0,
            sub_device: 0,
            command,
            parameter: parameter.into(),
            data,
        }
    }

    /// Response to this request with the same transaction, PID and sub-device.
    pub fn reply(&self, response: ResponseType, data: Vec<u8>) -> Self {
        Self {
            destination: self.source,
            source: self.destination,
            transaction: self.transaction,
            port_or_response: response.code(),
            message_count: 0,
            sub_device: self.sub_device,
            command: self.command.response().unwrap_or(self.command),
            parameter: self.parameter,
            data,
        }
    }

    pub fn pid(&self) -> ParameterId {
        ParameterId::from_code(self.parameter)
    }

    pub fn is_response(&self) -> bool {
        self.command.is_response()
    }

    /// Response type, for responses.
    pub fn response_type(&self) -> Option<ResponseType> {
        self.is_response()
            .then(|| ResponseType::from_code(self.port_or_response))
    }

    pub fn nack_reason(&self) -> Option<NackReason> {
        if self.response_type() != Some(ResponseType::NackReason) {
            return None;
        }
        let code = self.data.get(..2).map(BigEndian::read_u16).unwrap_or(0);
        Some(NackReason::from_code(code))
    }

    /// Delay requested by an ACK_TIMER response.
    pub fn ack_timer(&self) -> Option<Duration> {
        if self.response_type() != Some(ResponseType::AckTimer) {
            return None;
        }
        let units = self.data.get(..2).map(BigEndian::read_u16).unwrap_or(0);
        Some(Duration::from_millis(u64::from(units) * 100))
    }

    fn data_len(&self) -> usize {
        self.data.len().min(MAX_PARAM_DATA)
    }

    /// Encoded length, start code excluded.
    pub fn encoded_len(&self) -> usize {
        RDM_HEADER_SIZE + self.data_len() + CHECKSUM_SIZE
    }

    /// Encodes into the start of `buf`. Returns the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let len = self.encoded_len();
        ensure_capacity(buf, len)?;
        self.write_to(&mut buf[..len]);
        Ok(len)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        self.write_to(&mut buf);
        buf
    }

    /// `buf` must hold at least `encoded_len()` bytes.
    pub(crate) fn write_to(&self, buf: &mut [u8]) {
        let pdl = self.data_len();
        let body_end = RDM_HEADER_SIZE + pdl;
        buf[0] = SUB_START_CODE;
        buf[1] = (body_end + 1) as u8;
        buf[2..8].copy_from_slice(self.destination.as_bytes());
        buf[8..14].copy_from_slice(self.source.as_bytes());
        buf[14] = self.transaction;
        buf[15] = self.port_or_response;
        buf[16] = self.message_count;
        BigEndian::write_u16(&mut buf[17..19], self.sub_device);
        buf[19] = self.command.code();
        BigEndian::write_u16(&mut buf[20..22], self.parameter);
        buf[22] = pdl as u8;
        buf[RDM_HEADER_SIZE..body_end].copy_from_slice(&self.data[..pdl]);
        let sum = checksum(&buf[..body_end]);
        BigEndian::write_u16(&mut buf[body_end..body_end + CHECKSUM_SIZE], sum);
    }

    /// Decodes a message that starts at the sub-start code. Trailing bytes
    /// after the checksum are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(buf, RDM_HEADER_SIZE + CHECKSUM_SIZE)?;
        if buf[0] != SUB_START_CODE {
            return Err(ProtocolError::InvalidField("RDM sub-start code"));
        }
        let pdl = usize::from(buf[22]);
        let body_end = RDM_HEADER_SIZE + pdl;
        if usize::from(buf[1]) != body_end + 1 {
            return Err(ProtocolError::InvalidField("RDM message length"));
        }
        ensure_len(buf, body_end + CHECKSUM_SIZE)?;
        let expected = checksum(&buf[..body_end]);
        let actual = BigEndian::read_u16(&buf[body_end..body_end + CHECKSUM_SIZE]);
        if expected != actual {
            return Err(ProtocolError::BadChecksum { expected, actual });
        }
        let mut destination = [0u8; 6];
        let mut source = [0u8; 6];
        destination.copy_from_slice(&buf[2..8]);
        source.copy_from_slice(&buf[8..14]);
        Ok(Self {
            destination: Uid::from_bytes(destination),
            source: Uid::from_bytes(source),
            transaction: buf[14],
            port_or_response: buf[15],
            message_count: buf[16],
            sub_device: BigEndian::read_u16(&buf[17..19]),
            command: CommandClass::from_code(buf[19]),
            parameter: BigEndian::read_u16(&buf[20..22]),
            data: buf[RDM_HEADER_SIZE..body_end].to_vec(),
        })
    }
}
