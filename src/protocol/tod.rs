//! Table-of-devices messages: ArtTodRequest, ArtTodData, ArtTodControl.

use byteorder::{BigEndian, ByteOrder};

use super::{OpCode, Packet, ProtocolError};
use crate::types::{Port, Uid};

/// Most port-addresses one ArtTodRequest may list.
pub const MAX_TOD_REQUEST_ADDRESSES: usize = 32;

/// Most UIDs one ArtTodData block may carry.
pub const MAX_TOD_UIDS: usize = 200;

/// RDM standard revision advertised in TOD and RDM envelopes (E1.20).
pub const RDM_VERSION: u8 = 0x01;

/// Asks nodes to send their current table of devices for the listed universes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArtTodRequest {
    pub net: u8,
    /// 0x00 requests the full table.
    pub command: u8,
    /// Low bytes (`sub << 4 | universe`) of the requested port-addresses.
    pub addresses: Vec<u8>,
}

impl ArtTodRequest {
    /// Full-table request for every port in `ports` that lives on `net`.
    pub fn for_ports<'a>(net: u8, ports: impl IntoIterator<Item = &'a Port>) -> Self {
        let mut addresses: Vec<u8> = ports
            .into_iter()
            .filter(|p| p.net() == net)
            .map(|p| p.sub_uni())
            .collect();
        addresses.sort_unstable();
        addresses.dedup();
        addresses.truncate(MAX_TOD_REQUEST_ADDRESSES);
        Self {
            net,
            command: 0,
            addresses,
        }
    }

    pub fn ports(&self) -> impl Iterator<Item = Port> + '_ {
        self.addresses
            .iter()
            .map(move |&a| Port::from_net_and_sub_uni(self.net, a))
    }

    fn address_count(&self) -> usize {
        self.addresses.len().min(MAX_TOD_REQUEST_ADDRESSES)
    }
}

impl Packet for ArtTodRequest {
    const OPCODE: OpCode = OpCode::TodRequest;
    const MIN_SIZE: usize = 24;

    fn decode_body(buf: &[u8]) -> Result<Self, ProtocolError> {
        let count = usize::from(buf[23])
            .min(MAX_TOD_REQUEST_ADDRESSES)
            .min(buf.len() - 24);
        Ok(Self {
            net: buf[21] & 0x7f,
            command: buf[22],
            addresses: buf[24..24 + count].to_vec(),
        })
    }

    fn encoded_len(&self) -> usize {
        24 + self.address_count()
    }

    fn encode_body(&self, buf: &mut [u8]) {
        let count = self.address_count();
        buf[21] = self.net & 0x7f;
        buf[22] = self.command;
        buf[23] = count as u8;
        buf[24..24 + count].copy_from_slice(&self.addresses[..count]);
    }
}

/// Whether an ArtTodData block carries a table or refuses the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodResponse {
    /// The block is part of the full table.
    Full,
    /// The node could not supply the table.
    Nak,
    Other(u8),
}

impl TodResponse {
    pub fn code(self) -> u8 {
        match self {
            TodResponse::Full => 0x00,
            TodResponse::Nak => 0xff,
            TodResponse::Other(c) => c,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => TodResponse::Full,
            0xff => TodResponse::Nak,
            other => TodResponse::Other(other),
        }
    }
}

/// One block of a node's table of devices for one universe.
///
/// Tables longer than [`MAX_TOD_UIDS`] span several blocks sharing `uid_total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtTodData {
    pub rdm_version: u8,
    /// Physical port, 1 to 4.
    pub port: u8,
    pub bind_index: u8,
    pub net: u8,
    pub response: TodResponse,
    /// Low byte (`sub << 4 | universe`) of the port-address.
    pub address: u8,
    pub uid_total: u16,
    pub block_count: u8,
    pub uids: Vec<Uid>,
}

impl Default for ArtTodData {
    fn default() -> Self {
        Self {
            rdm_version: RDM_VERSION,
            port: 1,
            bind_index: 1,
            net: 0,
            response: TodResponse::Full,
            address: 0,
            uid_total: 0,
            block_count: 0,
            uids: Vec::new(),
        }
    }
}

impl ArtTodData {
    /// Universe this block describes.
    pub fn universe(&self) -> Port {
        Port::from_net_and_sub_uni(self.net, self.address)
    }

    fn uid_count(&self) -> usize {
        self.uids.len().min(MAX_TOD_UIDS)
    }
}

impl Packet for ArtTodData {
    const OPCODE: OpCode = OpCode::TodData;
    const MIN_SIZE: usize = 28;

    fn decode_body(buf: &[u8]) -> Result<Self, ProtocolError> {
        let count = usize::from(buf[27]).min((buf.len() - 28) / 6);
        let uids = buf[28..28 + count * 6]
            .chunks_exact(6)
            .map(|chunk| {
                let mut bytes = [0u8; 6];
                bytes.copy_from_slice(chunk);
                Uid::from_bytes(bytes)
            })
            .collect();
        Ok(Self {
            rdm_version: buf[12],
            port: buf[13],
            bind_index: buf[20],
            net: buf[21] & 0x7f,
            response: TodResponse::from_code(buf[22]),
            address: buf[23],
            uid_total: BigEndian::read_u16(&buf[24..26]),
            block_count: buf[26],
            uids,
        })
    }

    fn encoded_len(&self) -> usize {
        28 + self.uid_count() * 6
    }

    fn encode_body(&self, buf: &mut [u8]) {
        let count = self.uid_count();
        buf[12] = self.rdm_version;
        buf[13] = self.port;
        buf[20] = self.bind_index;
        buf[21] = self.net & 0x7f;
        buf[22] = self.response.code();
        buf[23] = self.address;
        BigEndian::write_u16(&mut buf[24..26], self.uid_total);
        buf[26] = self.block_count;
        buf[27] = count as u8;
        for (slot, uid) in buf[28..].chunks_exact_mut(6).zip(&self.uids[..count]) {
            slot.copy_from_slice(uid.as_bytes());
        }
    }
}

/// ArtTodControl commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodCommand {
    None,
    /// Drop the table and run full RDM discovery again.
    Flush,
    /// End the current discovery.
    End,
    /// Enable incremental discovery.
    IncrementalOn,
    /// Disable incremental discovery.
    IncrementalOff,
    Other(u8),
}

impl TodCommand {
    pub fn code(self) -> u8 {
        match self {
            TodCommand::None => 0x00,
            TodCommand::Flush => 0x01,
            TodCommand::End => 0x02,
            TodCommand::IncrementalOn => 0x03,
            TodCommand::IncrementalOff => 0x04,
            TodCommand::Other(c) => c,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => TodCommand::None,
            0x01 => TodCommand::Flush,
            0x02 => TodCommand::End,
            0x03 => TodCommand::IncrementalOn,
            0x04 => TodCommand::IncrementalOff,
            other => TodCommand::Other(other),
        }
    }
}

/// Controls RDM discovery on one universe of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtTodControl {
    pub net: u8,
    pub command: TodCommand,
    /// Low byte (`sub << 4 | universe`) of the port-address.
    pub address: u8,
}

impl ArtTodControl {
    pub fn new(port: Port, command: TodCommand) -> Self {
        Self {
            net: port.net(),
            command,
            address: port.sub_uni(),
        }
    }

    /// Asks the node to rediscover the devices on `port`.
    pub fn flush(port: Port) -> Self {
        Self::new(port, TodCommand::Flush)
    }

    pub fn universe(&self) -> Port {
        Port::from_net_and_sub_uni(self.net, self.address)
    }
}

impl Packet for ArtTodControl {
    const OPCODE: OpCode = OpCode::TodControl;
    const MIN_SIZE: usize = 24;

    fn decode_body(buf: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            net: buf[21] & 0x7f,
            command: TodCommand::from_code(buf[22]),
            address: buf[23],
        })
    }

    fn encoded_len(&self) -> usize {
        24
    }

    fn encode_body(&self, buf: &mut [u8]) {
        buf[21] = self.net & 0x7f;
        buf[22] = self.command.code();
        buf[23] = self.address;
    }
}
