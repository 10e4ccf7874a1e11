//! ArtRdm: the Art-Net envelope around one RDM message.

use super::tod::RDM_VERSION;
use super::{OpCode, Packet, ProtocolError};
use crate::rdm::RdmPacket;
use crate::types::Port;

/// ArtRdm header length; the RDM message (without start code) follows.
pub const ART_RDM_HEADER_SIZE: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtRdm {
    pub rdm_version: u8,
    pub net: u8,
    /// 0x00 processes the packet.
    pub command: u8,
    /// Low byte (`sub << 4 | universe`) of the port-address.
    pub address: u8,
    pub packet: RdmPacket,
}

impl ArtRdm {
    pub fn new(port: Port, packet: RdmPacket) -> Self {
        Self {
            rdm_version: RDM_VERSION,
            net: port.net(),
            command: 0,
            address: port.sub_uni(),
            packet,
        }
    }

    pub fn universe(&self) -> Port {
        Port::from_net_and_sub_uni(self.net, self.address)
    }
}

impl Packet for ArtRdm {
    const OPCODE: OpCode = OpCode::Rdm;
    const MIN_SIZE: usize = ART_RDM_HEADER_SIZE;

    fn decode_body(buf: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            rdm_version: buf[12],
            net: buf[21] & 0x7f,
            command: buf[22],
            address: buf[23],
            packet: RdmPacket::decode(&buf[ART_RDM_HEADER_SIZE..])?,
        })
    }

    fn encoded_len(&self) -> usize {
        ART_RDM_HEADER_SIZE + self.packet.encoded_len()
    }

    fn encode_body(&self, buf: &mut [u8]) {
        buf[12] = self.rdm_version;
        buf[21] = self.net & 0x7f;
        buf[22] = self.command;
        buf[23] = self.address;
        self.packet.write_to(&mut buf[ART_RDM_HEADER_SIZE..]);
    }
}
