//! ArtDmx and ArtSync.

use byteorder::{BigEndian, ByteOrder};

use super::{OpCode, Packet, ProtocolError};
use crate::types::Port;

/// Channels in one DMX512 universe.
pub const MAX_DMX_CHANNELS: usize = 512;

/// One DMX512 frame for one universe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArtDmx {
    /// Wrapping frame counter, 0 disables reordering at the receiver.
    pub sequence: u8,
    /// Physical input port the data came from, informational only.
    pub physical: u8,
    pub port: Port,
    pub data: Vec<u8>,
}

impl ArtDmx {
    pub fn new(port: Port, data: impl Into<Vec<u8>>) -> Self {
        Self {
            port,
            data: data.into(),
            ..Default::default()
        }
    }

    fn channel_count(&self) -> usize {
        self.data.len().min(MAX_DMX_CHANNELS)
    }
}

impl Packet for ArtDmx {
    const OPCODE: OpCode = OpCode::Dmx;
    const MIN_SIZE: usize = 18;

    fn decode_body(buf: &[u8]) -> Result<Self, ProtocolError> {
        let declared = usize::from(BigEndian::read_u16(&buf[16..18]));
        let len = declared.min(buf.len() - 18).min(MAX_DMX_CHANNELS);
        Ok(Self {
            sequence: buf[12],
            physical: buf[13],
            port: Port::from_net_and_sub_uni(buf[15], buf[14]),
            data: buf[18..18 + len].to_vec(),
        })
    }

    fn encoded_len(&self) -> usize {
        18 + self.channel_count()
    }

    fn encode_body(&self, buf: &mut [u8]) {
        let len = self.channel_count();
        buf[12] = self.sequence;
        buf[13] = self.physical;
        buf[14] = self.port.sub_uni();
        buf[15] = self.port.net();
        BigEndian::write_u16(&mut buf[16..18], len as u16);
        buf[18..18 + len].copy_from_slice(&self.data[..len]);
    }
}

/// Tells outputs to present the frames buffered since the last sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArtSync;

impl Packet for ArtSync {
    const OPCODE: OpCode = OpCode::Sync;
    const MIN_SIZE: usize = 14;

    fn decode_body(_buf: &[u8]) -> Result<Self, ProtocolError> {
        Ok(ArtSync)
    }

    fn encoded_len(&self) -> usize {
        14
    }

    fn encode_body(&self, _buf: &mut [u8]) {}
}
