//! ArtAddress: remote programming of node names and port switches.

use super::fields::{read_str, write_str};
use super::{OpCode, Packet, ProtocolError};

/// ArtAddress `Command` values.
pub mod address_command {
    pub const NONE: u8 = 0x00;
    pub const CANCEL_MERGE: u8 = 0x01;
    pub const LED_NORMAL: u8 = 0x02;
    pub const LED_MUTE: u8 = 0x03;
    pub const LED_LOCATE: u8 = 0x04;
    pub const RESET_RX_FLAGS: u8 = 0x05;
    /// Add the port index (0-3).
    pub const MERGE_LTP: u8 = 0x10;
    /// Add the port index (0-3).
    pub const MERGE_HTP: u8 = 0x50;
    /// Add the port index (0-3).
    pub const CLEAR_OUTPUT: u8 = 0x90;
}

/// Switch values with bit 7 set are programmed; without it they are left alone.
pub const SWITCH_PROGRAM: u8 = 0x80;

/// Reprograms a node. Fields left at zero (names empty) are not changed by the node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArtAddress {
    pub net_switch: u8,
    pub bind_index: u8,
    pub short_name: String,
    pub long_name: String,
    pub sw_in: [u8; 4],
    pub sw_out: [u8; 4],
    pub sub_switch: u8,
    pub acn_priority: u8,
    pub command: u8,
}

impl ArtAddress {
    /// Renames the node at `bind_index`.
    pub fn rename(bind_index: u8, short_name: &str, long_name: &str) -> Self {
        Self {
            bind_index,
            short_name: short_name.to_string(),
            long_name: long_name.to_string(),
            ..Default::default()
        }
    }
}

impl Packet for ArtAddress {
    const OPCODE: OpCode = OpCode::Address;
    const MIN_SIZE: usize = 107;

    fn decode_body(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut sw_in = [0u8; 4];
        let mut sw_out = [0u8; 4];
        sw_in.copy_from_slice(&buf[96..100]);
        sw_out.copy_from_slice(&buf[100..104]);
        Ok(Self {
            net_switch: buf[12],
            bind_index: buf[13],
            short_name: read_str(&buf[14..32]),
            long_name: read_str(&buf[32..96]),
            sw_in,
            sw_out,
            sub_switch: buf[104],
            acn_priority: buf[105],
            command: buf[106],
        })
    }

    fn encoded_len(&self) -> usize {
        107
    }

    fn encode_body(&self, buf: &mut [u8]) {
        buf[12] = self.net_switch;
        buf[13] = self.bind_index;
        write_str(&mut buf[14..32], &self.short_name);
        write_str(&mut buf[32..96], &self.long_name);
        buf[96..100].copy_from_slice(&self.sw_in);
        buf[100..104].copy_from_slice(&self.sw_out);
        buf[104] = self.sub_switch;
        buf[105] = self.acn_priority;
        buf[106] = self.command;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_packet, Message};

    #[test]
    fn test_address_round_trip() {
        let address = ArtAddress {
            net_switch: SWITCH_PROGRAM | 2,
            sw_out: [SWITCH_PROGRAM | 1, 0, 0, SWITCH_PROGRAM | 15],
            command: address_command::MERGE_LTP + 3,
            ..ArtAddress::rename(1, "Stage left", "Stage left dimmer rack")
        };
        let bytes = Message::Address(Box::new(address.clone())).to_bytes();
        assert_eq!(bytes.len(), 107);
        assert_eq!(decode_packet::<ArtAddress>(&bytes).unwrap(), address);
    }

    #[test]
    fn test_address_short_name_limited_to_field() {
        let address = ArtAddress::rename(1, "a name that is far too long", "");
        let bytes = Message::Address(Box::new(address)).to_bytes();
        let decoded = decode_packet::<ArtAddress>(&bytes).unwrap();
        assert_eq!(decoded.short_name, "a name that is fa");
    }
}
