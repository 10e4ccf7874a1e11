//! ArtPoll and ArtPollReply.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::net::Ipv4Addr;

use super::fields::{array_or_zero, be_u16_or_zero, read_ipv4, read_str, u8_or_zero, write_str};
use super::{OpCode, Packet, ProtocolError, ARTNET_PORT};
use crate::types::{Port, Uid};

/// ArtPoll `Flags` bits.
pub mod poll_flags {
    /// Only nodes inside the target port-address range should reply.
    pub const TARGETED_MODE: u8 = 0x20;
    /// Disable VLC transmission.
    pub const VLC_DISABLE: u8 = 0x10;
    /// Diagnostics are unicast to the controller instead of broadcast.
    pub const DIAG_UNICAST: u8 = 0x08;
    /// Nodes should send diagnostics.
    pub const DIAG_ENABLE: u8 = 0x04;
    /// Nodes should send ArtPollReply whenever their state changes.
    pub const REPLY_ON_CHANGE: u8 = 0x02;
}

/// Discovery request sent by controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArtPoll {
    pub flags: u8,
    pub diag_priority: u8,
    /// Upper bound of the targeted port-address range (15-bit form).
    pub target_top: u16,
    /// Lower bound of the targeted port-address range (15-bit form).
    pub target_bottom: u16,
    pub esta_manufacturer: u16,
    pub oem: u16,
}

impl ArtPoll {
    /// Poll restricted to port-addresses in `bottom..=top`.
    pub fn targeted(bottom: Port, top: Port) -> Self {
        Self {
            flags: poll_flags::TARGETED_MODE,
            target_top: top.packed(),
            target_bottom: bottom.packed(),
            ..Default::default()
        }
    }
}

impl Packet for ArtPoll {
    const OPCODE: OpCode = OpCode::Poll;
    const MIN_SIZE: usize = 14;

    fn decode_body(buf: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            flags: buf[12],
            diag_priority: buf[13],
            target_top: be_u16_or_zero(buf, 14),
            target_bottom: be_u16_or_zero(buf, 16),
            esta_manufacturer: be_u16_or_zero(buf, 18),
            oem: be_u16_or_zero(buf, 20),
        })
    }

    fn encoded_len(&self) -> usize {
        22
    }

    fn encode_body(&self, buf: &mut [u8]) {
        buf[12] = self.flags;
        buf[13] = self.diag_priority;
        BigEndian::write_u16(&mut buf[14..16], self.target_top);
        BigEndian::write_u16(&mut buf[16..18], self.target_bottom);
        BigEndian::write_u16(&mut buf[18..20], self.esta_manufacturer);
        BigEndian::write_u16(&mut buf[20..22], self.oem);
    }
}

/// Size of a complete Art-Net 4 ArtPollReply.
pub const POLL_REPLY_SIZE: usize = 239;

/// Shortest ArtPollReply accepted. Older nodes stop after the MAC address;
/// everything past it decodes as zero.
pub const POLL_REPLY_MIN_SIZE: usize = 207;

/// `PortTypes` bit: the port can output DMX from the network.
pub const PORT_TYPE_OUTPUT: u8 = 0x80;
/// `PortTypes` bit: the port can input DMX to the network.
pub const PORT_TYPE_INPUT: u8 = 0x40;
/// `GoodOutputA` bit: the output merges in LTP mode.
pub const GOOD_OUTPUT_MERGE_LTP: u8 = 0x02;
/// `GoodOutputA` bit: the output is transmitting data.
pub const GOOD_OUTPUT_DATA: u8 = 0x80;
/// `GoodOutputB` bit: RDM is disabled on the output.
pub const GOOD_OUTPUT_B_RDM_DISABLED: u8 = 0x80;
/// `GoodInput` bit: the input is disabled.
pub const GOOD_INPUT_DISABLED: u8 = 0x08;
/// `Status1` bit: the node supports RDM.
pub const STATUS1_RDM_CAPABLE: u8 = 0x02;
/// `Status2` bit: the node accepts 15-bit port-addresses.
pub const STATUS2_PORT_ADDRESS_15BIT: u8 = 0x08;

/// How an output combines two controllers sending the same universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MergeMode {
    /// Highest value wins per channel.
    Htp,
    /// Latest frame wins.
    Ltp,
}

/// Node status, sent in reply to ArtPoll.
///
/// One reply describes up to four ports; nodes with more ports send one
/// reply per bind index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtPollReply {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub firmware_version: u16,
    pub net_switch: u8,
    pub sub_switch: u8,
    pub oem: u16,
    pub ubea_version: u8,
    pub status1: u8,
    pub esta_manufacturer: u16,
    pub short_name: String,
    pub long_name: String,
    pub node_report: String,
    pub num_ports: u16,
    pub port_types: [u8; 4],
    pub good_input: [u8; 4],
    pub good_output_a: [u8; 4],
    pub sw_in: [u8; 4],
    pub sw_out: [u8; 4],
    pub acn_priority: u8,
    pub sw_macro: u8,
    pub sw_remote: u8,
    pub style: u8,
    pub mac: [u8; 6],
    pub bind_ip: Ipv4Addr,
    pub bind_index: u8,
    pub status2: u8,
    pub good_output_b: [u8; 4],
    pub status3: u8,
    pub default_responder: Uid,
    pub user: u16,
    pub refresh_rate: u16,
}

impl Default for ArtPollReply {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::UNSPECIFIED,
            port: ARTNET_PORT,
            firmware_version: 0,
            net_switch: 0,
            sub_switch: 0,
            oem: 0,
            ubea_version: 0,
            status1: 0,
            esta_manufacturer: 0,
            short_name: String::new(),
            long_name: String::new(),
            node_report: String::new(),
            num_ports: 0,
            port_types: [0; 4],
            good_input: [0; 4],
            good_output_a: [0; 4],
            sw_in: [0; 4],
            sw_out: [0; 4],
            acn_priority: 0,
            sw_macro: 0,
            sw_remote: 0,
            style: 0,
            mac: [0; 6],
            bind_ip: Ipv4Addr::UNSPECIFIED,
            bind_index: 0,
            status2: 0,
            good_output_b: [0; 4],
            status3: 0,
            default_responder: Uid::default(),
            user: 0,
            refresh_rate: 0,
        }
    }
}

impl ArtPollReply {
    /// Number of port slots this reply describes (at most four).
    pub fn port_count(&self) -> usize {
        usize::from(self.num_ports).min(4)
    }

    /// Whether the node reports RDM support at all.
    pub fn rdm_capable(&self) -> bool {
        self.status1 & STATUS1_RDM_CAPABLE != 0
    }

    /// Universe the output at slot `index` listens to, if that slot outputs DMX.
    pub fn output_port(&self, index: usize) -> Option<Port> {
        if index >= self.port_count() || self.port_types[index] & PORT_TYPE_OUTPUT == 0 {
            return None;
        }
        Some(Port::new(self.net_switch, self.sub_switch, self.sw_out[index]))
    }

    /// Universe the input at slot `index` feeds, if that slot inputs DMX.
    pub fn input_port(&self, index: usize) -> Option<Port> {
        if index >= self.port_count() || self.port_types[index] & PORT_TYPE_INPUT == 0 {
            return None;
        }
        Some(Port::new(self.net_switch, self.sub_switch, self.sw_in[index]))
    }

    pub fn merge_mode(&self, index: usize) -> MergeMode {
        if self.good_output_a.get(index).copied().unwrap_or(0) & GOOD_OUTPUT_MERGE_LTP != 0 {
            MergeMode::Ltp
        } else {
            MergeMode::Htp
        }
    }

    /// Whether RDM can be used on the output at slot `index`.
    pub fn output_rdm_enabled(&self, index: usize) -> bool {
        self.rdm_capable()
            && self.good_output_b.get(index).copied().unwrap_or(0) & GOOD_OUTPUT_B_RDM_DISABLED == 0
    }

    pub fn output_active(&self, index: usize) -> bool {
        self.good_output_a.get(index).copied().unwrap_or(0) & GOOD_OUTPUT_DATA != 0
    }

    /// All output universes in slot order.
    pub fn output_ports(&self) -> impl Iterator<Item = Port> + '_ {
        (0..self.port_count()).filter_map(move |i| self.output_port(i))
    }
}

impl Packet for ArtPollReply {
    const OPCODE: OpCode = OpCode::PollReply;
    const MIN_SIZE: usize = POLL_REPLY_MIN_SIZE;

    fn decode_body(buf: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            ip: read_ipv4(buf, 10),
            port: LittleEndian::read_u16(&buf[14..16]),
            firmware_version: BigEndian::read_u16(&buf[16..18]),
            net_switch: buf[18] & 0x7f,
            sub_switch: buf[19] & 0x0f,
            oem: BigEndian::read_u16(&buf[20..22]),
            ubea_version: buf[22],
            status1: buf[23],
            esta_manufacturer: LittleEndian::read_u16(&buf[24..26]),
            short_name: read_str(&buf[26..44]),
            long_name: read_str(&buf[44..108]),
            node_report: read_str(&buf[108..172]),
            num_ports: BigEndian::read_u16(&buf[172..174]),
            port_types: array_or_zero(buf, 174),
            good_input: array_or_zero(buf, 178),
            good_output_a: array_or_zero(buf, 182),
            sw_in: array_or_zero(buf, 186),
            sw_out: array_or_zero(buf, 190),
            acn_priority: buf[194],
            sw_macro: buf[195],
            sw_remote: buf[196],
            style: buf[200],
            mac: array_or_zero(buf, 201),
            bind_ip: read_ipv4(buf, 207),
            bind_index: u8_or_zero(buf, 211),
            status2: u8_or_zero(buf, 212),
            good_output_b: array_or_zero(buf, 213),
            status3: u8_or_zero(buf, 217),
            default_responder: Uid::from_bytes(array_or_zero(buf, 218)),
            user: be_u16_or_zero(buf, 224),
            refresh_rate: be_u16_or_zero(buf, 226),
        })
    }

    fn encoded_len(&self) -> usize {
        POLL_REPLY_SIZE
    }

    fn encode_body(&self, buf: &mut [u8]) {
        buf[10..14].copy_from_slice(&self.ip.octets());
        LittleEndian::write_u16(&mut buf[14..16], self.port);
        BigEndian::write_u16(&mut buf[16..18], self.firmware_version);
        buf[18] = self.net_switch & 0x7f;
        buf[19] = self.sub_switch & 0x0f;
        BigEndian::write_u16(&mut buf[20..22], self.oem);
        buf[22] = self.ubea_version;
        buf[23] = self.status1;
        LittleEndian::write_u16(&mut buf[24..26], self.esta_manufacturer);
        write_str(&mut buf[26..44], &self.short_name);
        write_str(&mut buf[44..108], &self.long_name);
        write_str(&mut buf[108..172], &self.node_report);
        BigEndian::write_u16(&mut buf[172..174], self.num_ports);
        buf[174..178].copy_from_slice(&self.port_types);
        buf[178..182].copy_from_slice(&self.good_input);
        buf[182..186].copy_from_slice(&self.good_output_a);
        buf[186..190].copy_from_slice(&self.sw_in);
        buf[190..194].copy_from_slice(&self.sw_out);
        buf[194] = self.acn_priority;
        buf[195] = self.sw_macro;
        buf[196] = self.sw_remote;
        buf[200] = self.style;
        buf[201..207].copy_from_slice(&self.mac);
        buf[207..211].copy_from_slice(&self.bind_ip.octets());
        buf[211] = self.bind_index;
        buf[212] = self.status2;
        buf[213..217].copy_from_slice(&self.good_output_b);
        buf[217] = self.status3;
        buf[218..224].copy_from_slice(self.default_responder.as_bytes());
        BigEndian::write_u16(&mut buf[224..226], self.user);
        BigEndian::write_u16(&mut buf[226..228], self.refresh_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_packet, Message};

    fn sample_reply() -> ArtPollReply {
        ArtPollReply {
            ip: Ipv4Addr::new(2, 0, 0, 10),
            firmware_version: 0x0102,
            net_switch: 3,
            sub_switch: 1,
            oem: 0x2b00,
            status1: STATUS1_RDM_CAPABLE,
            esta_manufacturer: 0x7a70,
            short_name: "Short".into(),
            long_name: "A rather longer node name".into(),
            node_report: "#0001 [0042] OK".into(),
            num_ports: 2,
            port_types: [PORT_TYPE_OUTPUT, PORT_TYPE_OUTPUT | PORT_TYPE_INPUT, 0, 0],
            good_output_a: [GOOD_OUTPUT_MERGE_LTP, 0, 0, 0],
            sw_in: [0, 7, 0, 0],
            sw_out: [4, 5, 0, 0],
            style: 0,
            mac: [0, 1, 2, 3, 4, 5],
            bind_ip: Ipv4Addr::new(2, 0, 0, 10),
            bind_index: 2,
            good_output_b: [0, GOOD_OUTPUT_B_RDM_DISABLED, 0, 0],
            default_responder: Uid::new(0x7a70, 0x0000_0001),
            refresh_rate: 44,
            ..Default::default()
        }
    }

    #[test]
    fn test_poll_reply_round_trip() {
        let reply = sample_reply();
        let bytes = Message::PollReply(Box::new(reply.clone())).to_bytes();
        assert_eq!(bytes.len(), POLL_REPLY_SIZE);
        let decoded = decode_packet::<ArtPollReply>(&bytes).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn test_poll_reply_has_no_version_field() {
        let bytes = Message::PollReply(Box::new(sample_reply())).to_bytes();
        assert_eq!(&bytes[10..14], &[2, 0, 0, 10]);
        assert_eq!(LittleEndian::read_u16(&bytes[14..16]), ARTNET_PORT);
    }

    #[test]
    fn test_short_legacy_reply_zeroes_tail() {
        let bytes = Message::PollReply(Box::new(sample_reply())).to_bytes();
        let decoded = decode_packet::<ArtPollReply>(&bytes[..POLL_REPLY_MIN_SIZE]).unwrap();
        assert_eq!(decoded.mac, [0, 1, 2, 3, 4, 5]);
        assert_eq!(decoded.bind_ip, Ipv4Addr::UNSPECIFIED);
        assert_eq!(decoded.bind_index, 0);
        assert_eq!(decoded.refresh_rate, 0);
        assert!(decode_packet::<ArtPollReply>(&bytes[..POLL_REPLY_MIN_SIZE - 1]).is_err());
    }

    #[test]
    fn test_port_accessors() {
        let reply = sample_reply();
        assert_eq!(reply.output_port(0), Some(Port::new(3, 1, 4)));
        assert_eq!(reply.output_port(1), Some(Port::new(3, 1, 5)));
        assert_eq!(reply.output_port(2), None);
        assert_eq!(reply.input_port(0), None);
        assert_eq!(reply.input_port(1), Some(Port::new(3, 1, 7)));
        assert_eq!(reply.merge_mode(0), MergeMode::Ltp);
        assert_eq!(reply.merge_mode(1), MergeMode::Htp);
        assert!(reply.output_rdm_enabled(0));
        assert!(!reply.output_rdm_enabled(1));
        assert_eq!(reply.output_ports().count(), 2);
    }

    #[test]
    fn test_num_ports_is_capped_at_four() {
        let reply = ArtPollReply {
            num_ports: 9,
            port_types: [PORT_TYPE_OUTPUT; 4],
            ..Default::default()
        };
        assert_eq!(reply.port_count(), 4);
        assert_eq!(reply.output_ports().count(), 4);
    }

    #[test]
    fn test_poll_round_trip_and_short_form() {
        let poll = ArtPoll::targeted(Port::new(0, 0, 1), Port::new(0, 1, 0));
        let bytes = Message::Poll(poll).to_bytes();
        assert_eq!(decode_packet::<ArtPoll>(&bytes).unwrap(), poll);

        // Art-Net 3 controllers send only flags and priority
        let short = decode_packet::<ArtPoll>(&bytes[..14]).unwrap();
        assert_eq!(short.flags, poll_flags::TARGETED_MODE);
        assert_eq!(short.target_top, 0);
    }
}
