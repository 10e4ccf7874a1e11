//! Raw packet builders and parsers for the mock node.

use std::net::Ipv4Addr;

use crate::config::{MockBinding, NodeConfig};
use crate::constants::*;

/// Header shared by every versioned Art-Net packet.
fn header(opcode: u16, size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; size];
    buf[..8].copy_from_slice(ARTNET_ID);
    buf[8..10].copy_from_slice(&opcode.to_le_bytes());
    buf[10..12].copy_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    buf
}

fn write_name(buf: &mut [u8], name: &str) {
    let len = name.len().min(buf.len() - 1);
    buf[..len].copy_from_slice(&name.as_bytes()[..len]);
}

/// Opcode of an Art-Net datagram, or `None` if it is not one.
pub fn parse_opcode(data: &[u8]) -> Option<u16> {
    if data.len() < 10 || &data[..8] != ARTNET_ID {
        return None;
    }
    Some(u16::from_le_bytes([data[8], data[9]]))
}

/// Builds the ArtPollReply for one binding.
pub fn build_poll_reply(
    config: &NodeConfig,
    binding: &MockBinding,
    ip: Ipv4Addr,
    port: u16,
) -> Vec<u8> {
    // ArtPollReply has no protocol version field
    let mut buf = vec![0u8; POLL_REPLY_SIZE];
    buf[..8].copy_from_slice(ARTNET_ID);
    buf[8..10].copy_from_slice(&OP_POLL_REPLY.to_le_bytes());
    buf[10..14].copy_from_slice(&ip.octets());
    buf[14..16].copy_from_slice(&port.to_le_bytes());
    buf[16..18].copy_from_slice(&0x0100u16.to_be_bytes());
    buf[18] = config.net;
    buf[19] = config.subnet;
    buf[23] = STATUS1_RDM_CAPABLE;
    buf[24..26].copy_from_slice(&config.esta_manufacturer.to_le_bytes());
    write_name(&mut buf[26..44], &config.short_name);
    write_name(&mut buf[44..108], &config.long_name);
    write_name(&mut buf[108..172], "#0001 [0000] Power On Tests successful");

    let ports = binding.ports.len().min(4);
    buf[172..174].copy_from_slice(&(ports as u16).to_be_bytes());
    for (i, port) in binding.ports.iter().take(4).enumerate() {
        buf[174 + i] = PORT_TYPE_OUTPUT;
        buf[182 + i] = GOOD_OUTPUT_DATA;
        buf[190 + i] = port.universe & 0x0f;
    }
    buf[207..211].copy_from_slice(&config.bind_ip.octets());
    buf[211] = binding.bind_index;
    buf
}

/// Builds one ArtTodData block. `uids` must fit one block.
pub fn build_tod_data(
    net: u8,
    port_number: u8,
    bind_index: u8,
    address: u8,
    response: u8,
    uids: &[[u8; 6]],
) -> Vec<u8> {
    let count = uids.len().min(200);
    let mut buf = header(OP_TOD_DATA, 28 + count * 6);
    buf[12] = 0x01;
    buf[13] = port_number;
    buf[20] = bind_index;
    buf[21] = net;
    buf[22] = response;
    buf[23] = address;
    buf[24..26].copy_from_slice(&(count as u16).to_be_bytes());
    buf[26] = 0;
    buf[27] = count as u8;
    for (slot, uid) in buf[28..].chunks_exact_mut(6).zip(uids) {
        slot.copy_from_slice(uid);
    }
    buf
}

/// (net, address) of an ArtTodControl with command flush, or any
/// ArtTodRequest: the universes it asks for.
pub fn parse_tod_query(data: &[u8]) -> Option<(u8, Vec<u8>)> {
    match parse_opcode(data)? {
        OP_TOD_CONTROL if data.len() >= 24 && data[22] == TOD_FLUSH => {
            Some((data[21], vec![data[23]]))
        }
        OP_TOD_REQUEST if data.len() >= 24 => {
            let count = usize::from(data[23]).min(data.len() - 24);
            Some((data[21], data[24..24 + count].to_vec()))
        }
        _ => None,
    }
}

/// RDM request carried in an ArtRdm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RdmRequest {
    pub net: u8,
    pub address: u8,
    pub destination: [u8; 6],
    pub source: [u8; 6],
    pub transaction: u8,
    pub sub_device: u16,
    pub command: u8,
    pub pid: u16,
    pub data: Vec<u8>,
}

pub fn rdm_checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(u16::from(RDM_START_CODE), |sum, &b| sum.wrapping_add(u16::from(b)))
}

/// Parses an ArtRdm datagram, checking the RDM checksum.
pub fn parse_rdm_request(data: &[u8]) -> Option<RdmRequest> {
    if parse_opcode(data)? != OP_RDM || data.len() < 24 + RDM_HEADER_SIZE + 2 {
        return None;
    }
    let rdm = &data[24..];
    if rdm[0] != RDM_SUB_START_CODE {
        return None;
    }
    let pdl = usize::from(rdm[22]);
    let end = RDM_HEADER_SIZE + pdl;
    if rdm.len() < end + 2 || usize::from(rdm[1]) != end + 1 {
        return None;
    }
    if rdm_checksum(&rdm[..end]) != u16::from_be_bytes([rdm[end], rdm[end + 1]]) {
        return None;
    }
    let mut destination = [0u8; 6];
    let mut source = [0u8; 6];
    destination.copy_from_slice(&rdm[2..8]);
    source.copy_from_slice(&rdm[8..14]);
    Some(RdmRequest {
        net: data[21],
        address: data[23],
        destination,
        source,
        transaction: rdm[14],
        sub_device: u16::from_be_bytes([rdm[17], rdm[18]]),
        command: rdm[19],
        pid: u16::from_be_bytes([rdm[20], rdm[21]]),
        data: rdm[RDM_HEADER_SIZE..end].to_vec(),
    })
}

/// Builds the ArtRdm carrying the response to `request`.
pub fn build_rdm_response(
    request: &RdmRequest,
    transaction: u8,
    response_type: u8,
    data: &[u8],
) -> Vec<u8> {
    let pdl = data.len().min(231);
    let end = RDM_HEADER_SIZE + pdl;
    let mut buf = header(OP_RDM, 24 + end + 2);
    buf[12] = 0x01;
    buf[21] = request.net;
    buf[22] = 0x00;
    buf[23] = request.address;

    let rdm = &mut buf[24..];
    rdm[0] = RDM_SUB_START_CODE;
    rdm[1] = (end + 1) as u8;
    rdm[2..8].copy_from_slice(&request.source);
    rdm[8..14].copy_from_slice(&request.destination);
    rdm[14] = transaction;
    rdm[15] = response_type;
    rdm[16] = 0;
    rdm[17..19].copy_from_slice(&request.sub_device.to_be_bytes());
    rdm[19] = match request.command {
        RDM_SET => RDM_SET_RESPONSE,
        _ => RDM_GET_RESPONSE,
    };
    rdm[20..22].copy_from_slice(&request.pid.to_be_bytes());
    rdm[22] = pdl as u8;
    rdm[RDM_HEADER_SIZE..end].copy_from_slice(&data[..pdl]);
    let sum = rdm_checksum(&rdm[..end]);
    rdm[end..end + 2].copy_from_slice(&sum.to_be_bytes());
    buf
}

/// NACK_REASON response carrying `reason`.
pub fn build_rdm_nack(request: &RdmRequest, reason: u16) -> Vec<u8> {
    build_rdm_response(
        request,
        request.transaction,
        RDM_NACK_REASON,
        &reason.to_be_bytes(),
    )
}

/// Label parameter data: the text, at most 32 bytes, no terminator.
pub fn label(text: &str) -> Vec<u8> {
    text.as_bytes().iter().take(32).copied().collect()
}
