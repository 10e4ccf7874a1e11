//! Parameter data layouts for the PIDs the device model reads.

use byteorder::{BigEndian, ByteOrder};
use std::collections::BTreeSet;

use super::ParameterId;
use crate::protocol::fields::read_str;
use crate::protocol::{ensure_len, ProtocolError};

/// Longest label or description E1.20 allows.
pub const MAX_LABEL_LEN: usize = 32;

/// Decodes an RDM text parameter (ASCII, up to 32 bytes, optionally NUL padded).
pub fn parse_label(data: &[u8]) -> String {
    read_str(&data[..data.len().min(MAX_LABEL_LEN)])
}

/// Encodes a label for a SET request, cut to 32 bytes.
pub fn encode_label(label: &str) -> Vec<u8> {
    label
        .bytes()
        .take(MAX_LABEL_LEN)
        .map(|b| if b.is_ascii() { b } else { b'?' })
        .collect()
}

/// DEVICE_INFO response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub protocol_version: u16,
    pub model_id: u16,
    pub product_category: u16,
    pub software_version: u32,
    pub dmx_footprint: u16,
    /// 1-based.
    pub current_personality: u8,
    pub personality_count: u8,
    /// 1-512, or 0xffff when the device uses no slots.
    pub dmx_start_address: u16,
    pub sub_device_count: u16,
    pub sensor_count: u8,
}

impl DeviceInfo {
    pub const SIZE: usize = 19;

    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(data, Self::SIZE)?;
        Ok(Self {
            protocol_version: BigEndian::read_u16(&data[0..2]),
            model_id: BigEndian::read_u16(&data[2..4]),
            product_category: BigEndian::read_u16(&data[4..6]),
            software_version: BigEndian::read_u32(&data[6..10]),
            dmx_footprint: BigEndian::read_u16(&data[10..12]),
            current_personality: data[12],
            personality_count: data[13],
            dmx_start_address: BigEndian::read_u16(&data[14..16]),
            sub_device_count: BigEndian::read_u16(&data[16..18]),
            sensor_count: data[18],
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::SIZE];
        BigEndian::write_u16(&mut out[0..2], self.protocol_version);
        BigEndian::write_u16(&mut out[2..4], self.model_id);
        BigEndian::write_u16(&mut out[4..6], self.product_category);
        BigEndian::write_u32(&mut out[6..10], self.software_version);
        BigEndian::write_u16(&mut out[10..12], self.dmx_footprint);
        out[12] = self.current_personality;
        out[13] = self.personality_count;
        BigEndian::write_u16(&mut out[14..16], self.dmx_start_address);
        BigEndian::write_u16(&mut out[16..18], self.sub_device_count);
        out[18] = self.sensor_count;
        out
    }
}

/// Decodes a SUPPORTED_PARAMETERS response. A trailing odd byte is ignored.
pub fn parse_supported_parameters(data: &[u8]) -> BTreeSet<ParameterId> {
    data.chunks_exact(2)
        .map(|pair| ParameterId::from_code(BigEndian::read_u16(pair)))
        .collect()
}

/// One entry of DMX_PERSONALITY_DESCRIPTION.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Personality {
    pub number: u8,
    pub footprint: u16,
    pub description: String,
}

impl Personality {
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(data, 3)?;
        Ok(Self {
            number: data[0],
            footprint: BigEndian::read_u16(&data[1..3]),
            description: parse_label(&data[3..]),
        })
    }
}

/// SENSOR_DEFINITION response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDefinition {
    pub number: u8,
    pub kind: u8,
    pub unit: u8,
    pub prefix: u8,
    pub range_min: i16,
    pub range_max: i16,
    pub normal_min: i16,
    pub normal_max: i16,
    /// Bit 0: recorded value support. Bit 1: lowest/highest support.
    pub recorded_support: u8,
    pub description: String,
}

impl SensorDefinition {
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(data, 13)?;
        Ok(Self {
            number: data[0],
            kind: data[1],
            unit: data[2],
            prefix: data[3],
            range_min: BigEndian::read_i16(&data[4..6]),
            range_max: BigEndian::read_i16(&data[6..8]),
            normal_min: BigEndian::read_i16(&data[8..10]),
            normal_max: BigEndian::read_i16(&data[10..12]),
            recorded_support: data[12],
            description: parse_label(&data[13..]),
        })
    }
}

/// SENSOR_VALUE response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorValue {
    pub number: u8,
    pub present: i16,
    pub lowest: i16,
    pub highest: i16,
    pub recorded: i16,
}

impl SensorValue {
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(data, 9)?;
        Ok(Self {
            number: data[0],
            present: BigEndian::read_i16(&data[1..3]),
            lowest: BigEndian::read_i16(&data[3..5]),
            highest: BigEndian::read_i16(&data[5..7]),
            recorded: BigEndian::read_i16(&data[7..9]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_round_trip() {
        let info = DeviceInfo {
            protocol_version: 0x0100,
            model_id: 0x0203,
            product_category: 0x0101,
            software_version: 0x0102_0304,
            dmx_footprint: 12,
            current_personality: 2,
            personality_count: 3,
            dmx_start_address: 101,
            sub_device_count: 0,
            sensor_count: 1,
        };
        let bytes = info.to_bytes();
        assert_eq!(bytes.len(), DeviceInfo::SIZE);
        assert_eq!(DeviceInfo::parse(&bytes).unwrap(), info);
        assert!(DeviceInfo::parse(&bytes[..18]).is_err());
    }

    #[test]
    fn test_supported_parameters() {
        let pids = parse_supported_parameters(&[0x00, 0x82, 0x02, 0x00, 0x80, 0x01, 0x07]);
        assert_eq!(pids.len(), 3);
        assert!(pids.contains(&ParameterId::DeviceLabel));
        assert!(pids.contains(&ParameterId::SensorDefinition));
        assert!(pids.contains(&ParameterId::Other(0x8001)));
    }

    #[test]
    fn test_personality_parse() {
        let mut data = vec![2, 0x00, 0x10];
        data.extend_from_slice(b"16-bit RGB\0\0");
        let personality = Personality::parse(&data).unwrap();
        assert_eq!(personality.number, 2);
        assert_eq!(personality.footprint, 16);
        assert_eq!(personality.description, "16-bit RGB");
    }

    #[test]
    fn test_sensor_definition_and_value() {
        let mut data = vec![0, 0x00, 0x01, 0x00, 0xff, 0xd8, 0x00, 0x96, 0x00, 0x00, 0x00, 0x50, 0x03];
        data.extend_from_slice(b"Head temperature");
        let def = SensorDefinition::parse(&data).unwrap();
        assert_eq!(def.range_min, -40);
        assert_eq!(def.range_max, 150);
        assert_eq!(def.normal_max, 80);
        assert_eq!(def.description, "Head temperature");

        let value = SensorValue::parse(&[0, 0x00, 0x2a, 0xff, 0xff, 0x00, 0x40, 0x00, 0x00]).unwrap();
        assert_eq!(value.present, 42);
        assert_eq!(value.lowest, -1);
        assert_eq!(value.highest, 64);
    }

    #[test]
    fn test_label_limits() {
        assert_eq!(parse_label(&[b'a'; 40]).len(), MAX_LABEL_LEN);
        assert_eq!(encode_label(&"b".repeat(40)).len(), MAX_LABEL_LEN);
        assert_eq!(parse_label(b"Fixture\0\0\0"), "Fixture");
    }
}
