//! Cached model of one RDM responder.

use byteorder::{BigEndian, ByteOrder};
use std::collections::BTreeSet;

use super::params::{
    encode_label, parse_label, parse_supported_parameters, DeviceInfo, Personality,
    SensorDefinition, SensorValue,
};
use super::request::{RdmRequester, RdmTarget};
use super::{NackReason, ParameterId, RdmPacket, ResponseType};
use crate::error::{Error, Result};
use crate::types::{PortAddr, Uid};

/// An RDM responder behind one node port, with the parameters read at load time.
#[derive(Debug, Clone)]
pub struct RdmDevice {
    uid: Uid,
    location: PortAddr,
    info: DeviceInfo,
    supported: BTreeSet<ParameterId>,
    manufacturer_label: Option<String>,
    model_description: Option<String>,
    software_version_label: Option<String>,
    personalities: Vec<Personality>,
    sensors: Vec<SensorDefinition>,
}

impl RdmDevice {
    /// Reads the device's description.
    ///
    /// DEVICE_INFO must answer; everything after it is best effort.
    /// Personalities and sensors stop at the first entry that fails.
    pub fn load(requester: &RdmRequester, uid: Uid, location: PortAddr) -> Result<Self> {
        let target = RdmTarget::node(&location);
        let reply = query(requester, &target, uid, ParameterId::DeviceInfo, &[])?;
        let info = DeviceInfo::parse(&reply.data)?;

        let listed = query(requester, &target, uid, ParameterId::SupportedParameters, &[]);
        let supported = match listed {
            Ok(reply) => parse_supported_parameters(&reply.data),
            Err(e) => {
                log::debug!("{}: no supported parameter list: {}", uid, e);
                BTreeSet::new()
            }
        };

        let mut device = Self {
            uid,
            location,
            info,
            supported,
            manufacturer_label: None,
            model_description: None,
            software_version_label: None,
            personalities: Vec::new(),
            sensors: Vec::new(),
        };

        device.manufacturer_label = device.read_label(requester, ParameterId::ManufacturerLabel);
        device.model_description =
            device.read_label(requester, ParameterId::DeviceModelDescription);
        device.software_version_label =
            device.read_label(requester, ParameterId::SoftwareVersionLabel);

        if device.is_usable(ParameterId::DmxPersonalityDescription) {
            for number in 1..=device.info.personality_count {
                let reply = query(
                    requester,
                    &target,
                    uid,
                    ParameterId::DmxPersonalityDescription,
                    &[number],
                );
                match reply.and_then(|r| Ok(Personality::parse(&r.data)?)) {
                    Ok(personality) => device.personalities.push(personality),
                    Err(e) => {
                        log::debug!("{}: personality {} unavailable: {}", uid, number, e);
                        break;
                    }
                }
            }
        }

        if device.is_usable(ParameterId::SensorDefinition) {
            for number in 0..device.info.sensor_count {
                let reply =
                    query(requester, &target, uid, ParameterId::SensorDefinition, &[number]);
                match reply.and_then(|r| Ok(SensorDefinition::parse(&r.data)?)) {
                    Ok(sensor) => device.sensors.push(sensor),
                    Err(e) => {
                        log::debug!("{}: sensor {} unavailable: {}", uid, number, e);
                        break;
                    }
                }
            }
        }

        log::debug!(
            "loaded RDM device {} at {}: {} personalities, {} sensors",
            uid,
            device.location,
            device.personalities.len(),
            device.sensors.len()
        );
        Ok(device)
    }

    fn read_label(&self, requester: &RdmRequester, pid: ParameterId) -> Option<String> {
        if !self.is_usable(pid) {
            return None;
        }
        match self.get(requester, pid, &[]) {
            Ok(reply) => Some(parse_label(&reply.data)),
            Err(e) => {
                log::debug!("{}: {} unavailable: {}", self.uid, pid, e);
                None
            }
        }
    }

    fn get(&self, requester: &RdmRequester, pid: ParameterId, data: &[u8]) -> Result<RdmPacket> {
        query(requester, &RdmTarget::node(&self.location), self.uid, pid, data)
    }

    fn set(&self, requester: &RdmRequester, pid: ParameterId, data: &[u8]) -> Result<RdmPacket> {
        let reply = requester
            .set(&RdmTarget::node(&self.location), self.uid, pid, data)
            .ok_or(Error::NoResponse { pid })?;
        check_ack(pid, reply)
    }

    /// Re-reads DEVICE_INFO.
    pub fn refresh(&mut self, requester: &RdmRequester) -> Result<()> {
        let reply = self.get(requester, ParameterId::DeviceInfo, &[])?;
        self.info = DeviceInfo::parse(&reply.data)?;
        Ok(())
    }

    /// Whether `pid` may be used: it is mandatory or the device lists it.
    pub fn is_usable(&self, pid: ParameterId) -> bool {
        pid.is_mandatory() || self.supported.contains(&pid)
    }

    /// Sets the DMX start address (1-512) and refreshes the cached info.
    pub fn set_dmx_address(&mut self, requester: &RdmRequester, address: u16) -> Result<()> {
        if !(1..=512).contains(&address) {
            return Err(Error::InvalidConfig(format!(
                "DMX start address {} outside 1-512",
                address
            )));
        }
        let mut data = [0u8; 2];
        BigEndian::write_u16(&mut data, address);
        self.set(requester, ParameterId::DmxStartAddress, &data)?;
        self.refresh(requester)
    }

    /// Selects a personality (1-based) and refreshes the cached info.
    pub fn set_personality(&mut self, requester: &RdmRequester, personality: u8) -> Result<()> {
        if personality == 0 || personality > self.info.personality_count {
            return Err(Error::InvalidConfig(format!(
                "personality {} outside 1-{}",
                personality, self.info.personality_count
            )));
        }
        self.set(requester, ParameterId::DmxPersonality, &[personality])?;
        self.refresh(requester)
    }

    pub fn device_label(&self, requester: &RdmRequester) -> Result<String> {
        let reply = self.get(requester, ParameterId::DeviceLabel, &[])?;
        Ok(parse_label(&reply.data))
    }

    pub fn set_device_label(&self, requester: &RdmRequester, label: &str) -> Result<()> {
        self.set(requester, ParameterId::DeviceLabel, &encode_label(label))
            .map(|_| ())
    }

    /// Turns the identify function (usually a flashing lamp) on or off.
    pub fn identify(&self, requester: &RdmRequester, on: bool) -> Result<()> {
        self.set(requester, ParameterId::IdentifyDevice, &[u8::from(on)])
            .map(|_| ())
    }

    pub fn sensor_value(&self, requester: &RdmRequester, sensor: u8) -> Result<SensorValue> {
        let reply = self.get(requester, ParameterId::SensorValue, &[sensor])?;
        Ok(SensorValue::parse(&reply.data)?)
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn location(&self) -> &PortAddr {
        &self.location
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn supported_parameters(&self) -> &BTreeSet<ParameterId> {
        &self.supported
    }

    /// Listed parameters this crate has a name for.
    pub fn standard_parameters(&self) -> impl Iterator<Item = ParameterId> + '_ {
        self.supported
            .iter()
            .copied()
            .filter(|pid| !matches!(pid, ParameterId::Other(_)))
    }

    /// Raw codes of listed parameters with no [`ParameterId`] variant.
    pub fn unrecognized_parameters(&self) -> impl Iterator<Item = u16> + '_ {
        self.supported.iter().filter_map(|pid| match pid {
            ParameterId::Other(code) => Some(*code),
            _ => None,
        })
    }

    pub fn manufacturer_label(&self) -> Option<&str> {
        self.manufacturer_label.as_deref()
    }

    pub fn model_description(&self) -> Option<&str> {
        self.model_description.as_deref()
    }

    pub fn software_version_label(&self) -> Option<&str> {
        self.software_version_label.as_deref()
    }

    pub fn personalities(&self) -> &[Personality] {
        &self.personalities
    }

    pub fn sensors(&self) -> &[SensorDefinition] {
        &self.sensors
    }

    pub fn dmx_start_address(&self) -> u16 {
        self.info.dmx_start_address
    }

    pub fn dmx_footprint(&self) -> u16 {
        self.info.dmx_footprint
    }

    pub fn current_personality(&self) -> Option<&Personality> {
        self.personalities
            .iter()
            .find(|p| p.number == self.info.current_personality)
    }
}

/// GET that must come back as ACK.
fn query(
    requester: &RdmRequester,
    target: &RdmTarget,
    uid: Uid,
    pid: ParameterId,
    data: &[u8],
) -> Result<RdmPacket> {
    let reply = requester
        .get(target, uid, pid, data)
        .ok_or(Error::NoResponse { pid })?;
    check_ack(pid, reply)
}

fn check_ack(pid: ParameterId, reply: RdmPacket) -> Result<RdmPacket> {
    match reply.response_type() {
        Some(ResponseType::Ack) => Ok(reply),
        Some(ResponseType::NackReason) => Err(Error::Nack {
            pid,
            reason: reply
                .nack_reason()
                .unwrap_or(NackReason::Other(0xffff)),
        }),
        other => Err(Error::UnexpectedResponse {
            pid,
            detail: format!("{:?}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RdmConfig;
    use crate::protocol::{ArtRdm, Message};
    use crate::rdm::CommandClass;
    use crate::transport::testing::FakeTransport;
    use crate::types::{NodeAddr, Port};
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const DEVICE: Uid = Uid::new(0x4c55, 0x0000_0042);

    fn location() -> PortAddr {
        let ip = Ipv4Addr::new(10, 0, 0, 5);
        PortAddr::new(NodeAddr::new(ip, 1, SocketAddrV4::new(ip, 6454)), Port::new(0, 0, 1))
    }

    /// Minimal responder state for the fake transport.
    struct Fixture {
        info: DeviceInfo,
        supported: Vec<u16>,
        personalities: Vec<(u16, &'static str)>,
        sensors: usize,
        label: String,
    }

    fn answer(fixture: &Mutex<Fixture>, request: &RdmPacket) -> RdmPacket {
        let mut f = fixture.lock().unwrap();
        let ack = |data: Vec<u8>| request.reply(ResponseType::Ack, data);
        let nack = |reason: NackReason| {
            request.reply(ResponseType::NackReason, reason.code().to_be_bytes().to_vec())
        };
        match (request.command, request.pid()) {
            (CommandClass::Get, ParameterId::DeviceInfo) => ack(f.info.to_bytes()),
            (CommandClass::Get, ParameterId::SupportedParameters) => {
                ack(f.supported.iter().flat_map(|p| p.to_be_bytes()).collect())
            }
            (CommandClass::Get, ParameterId::ManufacturerLabel) => ack(b"Acme".to_vec()),
            (CommandClass::Get, ParameterId::DeviceModelDescription) => ack(b"Par 64".to_vec()),
            (CommandClass::Get, ParameterId::SoftwareVersionLabel) => ack(b"1.0.3".to_vec()),
            (CommandClass::Get, ParameterId::DmxPersonalityDescription) => {
                let n = request.data[0];
                match f.personalities.get(usize::from(n) - 1) {
                    Some((footprint, name)) => {
                        let mut data = vec![n];
                        data.extend_from_slice(&footprint.to_be_bytes());
                        data.extend_from_slice(name.as_bytes());
                        ack(data)
                    }
                    None => nack(NackReason::DataOutOfRange),
                }
            }
            (CommandClass::Get, ParameterId::SensorDefinition) => {
                let n = request.data[0];
                if usize::from(n) < f.sensors {
                    let mut data = vec![n, 0, 1, 0, 0, 0, 0, 100, 0, 0, 0, 80, 0];
                    data.extend_from_slice(b"Temp");
                    ack(data)
                } else {
                    nack(NackReason::DataOutOfRange)
                }
            }
            (CommandClass::Get, ParameterId::SensorValue) => {
                ack(vec![request.data[0], 0, 42, 0, 40, 0, 44, 0, 0])
            }
            (CommandClass::Get, ParameterId::DeviceLabel) => ack(f.label.as_bytes().to_vec()),
            (CommandClass::Set, ParameterId::DeviceLabel) => {
                f.label = String::from_utf8_lossy(&request.data).into_owned();
                ack(vec![])
            }
            (CommandClass::Set, ParameterId::DmxStartAddress) => {
                f.info.dmx_start_address = u16::from_be_bytes([request.data[0], request.data[1]]);
                ack(vec![])
            }
            (CommandClass::Set, ParameterId::DmxPersonality) => {
                let n = request.data[0];
                f.info.current_personality = n;
                f.info.dmx_footprint = f.personalities[usize::from(n) - 1].0;
                ack(vec![])
            }
            (CommandClass::Set, ParameterId::IdentifyDevice) => ack(vec![]),
            _ => nack(NackReason::UnknownPid),
        }
    }

    fn setup(fixture: Fixture) -> (Arc<FakeTransport>, RdmRequester, Arc<Mutex<Fixture>>) {
        let transport = FakeTransport::new();
        let state = Arc::new(Mutex::new(fixture));
        let responder = state.clone();
        transport.respond_with(move |message, target| match message {
            Message::Rdm(rdm) if rdm.packet.destination == DEVICE => {
                let reply = answer(&responder, &rdm.packet);
                vec![(Message::Rdm(ArtRdm::new(rdm.universe(), reply)), target)]
            }
            _ => Vec::new(),
        });
        let requester = RdmRequester::new(
            transport.clone(),
            RdmConfig::new().with_timeout(Duration::from_millis(200)),
        );
        (transport, requester, state)
    }

    fn full_fixture() -> Fixture {
        Fixture {
            info: DeviceInfo {
                protocol_version: 0x0100,
                model_id: 7,
                dmx_footprint: 3,
                current_personality: 1,
                personality_count: 3,
                dmx_start_address: 1,
                sensor_count: 2,
                ..Default::default()
            },
            supported: vec![0x0080, 0x0081, 0x0082, 0x00e0, 0x00e1, 0x0200, 0x0201, 0x8001],
            // the third personality is missing on purpose
            personalities: vec![(3, "RGB"), (4, "RGBW")],
            sensors: 2,
            label: "Front wash".into(),
        }
    }

    #[test]
    fn test_load_reads_description() {
        let (_t, requester, _state) = setup(full_fixture());
        let device = RdmDevice::load(&requester, DEVICE, location()).unwrap();
        assert_eq!(device.uid(), DEVICE);
        assert_eq!(device.info().model_id, 7);
        assert_eq!(device.manufacturer_label(), Some("Acme"));
        assert_eq!(device.model_description(), Some("Par 64"));
        assert_eq!(device.software_version_label(), Some("1.0.3"));
        // stops at the first personality that fails
        assert_eq!(device.personalities().len(), 2);
        assert_eq!(device.personalities()[1].description, "RGBW");
        assert_eq!(device.sensors().len(), 2);
        assert_eq!(device.sensors()[0].description, "Temp");
        assert_eq!(device.current_personality().map(|p| p.footprint), Some(3));
        assert_eq!(device.standard_parameters().count(), 7);
        assert_eq!(device.unrecognized_parameters().collect::<Vec<_>>(), vec![0x8001]);
    }

    #[test]
    fn test_load_without_supported_list_uses_mandatory_only() {
        let mut fixture = full_fixture();
        fixture.supported.clear();
        let (_t, requester, _state) = setup(fixture);
        let device = RdmDevice::load(&requester, DEVICE, location()).unwrap();
        assert!(device.supported_parameters().is_empty());
        assert!(device.is_usable(ParameterId::SoftwareVersionLabel));
        assert!(!device.is_usable(ParameterId::ManufacturerLabel));
        assert_eq!(device.manufacturer_label(), None);
        assert_eq!(device.software_version_label(), Some("1.0.3"));
        assert!(device.personalities().is_empty());
        assert!(device.sensors().is_empty());
    }

    #[test]
    fn test_load_fails_without_device_info() {
        let transport = FakeTransport::new();
        let requester = RdmRequester::new(
            transport,
            RdmConfig::new().with_timeout(Duration::from_millis(50)),
        );
        let err = RdmDevice::load(&requester, DEVICE, location()).unwrap_err();
        assert!(matches!(
            err,
            Error::NoResponse {
                pid: ParameterId::DeviceInfo
            }
        ));
    }

    #[test]
    fn test_set_dmx_address_refreshes_info() {
        let (transport, requester, _state) = setup(full_fixture());
        let mut device = RdmDevice::load(&requester, DEVICE, location()).unwrap();
        let before = transport.sent().len();
        device.set_dmx_address(&requester, 101).unwrap();
        assert_eq!(device.dmx_start_address(), 101);
        // one SET and one DEVICE_INFO GET
        assert_eq!(transport.sent().len(), before + 2);
        assert!(device.set_dmx_address(&requester, 0).is_err());
        assert!(device.set_dmx_address(&requester, 513).is_err());
    }

    #[test]
    fn test_set_personality_updates_footprint() {
        let (_t, requester, _state) = setup(full_fixture());
        let mut device = RdmDevice::load(&requester, DEVICE, location()).unwrap();
        device.set_personality(&requester, 2).unwrap();
        assert_eq!(device.info().current_personality, 2);
        assert_eq!(device.dmx_footprint(), 4);
        assert!(device.set_personality(&requester, 4).is_err());
    }

    #[test]
    fn test_label_identify_and_sensor() {
        let (_t, requester, state) = setup(full_fixture());
        let device = RdmDevice::load(&requester, DEVICE, location()).unwrap();
        assert_eq!(device.device_label(&requester).unwrap(), "Front wash");
        device.set_device_label(&requester, "Back light").unwrap();
        assert_eq!(state.lock().unwrap().label, "Back light");
        device.identify(&requester, true).unwrap();
        let value = device.sensor_value(&requester, 1).unwrap();
        assert_eq!(value.number, 1);
        assert_eq!(value.present, 42);
    }

    #[test]
    fn test_nack_surfaces_reason() {
        let (_t, requester, _state) = setup(full_fixture());
        let target = RdmTarget::node(&location());
        let err = query(&requester, &target, DEVICE, ParameterId::LampHours, &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Nack {
                pid: ParameterId::LampHours,
                reason: NackReason::UnknownPid
            }
        ));
    }
}
