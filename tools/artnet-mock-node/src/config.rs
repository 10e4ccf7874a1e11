//! Configuration types for the mock node.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// An RDM responder attached to a mock output.
#[derive(Clone, Debug)]
pub struct MockResponder {
    pub uid: [u8; 6],
    pub model_id: u16,
    pub manufacturer_label: String,
    pub model_description: String,
    pub software_version_label: String,
    pub device_label: String,
    pub dmx_start_address: u16,
    /// 1-based index into `personalities`.
    pub current_personality: u8,
    /// (footprint, description) per personality.
    pub personalities: Vec<(u16, String)>,
    /// Description per sensor; every sensor reads the same value.
    pub sensors: Vec<String>,
    pub sensor_value: i16,
    pub identify: bool,
}

impl MockResponder {
    pub fn new(manufacturer: u16, device: u32) -> Self {
        let mut uid = [0u8; 6];
        uid[..2].copy_from_slice(&manufacturer.to_be_bytes());
        uid[2..].copy_from_slice(&device.to_be_bytes());
        Self {
            uid,
            model_id: 0x0101,
            manufacturer_label: "Mock Lighting".to_string(),
            model_description: "Mock Fixture".to_string(),
            software_version_label: "1.0.0".to_string(),
            device_label: String::new(),
            dmx_start_address: 1,
            current_personality: 1,
            personalities: vec![(3, "RGB".to_string()), (4, "RGBW".to_string())],
            sensors: vec!["Temperature".to_string()],
            sensor_value: 35,
            identify: false,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.device_label = label.to_string();
        self
    }

    pub fn with_start_address(mut self, address: u16) -> Self {
        self.dmx_start_address = address;
        self
    }

    pub fn with_personalities(mut self, personalities: Vec<(u16, &str)>) -> Self {
        self.personalities = personalities
            .into_iter()
            .map(|(footprint, name)| (footprint, name.to_string()))
            .collect();
        self.current_personality = 1;
        self
    }

    pub fn with_sensors(mut self, sensors: Vec<&str>) -> Self {
        self.sensors = sensors.into_iter().map(str::to_string).collect();
        self
    }

    /// Footprint of the active personality.
    pub fn footprint(&self) -> u16 {
        self.personalities
            .get(usize::from(self.current_personality).saturating_sub(1))
            .map(|(footprint, _)| *footprint)
            .unwrap_or(0)
    }
}

/// One DMX output of the mock node.
#[derive(Clone, Debug)]
pub struct MockPort {
    /// Low nibble of the port-address.
    pub universe: u8,
    pub responders: Vec<MockResponder>,
}

impl MockPort {
    pub fn new(universe: u8) -> Self {
        Self {
            universe,
            responders: Vec::new(),
        }
    }

    pub fn with_responder(mut self, responder: MockResponder) -> Self {
        self.responders.push(responder);
        self
    }
}

/// One ArtPollReply the node sends; nodes with more than four ports use
/// several, one per bind index.
#[derive(Clone, Debug)]
pub struct MockBinding {
    pub bind_index: u8,
    pub ports: Vec<MockPort>,
}

impl MockBinding {
    pub fn new(bind_index: u8, ports: Vec<MockPort>) -> Self {
        Self { bind_index, ports }
    }
}

/// Static node configuration (set at construction time).
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub short_name: String,
    pub long_name: String,
    /// Root address reported in every reply.
    pub bind_ip: Ipv4Addr,
    /// Address reported in the IP field; the socket's own address when `None`.
    pub reply_ip: Option<Ipv4Addr>,
    pub net: u8,
    pub subnet: u8,
    pub esta_manufacturer: u16,
    pub bindings: Vec<MockBinding>,
    pub bind_address: SocketAddr,
    pub read_timeout: Duration,
}

impl NodeConfig {
    /// One binding with one output on universe 0.
    ///
    /// Binds to `127.0.0.1:0` by default (ephemeral port for testing).
    pub fn new(short_name: &str) -> Self {
        Self {
            short_name: short_name.to_string(),
            long_name: format!("{} mock Art-Net node", short_name),
            bind_ip: Ipv4Addr::LOCALHOST,
            reply_ip: None,
            net: 0,
            subnet: 0,
            esta_manufacturer: 0x7ff0,
            bindings: vec![MockBinding::new(1, vec![MockPort::new(0)])],
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            read_timeout: Duration::from_millis(50),
        }
    }

    /// Set the root address, which identifies the node.
    pub fn with_bind_ip(mut self, ip: Ipv4Addr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Report `ip` in the reply's IP field instead of the socket address.
    pub fn with_reply_ip(mut self, ip: Ipv4Addr) -> Self {
        self.reply_ip = Some(ip);
        self
    }

    pub fn with_switches(mut self, net: u8, subnet: u8) -> Self {
        self.net = net & 0x7f;
        self.subnet = subnet & 0x0f;
        self
    }

    pub fn with_bindings(mut self, bindings: Vec<MockBinding>) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}
