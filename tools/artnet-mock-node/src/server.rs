//! Core mock Art-Net node implementation.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::behavior::NodeBehavior;
use crate::config::{MockResponder, NodeConfig};
use crate::constants::*;
use crate::packet_builder::*;

/// A responder and the output it sits on.
#[derive(Clone, Debug)]
struct Attached {
    bind_index: u8,
    /// 1-based port number within its binding.
    port_number: u8,
    address: u8,
    responder: MockResponder,
}

type Responders = Arc<Mutex<Vec<Attached>>>;

/// A mock Art-Net node with pluggable behavior.
pub struct MockArtNetNode<B: NodeBehavior> {
    socket: UdpSocket,
    config: NodeConfig,
    behavior: B,
    running: Arc<AtomicBool>,
    responders: Responders,
}

impl<B: NodeBehavior> MockArtNetNode<B> {
    /// Create a new mock node with the given configuration and behavior.
    pub fn new(config: NodeConfig, behavior: B) -> io::Result<Self> {
        let socket = UdpSocket::bind(config.bind_address)?;
        socket.set_read_timeout(Some(config.read_timeout))?;

        log::info!("Mock Art-Net node listening on {}", socket.local_addr()?);

        let address_base = config.subnet << 4;
        let responders = config
            .bindings
            .iter()
            .flat_map(|binding| {
                binding.ports.iter().enumerate().flat_map(move |(i, port)| {
                    port.responders.iter().map(move |responder| Attached {
                        bind_index: binding.bind_index,
                        port_number: i as u8 + 1,
                        address: address_base | (port.universe & 0x0f),
                        responder: responder.clone(),
                    })
                })
            })
            .collect();

        Ok(Self {
            socket,
            config,
            behavior,
            running: Arc::new(AtomicBool::new(true)),
            responders: Arc::new(Mutex::new(responders)),
        })
    }

    /// Get the node's local address.
    pub fn addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the node in a background thread and return a handle.
    pub fn spawn(self) -> io::Result<NodeHandle> {
        let addr = self.addr()?;
        let running = Arc::clone(&self.running);
        let responders = Arc::clone(&self.responders);

        let handle = thread::spawn(move || {
            self.run();
        });

        Ok(NodeHandle {
            addr,
            running,
            responders,
            handle: Some(handle),
        })
    }

    /// Run the node loop (blocking).
    pub fn run(mut self) {
        let mut buf = [0u8; 2048];

        while self.running.load(Ordering::SeqCst) {
            let (len, src) = match self.socket.recv_from(&mut buf) {
                Ok(result) => result,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    continue
                }
                Err(e) => {
                    log::error!("Socket error: {}", e);
                    break;
                }
            };

            let data = &buf[..len];
            self.behavior.on_packet_received(data);

            let Some(opcode) = parse_opcode(data) else {
                continue;
            };
            if !self.behavior.should_respond(opcode) {
                log::debug!("Ignoring opcode 0x{:04X} (should_respond=false)", opcode);
                continue;
            }

            let latency = self.behavior.get_simulated_latency();
            if !latency.is_zero() {
                thread::sleep(latency);
            }

            match opcode {
                OP_POLL => self.answer_poll(src),
                OP_TOD_CONTROL | OP_TOD_REQUEST => {
                    if let Some((net, addresses)) = parse_tod_query(data) {
                        log::debug!("Received TOD query for {:?} from {}", addresses, src);
                        self.answer_tod(src, net, &addresses);
                    }
                }
                OP_RDM => match parse_rdm_request(data) {
                    Some(request) => self.answer_rdm(src, &request),
                    None => log::debug!("Malformed ArtRdm from {}", src),
                },
                _ => log::trace!("Unhandled opcode 0x{:04X} from {}", opcode, src),
            }
        }

        log::info!("Mock Art-Net node stopped");
    }

    fn send(&self, data: &[u8], target: SocketAddr) {
        if let Err(e) = self.socket.send_to(data, target) {
            log::warn!("Send to {} failed: {}", target, e);
        }
    }

    fn answer_poll(&self, src: SocketAddr) {
        log::debug!("Received ArtPoll from {}", src);
        let (ip, port) = match self.socket.local_addr() {
            Ok(SocketAddr::V4(local)) => (*local.ip(), local.port()),
            _ => (Ipv4Addr::LOCALHOST, ARTNET_PORT),
        };
        let ip = self.config.reply_ip.unwrap_or(ip);
        for binding in &self.config.bindings {
            let reply = build_poll_reply(&self.config, binding, ip, port);
            self.send(&reply, src);
        }
    }

    fn answer_tod(&self, src: SocketAddr, net: u8, addresses: &[u8]) {
        if net != self.config.net {
            return;
        }
        let responders = self.responders.lock().unwrap_or_else(|e| e.into_inner());
        for binding in &self.config.bindings {
            for (i, port) in binding.ports.iter().enumerate() {
                let address = (self.config.subnet << 4) | (port.universe & 0x0f);
                if !addresses.contains(&address) {
                    continue;
                }
                let reply = if self.behavior.refuse_tod() {
                    build_tod_data(net, i as u8 + 1, binding.bind_index, address, TOD_NAK, &[])
                } else {
                    let uids: Vec<[u8; 6]> = responders
                        .iter()
                        .filter(|a| a.bind_index == binding.bind_index && a.address == address)
                        .map(|a| a.responder.uid)
                        .collect();
                    build_tod_data(net, i as u8 + 1, binding.bind_index, address, TOD_FULL, &uids)
                };
                self.send(&reply, src);
            }
        }
    }

    fn answer_rdm(&self, src: SocketAddr, request: &RdmRequest) {
        if request.net != self.config.net {
            return;
        }
        let mut responders = self.responders.lock().unwrap_or_else(|e| e.into_inner());
        let Some(attached) = responders
            .iter_mut()
            .find(|a| a.address == request.address && a.responder.uid == request.destination)
        else {
            log::trace!("No responder for RDM request from {}", src);
            return;
        };
        log::debug!(
            "RDM 0x{:02X} PID 0x{:04X} for port {} from {}",
            request.command,
            request.pid,
            attached.port_number,
            src
        );

        if self.behavior.send_stale_rdm_reply() {
            let stale = build_rdm_response(
                request,
                request.transaction.wrapping_sub(1),
                RDM_ACK,
                &[],
            );
            self.send(&stale, src);
        }

        let reply = match respond(&mut attached.responder, request) {
            Ok(data) => build_rdm_response(request, request.transaction, RDM_ACK, &data),
            Err(reason) => build_rdm_nack(request, reason),
        };
        self.send(&reply, src);
    }
}

/// Parameter data for an ACK, or a NACK reason.
fn respond(device: &mut MockResponder, request: &RdmRequest) -> Result<Vec<u8>, u16> {
    let data = &request.data;
    match (request.command, request.pid) {
        (RDM_GET, PID_SUPPORTED_PARAMETERS) => Ok([
            PID_DEVICE_MODEL_DESCRIPTION,
            PID_MANUFACTURER_LABEL,
            PID_DEVICE_LABEL,
            PID_DMX_PERSONALITY,
            PID_DMX_PERSONALITY_DESCRIPTION,
            PID_SENSOR_DEFINITION,
            PID_SENSOR_VALUE,
        ]
        .iter()
        .flat_map(|pid| pid.to_be_bytes())
        .collect()),
        (RDM_GET, PID_DEVICE_INFO) => {
            let mut out = Vec::with_capacity(19);
            out.extend_from_slice(&0x0100u16.to_be_bytes());
            out.extend_from_slice(&device.model_id.to_be_bytes());
            out.extend_from_slice(&0x0101u16.to_be_bytes());
            out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
            out.extend_from_slice(&device.footprint().to_be_bytes());
            out.push(device.current_personality);
            out.push(device.personalities.len() as u8);
            out.extend_from_slice(&device.dmx_start_address.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes());
            out.push(device.sensors.len() as u8);
            Ok(out)
        }
        (RDM_GET, PID_MANUFACTURER_LABEL) => Ok(label(&device.manufacturer_label)),
        (RDM_GET, PID_DEVICE_MODEL_DESCRIPTION) => Ok(label(&device.model_description)),
        (RDM_GET, PID_SOFTWARE_VERSION_LABEL) => Ok(label(&device.software_version_label)),
        (RDM_GET, PID_DEVICE_LABEL) => Ok(label(&device.device_label)),
        (RDM_SET, PID_DEVICE_LABEL) => {
            device.device_label = String::from_utf8_lossy(&data[..data.len().min(32)]).into_owned();
            Ok(Vec::new())
        }
        (RDM_GET, PID_DMX_START_ADDRESS) => Ok(device.dmx_start_address.to_be_bytes().to_vec()),
        (RDM_SET, PID_DMX_START_ADDRESS) => {
            if data.len() != 2 {
                return Err(NR_FORMAT_ERROR);
            }
            let address = u16::from_be_bytes([data[0], data[1]]);
            if !(1..=512).contains(&address) {
                return Err(NR_DATA_OUT_OF_RANGE);
            }
            device.dmx_start_address = address;
            Ok(Vec::new())
        }
        (RDM_GET, PID_DMX_PERSONALITY) => {
            Ok(vec![device.current_personality, device.personalities.len() as u8])
        }
        (RDM_SET, PID_DMX_PERSONALITY) => {
            let number = *data.first().ok_or(NR_FORMAT_ERROR)?;
            if number == 0 || usize::from(number) > device.personalities.len() {
                return Err(NR_DATA_OUT_OF_RANGE);
            }
            device.current_personality = number;
            Ok(Vec::new())
        }
        (RDM_GET, PID_DMX_PERSONALITY_DESCRIPTION) => {
            let number = *data.first().ok_or(NR_FORMAT_ERROR)?;
            let (footprint, name) = device
                .personalities
                .get(usize::from(number).wrapping_sub(1))
                .ok_or(NR_DATA_OUT_OF_RANGE)?;
            let mut out = vec![number];
            out.extend_from_slice(&footprint.to_be_bytes());
            out.extend_from_slice(&label(name));
            Ok(out)
        }
        (RDM_GET, PID_SENSOR_DEFINITION) => {
            let number = *data.first().ok_or(NR_FORMAT_ERROR)?;
            let name = device
                .sensors
                .get(usize::from(number))
                .ok_or(NR_DATA_OUT_OF_RANGE)?;
            // temperature in degrees Celsius, range -40..120, normal 0..80
            let mut out = vec![number, 0x00, 0x01, 0x00];
            for value in [-40i16, 120, 0, 80] {
                out.extend_from_slice(&value.to_be_bytes());
            }
            out.push(0x03);
            out.extend_from_slice(&label(name));
            Ok(out)
        }
        (RDM_GET, PID_SENSOR_VALUE) => {
            let number = *data.first().ok_or(NR_FORMAT_ERROR)?;
            if usize::from(number) >= device.sensors.len() {
                return Err(NR_DATA_OUT_OF_RANGE);
            }
            let value = device.sensor_value;
            let mut out = vec![number];
            for v in [value, value - 5, value + 5, value] {
                out.extend_from_slice(&v.to_be_bytes());
            }
            Ok(out)
        }
        (RDM_SET, PID_IDENTIFY_DEVICE) => {
            device.identify = *data.first().ok_or(NR_FORMAT_ERROR)? != 0;
            Ok(Vec::new())
        }
        (RDM_GET, PID_IDENTIFY_DEVICE) => Ok(vec![u8::from(device.identify)]),
        _ => Err(NR_UNKNOWN_PID),
    }
}

/// Handle for controlling a spawned node.
pub struct NodeHandle {
    /// The node's local address.
    pub addr: SocketAddr,
    running: Arc<AtomicBool>,
    responders: Responders,
    handle: Option<JoinHandle<()>>,
}

impl NodeHandle {
    /// Current state of the responder with `uid`.
    pub fn responder(&self, uid: [u8; 6]) -> Option<MockResponder> {
        self.responders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|a| a.responder.uid == uid)
            .map(|a| a.responder.clone())
    }

    /// Loopback-reachable address, for polling a node bound to 0.0.0.0.
    pub fn target(&self) -> SocketAddr {
        match self.addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => {
                SocketAddr::from((Ipv4Addr::LOCALHOST, self.addr.port()))
            }
            _ => self.addr,
        }
    }

    /// Stop the node.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
