//! Addressing types shared by the codec, the transport and discovery.
//!
//! - [`Uid`]: 48-bit RDM device identifier.
//! - [`Port`]: Art-Net port-address (net, sub-net, universe).
//! - [`NodeAddr`]: identity of one logical node (bind address and bind index).
//! - [`PortAddr`]: one universe on one logical node.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use crate::error::Error;
use crate::protocol::{ArtPollReply, ARTNET_PORT};

// -------------------------------------------------------------------------------------------------
//  Uid
// -------------------------------------------------------------------------------------------------

/// RDM unique identifier: 16-bit ESTA manufacturer code and 32-bit device id.
///
/// Ordering is by the raw bytes, which equals ordering by (manufacturer, device).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Uid([u8; 6]);

impl Uid {
    /// Addresses every responder.
    pub const BROADCAST: Uid = Uid([0xff; 6]);

    pub const fn new(manufacturer: u16, device: u32) -> Self {
        let m = manufacturer.to_be_bytes();
        let d = device.to_be_bytes();
        Uid([m[0], m[1], d[0], d[1], d[2], d[3]])
    }

    /// Addresses every responder of one manufacturer.
    pub const fn vendorcast(manufacturer: u16) -> Self {
        Self::new(manufacturer, 0xffff_ffff)
    }

    pub const fn from_bytes(bytes: [u8; 6]) -> Self {
        Uid(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn manufacturer(&self) -> u16 {
        u16::from_be_bytes([self.0[0], self.0[1]])
    }

    pub fn device(&self) -> u32 {
        u32::from_be_bytes([self.0[2], self.0[3], self.0[4], self.0[5]])
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// True for manufacturer broadcasts, false for the all-manufacturer broadcast.
    pub fn is_vendorcast(&self) -> bool {
        self.device() == 0xffff_ffff && !self.is_broadcast()
    }

    /// Whether a message sent to `self` reaches `other`, or the other way round.
    ///
    /// Holds when the two are equal, when either is [`Uid::BROADCAST`], or when
    /// either is the vendorcast of the other's manufacturer.
    pub fn matches(&self, other: &Uid) -> bool {
        if self == other || self.is_broadcast() || other.is_broadcast() {
            return true;
        }
        let same_vendor = self.manufacturer() == other.manufacturer();
        same_vendor && (self.is_vendorcast() || other.is_vendorcast())
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:08x}", self.manufacturer(), self.device())
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", self)
    }
}

impl FromStr for Uid {
    type Err = Error;

    /// Parses `mmmm:dddddddd` (hex).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::msg(format!("invalid RDM UID '{}'", s));
        let (m, d) = s.split_once(':').ok_or_else(invalid)?;
        if m.is_empty() || m.len() > 4 || d.is_empty() || d.len() > 8 {
            return Err(invalid());
        }
        let manufacturer = u16::from_str_radix(m, 16).map_err(|_| invalid())?;
        let device = u32::from_str_radix(d, 16).map_err(|_| invalid())?;
        Ok(Uid::new(manufacturer, device))
    }
}

// -------------------------------------------------------------------------------------------------
//  Port
// -------------------------------------------------------------------------------------------------

/// Art-Net port-address: net (0-127), sub-net (0-15), universe (0-15).
///
/// Ordering follows the 15-bit packed value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Port {
    net: u8,
    subnet: u8,
    universe: u8,
}

impl Port {
    /// Builds a port-address, masking each part to its field width.
    pub fn new(net: u8, subnet: u8, universe: u8) -> Self {
        Self {
            net: net & 0x7f,
            subnet: subnet & 0x0f,
            universe: universe & 0x0f,
        }
    }

    /// Like [`Port::new`] but rejects out-of-range parts.
    pub fn try_new(net: u8, subnet: u8, universe: u8) -> Result<Self, Error> {
        if net > 0x7f || subnet > 0x0f || universe > 0x0f {
            return Err(Error::InvalidConfig(format!(
                "port-address {}.{}.{} out of range",
                net, subnet, universe
            )));
        }
        Ok(Self::new(net, subnet, universe))
    }

    /// From the 15-bit packed form `net << 8 | sub << 4 | universe`.
    pub fn from_packed(value: u16) -> Self {
        Self::new((value >> 8) as u8, (value >> 4) as u8, value as u8)
    }

    /// From a net and the legacy 8-bit `sub << 4 | universe` byte.
    pub fn from_net_and_sub_uni(net: u8, sub_uni: u8) -> Self {
        Self::new(net, sub_uni >> 4, sub_uni)
    }

    pub fn net(&self) -> u8 {
        self.net
    }

    pub fn subnet(&self) -> u8 {
        self.subnet
    }

    pub fn universe(&self) -> u8 {
        self.universe
    }

    /// 15-bit packed form.
    pub fn packed(&self) -> u16 {
        u16::from(self.net) << 8 | u16::from(self.subnet) << 4 | u16::from(self.universe)
    }

    /// Legacy 8-bit form without the net.
    pub fn sub_uni(&self) -> u8 {
        self.subnet << 4 | self.universe
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.net, self.subnet, self.universe)
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Port({})", self)
    }
}

impl FromStr for Port {
    type Err = Error;

    /// Accepts `net.sub.universe`, `sub.universe` or the packed decimal value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::msg(format!("invalid port-address '{}'", s));
        let parts = s
            .split('.')
            .map(|p| p.trim().parse::<u16>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        match parts.as_slice() {
            [packed] if *packed <= 0x7fff => Ok(Port::from_packed(*packed)),
            [sub, uni] if *sub <= 0x0f && *uni <= 0x0f => Ok(Port::new(0, *sub as u8, *uni as u8)),
            [net, sub, uni] if *net <= 0x7f && *sub <= 0x0f && *uni <= 0x0f => {
                Ok(Port::new(*net as u8, *sub as u8, *uni as u8))
            }
            _ => Err(invalid()),
        }
    }
}

// -------------------------------------------------------------------------------------------------
//  NodeAddr
// -------------------------------------------------------------------------------------------------

/// Identity of one logical Art-Net node.
///
/// A physical device with more than four ports answers a poll with one reply
/// per bind index, all sharing a root address. Equality, ordering and hashing
/// use only `(root, bind_index)`; the reachable socket is carried along so
/// requests can be addressed but never takes part in identity.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeAddr {
    root: Ipv4Addr,
    bind_index: u8,
    socket: SocketAddrV4,
}

impl NodeAddr {
    /// Bind index 0 is read as 1, the value pre-Art-Net 3 nodes imply.
    pub fn new(root: Ipv4Addr, bind_index: u8, socket: SocketAddrV4) -> Self {
        Self {
            root,
            bind_index: bind_index.max(1),
            socket,
        }
    }

    /// Derives the identity of the node that sent `reply` from `sender`.
    ///
    /// The reachable address is the one the reply advertises, or the UDP
    /// sender when the reply carries 0.0.0.0. The root is the bind IP when
    /// set, else the reachable IP.
    pub fn from_reply(reply: &ArtPollReply, sender: SocketAddr) -> Self {
        let sender = match sender {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(v6) => {
                let ip = v6.ip().to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED);
                SocketAddrV4::new(ip, v6.port())
            }
        };
        let socket = if reply.ip.is_unspecified() {
            sender
        } else {
            let port = if reply.port == 0 { ARTNET_PORT } else { reply.port };
            SocketAddrV4::new(reply.ip, port)
        };
        let root = if reply.bind_ip.is_unspecified() {
            *socket.ip()
        } else {
            reply.bind_ip
        };
        Self::new(root, reply.bind_index, socket)
    }

    pub fn root(&self) -> Ipv4Addr {
        self.root
    }

    pub fn bind_index(&self) -> u8 {
        self.bind_index
    }

    /// Where requests for this node are sent.
    pub fn socket(&self) -> SocketAddrV4 {
        self.socket
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(self.socket)
    }

    fn key(&self) -> (Ipv4Addr, u8) {
        (self.root, self.bind_index)
    }
}

impl PartialEq for NodeAddr {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for NodeAddr {}

impl Hash for NodeAddr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for NodeAddr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeAddr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.root, self.bind_index)
    }
}

/// One universe on one logical node; the unit a table of devices belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PortAddr {
    pub node: NodeAddr,
    pub port: Port,
}

impl PortAddr {
    pub fn new(node: NodeAddr, port: Port) -> Self {
        Self { node, port }
    }
}

impl fmt::Display for PortAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.port)
    }
}

/// Converts a socket address to IPv4 when it is one.
pub(crate) fn ipv4_of(addr: &SocketAddr) -> Option<Ipv4Addr> {
    match addr.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(ip) => ip.to_ipv4_mapped(),
    }
}
