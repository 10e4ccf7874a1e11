//! Discovered nodes and merging of per-bind-index replies.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

use crate::protocol::{ArtPollReply, MergeMode};
use crate::types::{NodeAddr, Port, PortAddr};

/// Ports described by one ArtPollReply.
const PORTS_PER_REPLY: u16 = 4;

/// One ArtPollReply as received during a discovery cycle.
///
/// Two nodes are equal when their [`NodeAddr`] is: a retransmitted reply
/// describes the same node.
#[derive(Debug, Clone)]
pub struct Node {
    addr: NodeAddr,
    reply: Box<ArtPollReply>,
    rtt: Duration,
    sender: SocketAddr,
}

impl Node {
    pub fn new(reply: Box<ArtPollReply>, sender: SocketAddr, rtt: Duration) -> Self {
        Self {
            addr: NodeAddr::from_reply(&reply, sender),
            reply,
            rtt,
            sender,
        }
    }

    pub fn addr(&self) -> NodeAddr {
        self.addr
    }

    pub fn reply(&self) -> &ArtPollReply {
        &self.reply
    }

    /// Time from sending the poll to receiving this reply.
    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    /// UDP source of the reply.
    pub fn sender(&self) -> SocketAddr {
        self.sender
    }

    pub fn short_name(&self) -> &str {
        &self.reply.short_name
    }

    pub fn long_name(&self) -> &str {
        &self.reply.long_name
    }

    pub fn node_report(&self) -> &str {
        &self.reply.node_report
    }

    pub fn firmware_version(&self) -> u16 {
        self.reply.firmware_version
    }

    pub fn esta_manufacturer(&self) -> u16 {
        self.reply.esta_manufacturer
    }

    pub fn rdm_capable(&self) -> bool {
        self.reply.rdm_capable()
    }

    /// Output universes this reply advertises, in slot order.
    pub fn output_ports(&self) -> impl Iterator<Item = Port> + '_ {
        self.reply.output_ports()
    }

    /// Ports of this reply, numbered from its bind index.
    pub fn ports(&self) -> Vec<NodePort> {
        let base = (u16::from(self.addr.bind_index()) - 1) * PORTS_PER_REPLY;
        (0..self.reply.port_count())
            .filter_map(|slot| {
                let input = self.reply.input_port(slot);
                let output = self.reply.output_port(slot).map(|port| OutputPort {
                    port,
                    merge_mode: self.reply.merge_mode(slot),
                    rdm: self.reply.output_rdm_enabled(slot),
                });
                if input.is_none() && output.is_none() {
                    return None;
                }
                Some(NodePort {
                    number: base + slot as u16 + 1,
                    node: self.addr,
                    slot,
                    input,
                    output,
                })
            })
            .collect()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.addr, self.reply.short_name)
    }
}

/// A DMX output on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPort {
    pub port: Port,
    pub merge_mode: MergeMode,
    /// RDM is enabled on this output.
    pub rdm: bool,
}

/// One physical port of a merged node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePort {
    /// 1-based port number across the whole device.
    pub number: u16,
    /// Logical node whose reply listed this port.
    pub node: NodeAddr,
    /// Slot (0-3) within that reply.
    pub slot: usize,
    pub input: Option<Port>,
    pub output: Option<OutputPort>,
}

impl NodePort {
    /// Routable address of the output, if this port outputs DMX.
    pub fn output_addr(&self) -> Option<PortAddr> {
        self.output.map(|o| PortAddr::new(self.node, o.port))
    }
}

/// Every reply from one reachable address, combined into one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedNode {
    socket: SocketAddrV4,
    nodes: Vec<Node>,
    ports: Vec<NodePort>,
}

impl MergedNode {
    pub fn socket(&self) -> SocketAddrV4 {
        self.socket
    }

    /// The replies, ordered by bind index.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Ports ordered by number, without duplicates.
    pub fn ports(&self) -> &[NodePort] {
        &self.ports
    }

    pub fn output_ports(&self) -> impl Iterator<Item = &NodePort> + '_ {
        self.ports.iter().filter(|p| p.output.is_some())
    }

    /// Reply with the lowest bind index, which names the device.
    pub fn primary(&self) -> &Node {
        &self.nodes[0]
    }

    pub fn short_name(&self) -> &str {
        self.primary().short_name()
    }

    pub fn long_name(&self) -> &str {
        self.primary().long_name()
    }

    pub fn node_report(&self) -> &str {
        self.primary().node_report()
    }

    pub fn firmware_version(&self) -> u16 {
        self.primary().firmware_version()
    }

    pub fn esta_manufacturer(&self) -> u16 {
        self.primary().esta_manufacturer()
    }

    pub fn rdm_capable(&self) -> bool {
        self.nodes.iter().any(Node::rdm_capable)
    }
}

impl fmt::Display for MergedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} ({} ports)",
            self.short_name(),
            self.socket,
            self.ports.len()
        )
    }
}

/// Groups nodes by reachable address.
///
/// Duplicate replies for one [`NodeAddr`] count once (the first is kept), so
/// merging is idempotent. The result is ordered by address.
pub fn merge_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Vec<MergedNode> {
    let mut groups: BTreeMap<SocketAddrV4, BTreeMap<NodeAddr, &Node>> = BTreeMap::new();
    for node in nodes {
        groups
            .entry(node.addr.socket())
            .or_default()
            .entry(node.addr)
            .or_insert(node);
    }

    groups
        .into_iter()
        .map(|(socket, members)| {
            let mut ports: BTreeMap<u16, NodePort> = BTreeMap::new();
            for node in members.values() {
                for port in node.ports() {
                    match ports.entry(port.number) {
                        Entry::Vacant(slot) => {
                            slot.insert(port);
                        }
                        Entry::Occupied(kept) if kept.get().node != port.node => log::debug!(
                            "{}: port {} of {} dropped, {} already owns that number",
                            socket,
                            port.number,
                            port.node,
                            kept.get().node
                        ),
                        Entry::Occupied(_) => {}
                    }
                }
            }
            MergedNode {
                socket,
                nodes: members.into_values().cloned().collect(),
                ports: ports.into_values().collect(),
            }
        })
        .collect()
}
