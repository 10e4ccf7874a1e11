//! Result of one completed discovery cycle.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, SystemTime};

use super::node::{merge_nodes, MergedNode, Node};
use crate::rdm::RdmTarget;
use crate::types::{NodeAddr, Port, PortAddr, Uid};

/// Immutable view of the network as of one discovery cycle.
#[derive(Debug, Clone)]
pub struct DiscoverySnapshot {
    nodes: Vec<Node>,
    unique_nodes: Vec<MergedNode>,
    node_ports: BTreeMap<Port, Vec<NodeAddr>>,
    uids: BTreeMap<PortAddr, BTreeSet<Uid>>,
    timestamp: SystemTime,
    duration: Duration,
}

impl DiscoverySnapshot {
    /// Builds a snapshot from the replies and tables a cycle collected.
    ///
    /// Nodes are deduplicated by [`NodeAddr`], first reply wins.
    pub fn build(
        nodes: impl IntoIterator<Item = Node>,
        uids: BTreeMap<PortAddr, BTreeSet<Uid>>,
        timestamp: SystemTime,
        duration: Duration,
    ) -> Self {
        let mut unique: BTreeMap<NodeAddr, Node> = BTreeMap::new();
        for node in nodes {
            unique.entry(node.addr()).or_insert(node);
        }
        let nodes: Vec<Node> = unique.into_values().collect();
        let unique_nodes = merge_nodes(&nodes);

        let mut node_ports: BTreeMap<Port, Vec<NodeAddr>> = BTreeMap::new();
        for merged in &unique_nodes {
            for port in merged.output_ports() {
                if let Some(output) = port.output {
                    let owners = node_ports.entry(output.port).or_default();
                    if !owners.contains(&port.node) {
                        owners.push(port.node);
                    }
                }
            }
        }

        Self {
            nodes,
            unique_nodes,
            node_ports,
            uids,
            timestamp,
            duration,
        }
    }

    /// A snapshot with nothing in it.
    pub fn empty() -> Self {
        Self::build(Vec::new(), BTreeMap::new(), SystemTime::now(), Duration::ZERO)
    }

    /// Every logical node, ordered by [`NodeAddr`].
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Physical devices: nodes merged by reachable address.
    pub fn unique_nodes(&self) -> &[MergedNode] {
        &self.unique_nodes
    }

    /// Output universes seen on any node, ascending.
    pub fn ports(&self) -> impl Iterator<Item = Port> + '_ {
        self.node_ports.keys().copied()
    }

    /// Universe to the nodes that output it.
    pub fn node_ports(&self) -> &BTreeMap<Port, Vec<NodeAddr>> {
        &self.node_ports
    }

    pub fn nodes_for_port(&self, port: Port) -> &[NodeAddr] {
        self.node_ports.get(&port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tables of devices by node output.
    pub fn uids(&self) -> &BTreeMap<PortAddr, BTreeSet<Uid>> {
        &self.uids
    }

    pub fn uids_on(&self, port_addr: &PortAddr) -> Option<&BTreeSet<Uid>> {
        self.uids.get(port_addr)
    }

    /// Every discovered UID once, ascending.
    pub fn all_uids(&self) -> BTreeSet<Uid> {
        self.uids.values().flatten().copied().collect()
    }

    /// First output (in [`PortAddr`] order) whose table lists `uid`.
    pub fn locate(&self, uid: Uid) -> Option<PortAddr> {
        self.uids
            .iter()
            .find(|(_, uids)| uids.contains(&uid))
            .map(|(port_addr, _)| *port_addr)
    }

    /// Where to send RDM requests for `uid`.
    pub fn rdm_target(&self, uid: Uid) -> Option<RdmTarget> {
        self.locate(uid).map(|port_addr| RdmTarget::node(&port_addr))
    }

    pub fn node(&self, addr: NodeAddr) -> Option<&Node> {
        self.nodes
            .binary_search_by(|n| n.addr().cmp(&addr))
            .ok()
            .map(|i| &self.nodes[i])
    }

    /// When the cycle started.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// How long the cycle ran.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
