//! End-to-end discovery tests against mock Art-Net nodes on loopback.
//!
//! Each mock node binds an ephemeral port on 127.0.0.1 and advertises it in
//! its ArtPollReply, so replies, table-of-devices requests and RDM traffic
//! all stay on loopback.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use artnet_mock_node::{
    MockArtNetNode, MockBinding, MockPort, MockResponder, NodeBehavior, NodeConfig, NodeHandle,
    SimpleBehavior, OP_TOD_CONTROL, OP_TOD_REQUEST,
};
use artnet_rdm::{
    Channel, ChannelConfig, Discovery, DiscoveryConfig, Port, PortAddr, TodMode, Uid,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn spawn_node<B: NodeBehavior>(config: NodeConfig, behavior: B) -> NodeHandle {
    MockArtNetNode::new(config, behavior)
        .expect("Should bind mock node")
        .spawn()
        .expect("Should spawn mock node")
}

fn loopback_channel() -> Arc<Channel> {
    Arc::new(Channel::open(&ChannelConfig::new().with_ports(vec![0])).expect("Should open channel"))
}

fn fast_config(targets: Vec<SocketAddr>) -> DiscoveryConfig {
    DiscoveryConfig::new()
        .with_targets(targets)
        .with_poll_reply_wait(Duration::from_millis(300))
        .with_tod_data_wait(Duration::from_millis(400))
        .with_tick(Duration::from_millis(10))
}

/// Two bindings on one socket (three outputs) plus a single-output node.
fn two_nodes() -> (NodeHandle, NodeHandle) {
    let a = NodeConfig::new("Rack A")
        .with_bind_ip(Ipv4Addr::new(10, 0, 0, 1))
        .with_bindings(vec![
            MockBinding::new(
                1,
                vec![
                    MockPort::new(0).with_responder(MockResponder::new(0x7ff0, 1)),
                    MockPort::new(1)
                        .with_responder(MockResponder::new(0x7ff0, 2))
                        .with_responder(MockResponder::new(0x7ff0, 3)),
                ],
            ),
            MockBinding::new(2, vec![MockPort::new(3)]),
        ]);
    let b = NodeConfig::new("Rack B")
        .with_bind_ip(Ipv4Addr::new(10, 0, 0, 2))
        .with_bindings(vec![MockBinding::new(
            1,
            vec![MockPort::new(2).with_responder(MockResponder::new(0x7ff0, 4))],
        )]);
    (
        spawn_node(a, SimpleBehavior),
        spawn_node(b, SimpleBehavior),
    )
}

/// Counts TOD traffic, then answers everything.
#[derive(Default)]
struct CountingBehavior {
    tod_controls: Arc<AtomicUsize>,
    tod_requests: Arc<AtomicUsize>,
    refuse: bool,
}

impl NodeBehavior for CountingBehavior {
    fn on_packet_received(&mut self, raw_data: &[u8]) {
        match artnet_mock_node::parse_opcode(raw_data) {
            Some(OP_TOD_CONTROL) => {
                self.tod_controls.fetch_add(1, Ordering::SeqCst);
            }
            Some(OP_TOD_REQUEST) => {
                self.tod_requests.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }

    fn should_respond(&self, _opcode: u16) -> bool {
        true
    }

    fn refuse_tod(&self) -> bool {
        self.refuse
    }
}

/// Hears everything, answers nothing.
struct SilentBehavior {
    received: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl NodeBehavior for SilentBehavior {
    fn on_packet_received(&mut self, raw_data: &[u8]) {
        self.received.lock().unwrap().push(raw_data.to_vec());
    }

    fn should_respond(&self, _opcode: u16) -> bool {
        false
    }
}

fn node_for(snapshot: &artnet_rdm::DiscoverySnapshot, bind_ip: [u8; 4], bind_index: u8) -> artnet_rdm::NodeAddr {
    snapshot
        .nodes()
        .iter()
        .map(|n| n.addr())
        .find(|a| a.root() == Ipv4Addr::from(bind_ip) && a.bind_index() == bind_index)
        .expect("Node should be discovered")
}

#[test]
fn test_discovers_nodes_and_merges_bindings() {
    init_logging();
    let (a, b) = two_nodes();

    let config = fast_config(vec![a.target(), b.target()]).with_rdm_discovery(false);
    let discovery = Discovery::with_transport(config, loopback_channel()).unwrap();
    let snapshot = discovery.refresh().unwrap();

    assert_eq!(snapshot.nodes().len(), 3);
    assert_eq!(snapshot.unique_nodes().len(), 2);

    let mut port_counts: Vec<usize> = snapshot
        .unique_nodes()
        .iter()
        .map(|n| n.output_ports().count())
        .collect();
    port_counts.sort_unstable();
    assert_eq!(port_counts, vec![1, 3]);

    let rack_a = snapshot
        .unique_nodes()
        .iter()
        .find(|n| n.short_name() == "Rack A")
        .unwrap();
    assert_eq!(rack_a.socket().port(), a.addr.port());
    let numbers: Vec<u16> = rack_a.ports().iter().map(|p| p.number).collect();
    // bind 2 slot 0 follows the four slots of bind 1
    assert_eq!(numbers, vec![1, 2, 5]);
    assert!(rack_a.rdm_capable());

    assert_eq!(snapshot.nodes_for_port(Port::new(0, 0, 2)).len(), 1);
    assert!(snapshot.uids().is_empty());
}

#[test]
fn test_collects_tables_of_devices() {
    init_logging();
    let (a, b) = two_nodes();

    let discovery =
        Discovery::with_transport(fast_config(vec![a.target(), b.target()]), loopback_channel())
            .unwrap();
    let snapshot = discovery.refresh().unwrap();

    let rack_a1 = node_for(&snapshot, [10, 0, 0, 1], 1);
    let on_universe_1 = snapshot
        .uids_on(&PortAddr::new(rack_a1, Port::new(0, 0, 1)))
        .expect("Universe 1 should have a table");
    assert_eq!(
        on_universe_1.iter().copied().collect::<Vec<_>>(),
        vec![Uid::new(0x7ff0, 2), Uid::new(0x7ff0, 3)]
    );

    let rack_a2 = node_for(&snapshot, [10, 0, 0, 1], 2);
    let empty = snapshot.uids_on(&PortAddr::new(rack_a2, Port::new(0, 0, 3)));
    assert!(empty.map_or(true, |uids| uids.is_empty()));

    assert_eq!(snapshot.all_uids().len(), 4);
    let located = snapshot.locate(Uid::new(0x7ff0, 4)).unwrap();
    assert_eq!(located.node.root(), Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(located.port, Port::new(0, 0, 2));
}

#[test]
fn test_flush_mode_sends_one_control_per_output() {
    init_logging();
    let behavior = CountingBehavior::default();
    let controls = Arc::clone(&behavior.tod_controls);
    let requests = Arc::clone(&behavior.tod_requests);
    let node = spawn_node(
        NodeConfig::new("Counter").with_bindings(vec![MockBinding::new(
            1,
            vec![MockPort::new(0), MockPort::new(1)],
        )]),
        behavior,
    );

    let discovery =
        Discovery::with_transport(fast_config(vec![node.target()]), loopback_channel()).unwrap();
    discovery.refresh().unwrap();

    assert_eq!(controls.load(Ordering::SeqCst), 2);
    assert_eq!(requests.load(Ordering::SeqCst), 0);
}

#[test]
fn test_request_mode_reads_cached_tables() {
    init_logging();
    let behavior = CountingBehavior::default();
    let controls = Arc::clone(&behavior.tod_controls);
    let requests = Arc::clone(&behavior.tod_requests);
    let node = spawn_node(
        NodeConfig::new("Cached").with_bindings(vec![MockBinding::new(
            1,
            vec![
                MockPort::new(0).with_responder(MockResponder::new(0x7ff0, 9)),
                MockPort::new(1),
            ],
        )]),
        behavior,
    );

    let config = fast_config(vec![node.target()]).with_tod_mode(TodMode::Request);
    let discovery = Discovery::with_transport(config, loopback_channel()).unwrap();
    let snapshot = discovery.refresh().unwrap();

    // both outputs share net 0, so one request covers them
    assert_eq!(requests.load(Ordering::SeqCst), 1);
    assert_eq!(controls.load(Ordering::SeqCst), 0);
    assert_eq!(
        snapshot.all_uids().into_iter().collect::<Vec<_>>(),
        vec![Uid::new(0x7ff0, 9)]
    );
}

#[test]
fn test_refused_table_leaves_node_without_devices() {
    init_logging();
    let behavior = CountingBehavior {
        refuse: true,
        ..Default::default()
    };
    let node = spawn_node(
        NodeConfig::new("Refuser").with_bindings(vec![MockBinding::new(
            1,
            vec![MockPort::new(0).with_responder(MockResponder::new(0x7ff0, 5))],
        )]),
        behavior,
    );

    let discovery =
        Discovery::with_transport(fast_config(vec![node.target()]), loopback_channel()).unwrap();
    let snapshot = discovery.refresh().unwrap();

    assert_eq!(snapshot.unique_nodes().len(), 1);
    assert!(snapshot.all_uids().is_empty());
}

#[test]
fn test_silent_node_yields_empty_snapshot() {
    init_logging();
    let received = Arc::new(Mutex::new(Vec::new()));
    let node = spawn_node(
        NodeConfig::new("Silent"),
        SilentBehavior {
            received: Arc::clone(&received),
        },
    );

    let discovery =
        Discovery::with_transport(fast_config(vec![node.target()]), loopback_channel()).unwrap();
    let snapshot = discovery.refresh().unwrap();

    assert!(snapshot.is_empty());
    assert!(snapshot.duration() >= Duration::from_millis(300));
    let polls = received
        .lock()
        .unwrap()
        .iter()
        .filter(|p| artnet_mock_node::parse_opcode(p) == Some(artnet_mock_node::OP_POLL))
        .count();
    assert_eq!(polls, 1);
}

#[test]
fn test_repeated_refresh_replaces_snapshot() {
    init_logging();
    let (a, b) = two_nodes();

    let config = fast_config(vec![a.target(), b.target()]).with_rdm_discovery(false);
    let discovery = Discovery::with_transport(config, loopback_channel()).unwrap();
    let first = discovery.refresh().unwrap();

    drop(b);
    let second = discovery.refresh().unwrap();

    assert_eq!(first.unique_nodes().len(), 2);
    assert_eq!(second.unique_nodes().len(), 1);
    assert!(Arc::ptr_eq(&second, &discovery.snapshot()));
    assert!(second.timestamp() >= first.timestamp());
}
