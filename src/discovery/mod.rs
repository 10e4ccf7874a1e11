//! Node and RDM device discovery.
//!
//! A [`Discovery`] owns one orchestrator thread. Each [`Discovery::refresh`]
//! runs a full cycle on it:
//!
//! 1. ArtPoll is sent to every target.
//! 2. Each ArtPollReply becomes a [`Node`]. The first reply from a new
//!    [`NodeAddr`] triggers a table-of-devices request for each of its outputs.
//! 3. ArtTodData blocks are collected per output.
//! 4. When the deadline passes, nodes are merged and a [`DiscoverySnapshot`]
//!    is published.
//!
//! Cycles never overlap and always run to their deadline.
//!
//! ```no_run
//! use artnet_rdm::{ChannelConfig, Discovery, DiscoveryConfig};
//!
//! let discovery = Discovery::new(DiscoveryConfig::default(), ChannelConfig::default())?;
//! let snapshot = discovery.refresh()?;
//! for node in snapshot.unique_nodes() {
//!     println!("{}", node);
//! }
//! # Ok::<(), artnet_rdm::Error>(())
//! ```

mod node;
mod snapshot;

pub use node::{merge_nodes, MergedNode, Node, NodePort, OutputPort};
pub use snapshot::DiscoverySnapshot;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crate::config::{ChannelConfig, DiscoveryConfig, TodMode};
use crate::error::{Error, Result};
use crate::net_utils::broadcast_targets;
use crate::protocol::{
    ArtPoll, ArtPollReply, ArtTodControl, ArtTodData, ArtTodRequest, Message, TodResponse,
};
use crate::transport::{ArtNetReceiver, Channel, ReceiverId, Transport};
use crate::types::{ipv4_of, NodeAddr, Port, PortAddr, Uid};

/// Inbound messages buffered between the transport and the orchestrator.
const COMMAND_QUEUE_DEPTH: usize = 1024;

/// Where a discovery cycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No cycle has run yet.
    Idle,
    /// Waiting for ArtPollReply.
    Polling,
    /// At least one table of devices was requested; waiting for ArtTodData.
    CollectingTod,
    /// The last cycle has finished and its snapshot is published.
    Done,
}

enum Command {
    Refresh,
    Inbound(Message, SocketAddr),
    Shutdown,
}

/// State shared with `refresh()` callers, guarded by one lock.
struct Published {
    phase: Phase,
    /// Completed cycles.
    generation: u64,
    snapshot: Arc<DiscoverySnapshot>,
    /// Failure of the last cycle, taken by the caller that waited for it.
    error: Option<Error>,
    running: bool,
}

struct Shared {
    state: Mutex<Published>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Published> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: Phase) {
        self.lock().phase = phase;
    }
}

/// Where the orchestrator gets its transport.
enum TransportSource {
    /// A channel opened for each cycle and closed after it.
    PerCycle(ChannelConfig),
    /// A caller-owned transport; only a receiver is attached per cycle.
    Shared(Arc<dyn Transport>),
}

/// Forwards discovery traffic to the orchestrator thread.
struct Forwarder {
    tx: Sender<Command>,
}

impl ArtNetReceiver for Forwarder {
    fn on_message(&self, message: &Message, from: SocketAddr) {
        if !matches!(message, Message::PollReply(_) | Message::TodData(_)) {
            return;
        }
        match self.tx.try_send(Command::Inbound(message.clone(), from)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("discovery queue full, dropping {} from {}", message.opcode(), from)
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Runs discovery cycles on a dedicated thread and keeps the last result.
pub struct Discovery {
    commands: Sender<Command>,
    shared: Arc<Shared>,
    /// Serializes `refresh()` callers.
    refresh_lock: Mutex<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Discovery {
    /// Discovery that opens a [`Channel`] for each cycle.
    pub fn new(config: DiscoveryConfig, channel: ChannelConfig) -> Result<Self> {
        channel.validate()?;
        Self::spawn(config, TransportSource::PerCycle(channel))
    }

    /// Discovery over a transport the caller keeps open, for example one
    /// shared with an [`crate::rdm::RdmRequester`].
    pub fn with_transport(config: DiscoveryConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::spawn(config, TransportSource::Shared(transport))
    }

    fn spawn(config: DiscoveryConfig, source: TransportSource) -> Result<Self> {
        config.validate()?;
        let (tx, rx) = bounded(COMMAND_QUEUE_DEPTH);
        let shared = Arc::new(Shared {
            state: Mutex::new(Published {
                phase: Phase::Idle,
                generation: 0,
                snapshot: Arc::new(DiscoverySnapshot::empty()),
                error: None,
                running: true,
            }),
            changed: Condvar::new(),
        });

        let orchestrator = Orchestrator {
            config,
            source,
            commands: rx,
            forward: tx.clone(),
            shared: Arc::clone(&shared),
        };
        let handle = thread::Builder::new()
            .name("artnet-discovery".to_string())
            .spawn(move || orchestrator.run())?;

        Ok(Self {
            commands: tx,
            shared,
            refresh_lock: Mutex::new(()),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Runs one discovery cycle and returns its snapshot.
    ///
    /// Blocks for the whole cycle. Concurrent callers run one cycle each,
    /// in turn.
    pub fn refresh(&self) -> Result<Arc<DiscoverySnapshot>> {
        let _serial = self
            .refresh_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // only this caller can start a cycle, so the generation cannot move
        // between reading it and sending the command
        let target = {
            let state = self.shared.lock();
            if !state.running {
                return Err(Error::msg("discovery has shut down"));
            }
            state.generation + 1
        };
        self.commands
            .send(Command::Refresh)
            .map_err(|_| Error::msg("discovery thread has exited"))?;

        let mut state = self.shared.lock();
        while state.generation < target && state.running {
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.generation < target {
            return Err(Error::msg("discovery shut down during refresh"));
        }
        match state.error.take() {
            Some(e) => Err(e),
            None => Ok(Arc::clone(&state.snapshot)),
        }
    }

    /// Snapshot of the last completed cycle (empty before the first).
    pub fn snapshot(&self) -> Arc<DiscoverySnapshot> {
        Arc::clone(&self.shared.lock().snapshot)
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    /// Stops the orchestrator once any running cycle has finished.
    pub fn shutdown(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = self.commands.send(Command::Shutdown);
            let _ = handle.join();
        }
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Transport in use for one cycle, detached when dropped.
struct CycleTransport {
    transport: Arc<dyn Transport>,
    receiver: ReceiverId,
}

impl Drop for CycleTransport {
    fn drop(&mut self) {
        self.transport.remove_receiver(self.receiver);
    }
}

/// Collected state of the running cycle.
struct Cycle {
    transport: CycleTransport,
    started: Instant,
    started_at: SystemTime,
    deadline: Instant,
    nodes: Vec<Node>,
    seen: BTreeSet<NodeAddr>,
    /// (sender, bind index) to node, for matching ArtTodData.
    senders: HashMap<(SocketAddr, u8), NodeAddr>,
    uids: BTreeMap<PortAddr, BTreeSet<Uid>>,
}

struct Orchestrator {
    config: DiscoveryConfig,
    source: TransportSource,
    commands: Receiver<Command>,
    forward: Sender<Command>,
    shared: Arc<Shared>,
}

impl Orchestrator {
    fn run(self) {
        let mut stopping = false;
        while !stopping {
            match self.commands.recv() {
                Ok(Command::Refresh) => {
                    let outcome = self
                        .start_cycle()
                        .map(|cycle| self.run_cycle(cycle, &mut stopping));
                    self.publish(outcome);
                }
                // stray traffic between cycles
                Ok(Command::Inbound(..)) => {}
                Ok(Command::Shutdown) | Err(_) => stopping = true,
            }
        }

        let mut state = self.shared.lock();
        state.running = false;
        drop(state);
        self.shared.changed.notify_all();
        log::debug!("discovery thread stopped");
    }

    fn open_transport(&self) -> Result<Arc<dyn Transport>> {
        match &self.source {
            TransportSource::Shared(transport) => Ok(Arc::clone(transport)),
            TransportSource::PerCycle(config) => {
                let channel = Channel::open(config)?;
                if channel.is_empty() {
                    return Err(Error::NoSockets);
                }
                Ok(Arc::new(channel))
            }
        }
    }

    fn targets(&self) -> Vec<SocketAddr> {
        if self.config.targets.is_empty() {
            broadcast_targets(self.config.port)
        } else {
            self.config.targets.clone()
        }
    }

    fn start_cycle(&self) -> Result<Cycle> {
        let transport = self.open_transport()?;
        let receiver = transport.add_receiver(Arc::new(Forwarder {
            tx: self.forward.clone(),
        }));
        let transport = CycleTransport {
            transport,
            receiver,
        };

        self.shared.set_phase(Phase::Polling);
        let started = Instant::now();
        let poll = Message::Poll(ArtPoll {
            flags: self.config.poll_flags,
            ..Default::default()
        });
        let targets = self.targets();
        let mut sent = 0;
        for target in &targets {
            if transport.transport.send(&poll, *target) {
                sent += 1;
            } else {
                log::warn!("failed to send ArtPoll to {}", target);
            }
        }
        log::debug!("discovery started: polled {} of {} targets", sent, targets.len());

        Ok(Cycle {
            transport,
            started,
            started_at: SystemTime::now(),
            deadline: started + self.config.cycle_budget(),
            nodes: Vec::new(),
            seen: BTreeSet::new(),
            senders: HashMap::new(),
            uids: BTreeMap::new(),
        })
    }

    /// Handles traffic until the deadline passes, checking it every tick.
    fn run_cycle(&self, mut cycle: Cycle, stopping: &mut bool) -> DiscoverySnapshot {
        loop {
            let now = Instant::now();
            if now >= cycle.deadline {
                break;
            }
            let wait = self.config.tick.min(cycle.deadline - now);
            match self.commands.recv_timeout(wait) {
                Ok(Command::Inbound(Message::PollReply(reply), from)) => {
                    self.on_poll_reply(&mut cycle, reply, from)
                }
                Ok(Command::Inbound(Message::TodData(tod), from)) => {
                    self.on_tod_data(&mut cycle, &tod, from)
                }
                Ok(Command::Inbound(..)) => {}
                // refresh callers are serialized, so this cannot be a second cycle
                Ok(Command::Refresh) => {}
                // cycles run to their deadline
                Ok(Command::Shutdown) => *stopping = true,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    *stopping = true;
                    break;
                }
            }
        }

        let snapshot = DiscoverySnapshot::build(
            cycle.nodes,
            cycle.uids,
            cycle.started_at,
            cycle.started.elapsed(),
        );
        log::info!(
            "discovery finished in {:?}: {} nodes ({} devices), {} ports, {} RDM devices",
            snapshot.duration(),
            snapshot.nodes().len(),
            snapshot.unique_nodes().len(),
            snapshot.ports().count(),
            snapshot.all_uids().len()
        );
        snapshot
    }

    fn on_poll_reply(&self, cycle: &mut Cycle, reply: Box<ArtPollReply>, from: SocketAddr) {
        let node = Node::new(reply, from, cycle.started.elapsed());
        let addr = node.addr();
        cycle.senders.entry((from, addr.bind_index())).or_insert(addr);
        cycle
            .senders
            .entry((addr.socket_addr(), addr.bind_index()))
            .or_insert(addr);

        let first = cycle.seen.insert(addr);
        log::trace!("ArtPollReply from {} ({}), rtt {:?}", addr, from, node.rtt());
        if first && self.config.rdm_discovery {
            let outputs: Vec<Port> = node.output_ports().collect();
            if !outputs.is_empty() {
                self.request_tod(cycle, addr, &outputs);
            }
        }
        cycle.nodes.push(node);
    }

    fn request_tod(&self, cycle: &mut Cycle, addr: NodeAddr, outputs: &[Port]) {
        let transport = &cycle.transport.transport;
        let target = addr.socket_addr();
        match self.config.tod_mode {
            TodMode::Flush => {
                for port in outputs {
                    let message = Message::TodControl(ArtTodControl::flush(*port));
                    if !transport.send(&message, target) {
                        log::warn!("failed to send ArtTodControl for {} to {}", port, addr);
                    }
                }
            }
            TodMode::Request => {
                let mut by_net: BTreeMap<u8, Vec<Port>> = BTreeMap::new();
                for port in outputs {
                    by_net.entry(port.net()).or_default().push(*port);
                }
                for (net, ports) in by_net {
                    let message = Message::TodRequest(ArtTodRequest::for_ports(net, &ports));
                    if !transport.send(&message, target) {
                        log::warn!("failed to send ArtTodRequest to {}", addr);
                    }
                }
            }
        }

        cycle.deadline = cycle
            .deadline
            .max(Instant::now() + self.config.tod_data_wait);
        self.shared.set_phase(Phase::CollectingTod);
        log::debug!("requested tables of devices for {} outputs on {}", outputs.len(), addr);
    }

    fn on_tod_data(&self, cycle: &mut Cycle, tod: &ArtTodData, from: SocketAddr) {
        let port = tod.universe();
        let Some(node) = self.owner_of(cycle, tod, port, from) else {
            log::debug!("ArtTodData for {} from unknown node {}", port, from);
            return;
        };
        match tod.response {
            TodResponse::Nak => {
                log::debug!("{} refused table of devices for {}", node, port);
            }
            TodResponse::Full | TodResponse::Other(_) => {
                log::trace!("{} UIDs on {}/{} from {}", tod.uids.len(), node, port, from);
                cycle
                    .uids
                    .entry(PortAddr::new(node, port))
                    .or_default()
                    .extend(tod.uids.iter().copied());
            }
        }
    }

    /// The node that sent `tod`: by sender and bind index, else any node at
    /// that address or IP outputting `port`.
    fn owner_of(
        &self,
        cycle: &Cycle,
        tod: &ArtTodData,
        port: Port,
        from: SocketAddr,
    ) -> Option<NodeAddr> {
        if let Some(addr) = cycle.senders.get(&(from, tod.bind_index.max(1))) {
            return Some(*addr);
        }
        let outputs_port = |n: &&Node| n.output_ports().any(|p| p == port);
        let same_socket = cycle
            .nodes
            .iter()
            .filter(|n| n.sender() == from || n.addr().socket_addr() == from)
            .find(outputs_port);
        if let Some(node) = same_socket {
            return Some(node.addr());
        }
        let ip = ipv4_of(&from)?;
        cycle
            .nodes
            .iter()
            .filter(|n| n.addr().root() == ip || *n.addr().socket().ip() == ip)
            .find(outputs_port)
            .map(Node::addr)
    }

    fn publish(&self, outcome: Result<DiscoverySnapshot>) {
        let mut state = self.shared.lock();
        match outcome {
            Ok(snapshot) => {
                state.snapshot = Arc::new(snapshot);
                state.error = None;
            }
            Err(e) => {
                log::warn!("discovery cycle failed: {}", e);
                state.error = Some(e);
            }
        }
        state.phase = Phase::Done;
        state.generation += 1;
        drop(state);
        self.shared.changed.notify_all();
    }
}
