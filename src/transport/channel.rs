//! Multiplexed non-blocking UDP channel.
//!
//! ```text
//!   caller threads                         I/O thread ("artnet-channel")
//!  +------------------+                   +------------------------------+
//!  | send()           |  direct send_to   |  mio::Poll                   |
//!  |  - pool buffer   | ----------------> |   - socket i: READABLE       |
//!  |  - queue if busy |  queue + Waker    |     (+ WRITABLE while queued)|
//!  +------------------+ ----------------> |   - Waker                    |
//!                                         |  drain reads -> receivers    |
//!                                         |  flush queues in FIFO order  |
//!                                         +------------------------------+
//! ```
//!
//! Each socket has its own outbound queue. A send goes straight to the socket
//! when its queue is empty; otherwise, or when the socket would block, the
//! datagram is queued and the I/O thread flushes it once the socket reports
//! writable. Send buffers come from a fixed pool and return to it after the
//! datagram leaves.

use mio::net::UdpSocket as MioUdpSocket;
use mio::{Events, Interest, Poll, Token, Waker};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use super::pool::BufferPool;
use super::{ArtNetReceiver, Dispatched, ReceiverId, ReceiverSet, Transport};
use crate::config::{BindMode, ChannelConfig};
use crate::error::{Error, Result};
use crate::net_utils::{get_local_interfaces, NetworkInterface};
use crate::protocol::Message;
use crate::types::ipv4_of;

/// Token for the waker; sockets use their index.
const WAKER_TOKEN: Token = Token(usize::MAX);

const MAX_EVENTS: usize = 64;

/// Largest datagram read in one call.
const RECV_BUFFER_SIZE: usize = 4096;

/// Counters for one channel, read with [`Channel::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Datagrams read from any socket.
    pub received: u64,
    /// Datagrams with the Art-Net identifier that failed to decode.
    pub malformed: u64,
    /// Datagrams handed to the kernel.
    pub sent: u64,
    /// Sends that had to wait in a queue.
    pub queued: u64,
    /// Sends dropped because of a socket error.
    pub send_errors: u64,
    /// Sends refused because every pool buffer was in flight.
    pub pool_exhausted: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    malformed: AtomicU64,
    sent: AtomicU64,
    queued: AtomicU64,
    send_errors: AtomicU64,
    pool_exhausted: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            pool_exhausted: self.pool_exhausted.load(Ordering::Relaxed),
        }
    }
}

/// One bound socket as seen from caller threads.
struct Endpoint {
    socket: UdpSocket,
    local: SocketAddr,
    interface: Option<NetworkInterface>,
    /// Bound to a broadcast address: receives only, never sends.
    receive_only: bool,
}

struct Outbound {
    buf: Vec<u8>,
    target: SocketAddr,
}

struct Shared {
    endpoints: Vec<Endpoint>,
    queues: Vec<Mutex<VecDeque<Outbound>>>,
    receivers: ReceiverSet,
    pool: BufferPool,
    waker: Waker,
    running: AtomicBool,
    stats: Counters,
}

impl Shared {
    fn queue(&self, index: usize) -> MutexGuard<'_, VecDeque<Outbound>> {
        self.queues[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Picks the socket to send from: one on the target's subnet if any,
    /// else the first socket that may send.
    fn select_endpoint(&self, target: &SocketAddr) -> Option<usize> {
        let ip = ipv4_of(target)?;
        let senders = || {
            self.endpoints
                .iter()
                .enumerate()
                .filter(|(_, e)| !e.receive_only)
        };
        senders()
            .find(|(_, e)| e.interface.as_ref().is_some_and(|i| i.contains(ip)))
            .or_else(|| senders().next())
            .map(|(index, _)| index)
    }

    /// Writes queued datagrams for socket `index` until the queue empties or
    /// the socket would block.
    fn flush(&self, index: usize) {
        let endpoint = &self.endpoints[index];
        let mut queue = self.queue(index);
        while let Some(front) = queue.front() {
            match endpoint.socket.send_to(&front.buf, front.target) {
                Ok(n) if n > 0 => {
                    Counters::bump(&self.stats.sent);
                }
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("send to {} from {} failed: {}", front.target, endpoint.local, e);
                    Counters::bump(&self.stats.send_errors);
                }
            }
            if let Some(done) = queue.pop_front() {
                self.pool.release(done.buf);
            }
        }
    }

    fn submit(&self, buf: Vec<u8>, target: SocketAddr) -> bool {
        let index = match self.select_endpoint(&target) {
            Some(index) => index,
            None => {
                log::warn!("no Art-Net socket can send to {}", target);
                self.pool.release(buf);
                return false;
            }
        };
        let endpoint = &self.endpoints[index];
        let mut queue = self.queue(index);

        if queue.is_empty() {
            match endpoint.socket.send_to(&buf, target) {
                Ok(n) if n > 0 => {
                    drop(queue);
                    Counters::bump(&self.stats.sent);
                    self.pool.release(buf);
                    return true;
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    drop(queue);
                    log::warn!("send to {} from {} failed: {}", target, endpoint.local, e);
                    Counters::bump(&self.stats.send_errors);
                    self.pool.release(buf);
                    return false;
                }
            }
        }

        queue.push_back(Outbound { buf, target });
        drop(queue);
        Counters::bump(&self.stats.queued);
        if let Err(e) = self.waker.wake() {
            log::warn!("failed to wake Art-Net I/O thread: {}", e);
        }
        true
    }

    fn acquire(&self) -> Option<Vec<u8>> {
        let buf = self.pool.acquire();
        if buf.is_none() {
            Counters::bump(&self.stats.pool_exhausted);
            log::warn!("Art-Net send buffer pool exhausted, dropping datagram");
        }
        buf
    }
}

/// State owned by the I/O thread.
struct IoLoop {
    poll: Poll,
    sockets: Vec<MioUdpSocket>,
    /// Whether WRITABLE interest is registered, per socket.
    write_interest: Vec<bool>,
    shared: Arc<Shared>,
    select_timeout: std::time::Duration,
}

impl IoLoop {
    fn run(mut self) {
        let mut events = Events::with_capacity(MAX_EVENTS);
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        while self.shared.running.load(Ordering::Acquire) {
            self.update_interests();

            if let Err(e) = self.poll.poll(&mut events, Some(self.select_timeout)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                log::error!("Art-Net selection loop failed: {}", e);
                break;
            }

            for event in events.iter() {
                match event.token() {
                    WAKER_TOKEN => {}
                    Token(index) if index < self.sockets.len() => {
                        if event.is_readable() {
                            self.drain(index, &mut buf);
                        }
                        if event.is_writable() {
                            self.shared.flush(index);
                        }
                    }
                    Token(other) => log::trace!("event for unknown token {}", other),
                }
            }
        }
        log::debug!("Art-Net I/O thread stopped");
    }

    /// Registers WRITABLE only for sockets with queued datagrams.
    fn update_interests(&mut self) {
        for index in 0..self.sockets.len() {
            let wanted = !self.shared.queue(index).is_empty();
            if wanted == self.write_interest[index] {
                continue;
            }
            let interest = if wanted {
                Interest::READABLE | Interest::WRITABLE
            } else {
                Interest::READABLE
            };
            match self
                .poll
                .registry()
                .reregister(&mut self.sockets[index], Token(index), interest)
            {
                Ok(()) => self.write_interest[index] = wanted,
                Err(e) => log::warn!("failed to update socket interest: {}", e),
            }
        }
    }

    /// Reads until the socket would block.
    fn drain(&mut self, index: usize, buf: &mut [u8]) {
        loop {
            match self.sockets[index].recv_from(buf) {
                Ok((len, from)) => {
                    Counters::bump(&self.shared.stats.received);
                    if self.shared.receivers.dispatch(&buf[..len], from) == Dispatched::Malformed {
                        Counters::bump(&self.shared.stats.malformed);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                // ICMP port unreachable surfaces here on some platforms
                Err(e)
                    if e.kind() == io::ErrorKind::ConnectionReset
                        || e.kind() == io::ErrorKind::ConnectionRefused =>
                {
                    continue
                }
                Err(e) => {
                    log::debug!("recv on socket {} failed: {}", index, e);
                    break;
                }
            }
        }
    }
}

/// Non-blocking Art-Net transport over one or more UDP sockets.
///
/// Dropping the channel stops and joins its I/O thread.
pub struct Channel {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Channel {
    /// Binds sockets per `config` and starts the I/O thread.
    ///
    /// Sockets that fail to bind are logged and skipped. A channel where no
    /// socket bound is still returned; check [`Channel::is_empty`].
    pub fn open(config: &ChannelConfig) -> Result<Channel> {
        config.validate()?;

        let mut endpoints = Vec::new();
        for plan in bind_plan(config) {
            match bind_socket(plan.addr) {
                Ok(socket) => {
                    let local = socket.local_addr()?;
                    log::debug!("bound Art-Net socket {}", local);
                    endpoints.push(Endpoint {
                        socket,
                        local,
                        interface: plan.interface,
                        receive_only: plan.receive_only,
                    });
                }
                Err(e) => log::warn!("failed to bind Art-Net socket {}: {}", plan.addr, e),
            }
        }

        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;

        let mut sockets = Vec::with_capacity(endpoints.len());
        for (index, endpoint) in endpoints.iter().enumerate() {
            let clone = endpoint
                .socket
                .try_clone()
                .map_err(|e| Error::context("cloning Art-Net socket", e))?;
            let mut socket = MioUdpSocket::from_std(clone);
            poll.registry()
                .register(&mut socket, Token(index), Interest::READABLE)?;
            sockets.push(socket);
        }

        let queues = endpoints.iter().map(|_| Mutex::new(VecDeque::new())).collect();
        let shared = Arc::new(Shared {
            endpoints,
            queues,
            receivers: ReceiverSet::new(),
            pool: BufferPool::new(config.send_buffers, config.buffer_size),
            waker,
            running: AtomicBool::new(true),
            stats: Counters::default(),
        });

        let io_loop = IoLoop {
            poll,
            write_interest: vec![false; sockets.len()],
            sockets,
            shared: Arc::clone(&shared),
            select_timeout: config.select_timeout,
        };
        let handle = thread::Builder::new()
            .name("artnet-channel".to_string())
            .spawn(move || io_loop.run())?;

        Ok(Channel {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn socket_count(&self) -> usize {
        self.shared.endpoints.len()
    }

    /// True when no socket could be bound.
    pub fn is_empty(&self) -> bool {
        self.shared.endpoints.is_empty()
    }

    pub fn stats(&self) -> ChannelStats {
        self.shared.stats.snapshot()
    }

    /// Stops the I/O thread and waits for it. Idempotent.
    pub fn close(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.shared.waker.wake() {
            log::warn!("failed to wake Art-Net I/O thread: {}", e);
        }
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            // a receiver callback may drop the last reference on the I/O thread
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Transport for Channel {
    fn add_receiver(&self, receiver: Arc<dyn ArtNetReceiver>) -> ReceiverId {
        self.shared.receivers.add(receiver)
    }

    fn remove_receiver(&self, id: ReceiverId) -> bool {
        self.shared.receivers.remove(id)
    }

    fn send(&self, message: &Message, target: SocketAddr) -> bool {
        let mut buf = match self.shared.acquire() {
            Some(buf) => buf,
            None => return false,
        };
        buf.resize(message.encoded_len(), 0);
        match message.encode(&mut buf) {
            Ok(len) => buf.truncate(len),
            Err(e) => {
                log::warn!("cannot encode {}: {}", message.opcode(), e);
                self.shared.pool.release(buf);
                return false;
            }
        }
        self.shared.submit(buf, target)
    }

    fn send_raw(&self, data: &[u8], target: SocketAddr) -> bool {
        let mut buf = match self.shared.acquire() {
            Some(buf) => buf,
            None => return false,
        };
        buf.extend_from_slice(data);
        self.shared.submit(buf, target)
    }

    fn local_addrs(&self) -> Vec<SocketAddr> {
        self.shared.endpoints.iter().map(|e| e.local).collect()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

struct BindPlan {
    addr: SocketAddrV4,
    interface: Option<NetworkInterface>,
    receive_only: bool,
}

fn bind_plan(config: &ChannelConfig) -> Vec<BindPlan> {
    let wildcard = |port: u16| BindPlan {
        addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port),
        interface: None,
        receive_only: false,
    };

    match config.bind_mode {
        BindMode::Wildcard => config.ports.iter().map(|&p| wildcard(p)).collect(),
        BindMode::PerInterface => {
            let interfaces = get_local_interfaces().unwrap_or_else(|e| {
                log::warn!("failed to enumerate network interfaces: {}", e);
                Vec::new()
            });
            if interfaces.is_empty() {
                log::debug!("no IPv4 interfaces found, binding wildcard sockets");
                return config.ports.iter().map(|&p| wildcard(p)).collect();
            }
            let mut plan = Vec::new();
            for &port in &config.ports {
                for iface in &interfaces {
                    plan.push(BindPlan {
                        addr: SocketAddrV4::new(iface.ip, port),
                        interface: Some(iface.clone()),
                        receive_only: false,
                    });
                    plan.push(BindPlan {
                        addr: SocketAddrV4::new(iface.broadcast_address(), port),
                        interface: Some(iface.clone()),
                        receive_only: true,
                    });
                }
            }
            plan
        }
    }
}

fn bind_socket(addr: SocketAddrV4) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&socket2::SockAddr::from(addr))?;
    Ok(socket.into())
}
