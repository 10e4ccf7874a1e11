//! RDM request/response correlation over a shared transport.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use super::{CommandClass, ParameterId, RdmPacket};
use crate::config::RdmConfig;
use crate::protocol::{ArtRdm, Message};
use crate::transport::{ArtNetReceiver, ReceiverId, Transport};
use crate::types::{Port, PortAddr, Uid};

/// Matching replies buffered while a request waits. Retransmits of the
/// answer can arrive more than once.
const REPLY_QUEUE_DEPTH: usize = 4;

/// Where an RDM request is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdmTarget {
    /// Node to unicast to; `None` broadcasts.
    pub address: Option<SocketAddr>,
    pub port: Port,
}

impl RdmTarget {
    /// Unicast to the node that owns `port_addr`.
    pub fn node(port_addr: &PortAddr) -> Self {
        Self {
            address: Some(port_addr.node.socket_addr()),
            port: port_addr.port,
        }
    }

    /// Broadcast on `port`.
    pub fn broadcast(port: Port) -> Self {
        Self {
            address: None,
            port,
        }
    }
}

/// Whether `candidate` answers `request`.
pub fn is_reply_to(request: &RdmPacket, candidate: &RdmPacket) -> bool {
    candidate.is_response()
        && request.command.response() == Some(candidate.command)
        && candidate.transaction == request.transaction
        && candidate.source == request.destination
}

/// Forwards only responses that answer `request`, so unrelated traffic
/// cannot crowd the queue.
struct ReplyCollector {
    request: RdmPacket,
    tx: Sender<RdmPacket>,
}

impl ArtNetReceiver for ReplyCollector {
    fn on_message(&self, message: &Message, _from: SocketAddr) {
        let Message::Rdm(rdm) = message else {
            return;
        };
        let candidate = &rdm.packet;
        if !is_reply_to(&self.request, candidate) {
            if candidate.is_response() {
                log::trace!(
                    "ignoring RDM {} from {} tn={}",
                    candidate.pid(),
                    candidate.source,
                    candidate.transaction
                );
            }
            return;
        }
        if self.tx.try_send(candidate.clone()).is_err() {
            log::trace!("duplicate RDM reply for {} dropped", candidate.pid());
        }
    }
}

/// Detaches the temporary receiver however the request ends.
struct ReceiverGuard<'a> {
    transport: &'a dyn Transport,
    id: ReceiverId,
}

impl Drop for ReceiverGuard<'_> {
    fn drop(&mut self) {
        self.transport.remove_receiver(self.id);
    }
}

/// Sends RDM requests and waits for the matching response.
///
/// One request is in flight per requester; concurrent callers queue on an
/// internal lock. Unrelated traffic on the transport is ignored.
pub struct RdmRequester {
    transport: Arc<dyn Transport>,
    config: RdmConfig,
    /// Next transaction number; held for the whole request.
    transaction: Mutex<u8>,
}

impl RdmRequester {
    pub fn new(transport: Arc<dyn Transport>, config: RdmConfig) -> Self {
        Self {
            transport,
            config,
            transaction: Mutex::new(0),
        }
    }

    pub fn source_uid(&self) -> Uid {
        self.config.source_uid
    }

    pub fn config(&self) -> &RdmConfig {
        &self.config
    }

    pub fn get(
        &self,
        target: &RdmTarget,
        uid: Uid,
        pid: ParameterId,
        data: &[u8],
    ) -> Option<RdmPacket> {
        self.send_request(target, uid, false, pid.code(), data)
    }

    pub fn set(
        &self,
        target: &RdmTarget,
        uid: Uid,
        pid: ParameterId,
        data: &[u8],
    ) -> Option<RdmPacket> {
        self.send_request(target, uid, true, pid.code(), data)
    }

    /// Sends a GET (or SET when `is_set`) for `pid` to `uid` and blocks until
    /// the matching response arrives or the timeout passes.
    ///
    /// Returns `None` on timeout or when the request could not be sent.
    pub fn send_request(
        &self,
        target: &RdmTarget,
        uid: Uid,
        is_set: bool,
        pid: u16,
        data: &[u8],
    ) -> Option<RdmPacket> {
        let mut next = self
            .transaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let transaction = *next;
        *next = next.wrapping_add(1);

        let command = if is_set {
            CommandClass::Set
        } else {
            CommandClass::Get
        };
        let request = RdmPacket::request(
            uid,
            self.config.source_uid,
            transaction,
            command,
            pid,
            data.to_vec(),
        );

        let (tx, rx) = bounded(REPLY_QUEUE_DEPTH);
        let id = self.transport.add_receiver(Arc::new(ReplyCollector {
            request: request.clone(),
            tx,
        }));
        let _guard = ReceiverGuard {
            transport: self.transport.as_ref(),
            id,
        };

        let destination = target.address.unwrap_or(self.config.broadcast);
        let message = Message::Rdm(ArtRdm::new(target.port, request.clone()));
        if !self.transport.send(&message, destination) {
            log::warn!("failed to send RDM {} to {} via {}", request.pid(), uid, destination);
            return None;
        }
        log::trace!("RDM {:?} {} -> {} tn={}", command, request.pid(), uid, transaction);

        match rx.recv_timeout(self.config.timeout) {
            Ok(reply) => Some(reply),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                log::debug!("RDM {} to {} timed out", request.pid(), uid);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdm::ResponseType;
    use crate::transport::testing::FakeTransport;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::time::{Duration, Instant};

    const DEVICE: Uid = Uid::new(0x4c55, 0x0000_0010);

    fn node_target() -> RdmTarget {
        RdmTarget {
            address: Some(SocketAddr::from(([10, 0, 0, 5], 6454))),
            port: Port::new(0, 0, 1),
        }
    }

    fn requester(transport: Arc<FakeTransport>, timeout_ms: u64) -> RdmRequester {
        RdmRequester::new(
            transport,
            RdmConfig::new().with_timeout(Duration::from_millis(timeout_ms)),
        )
    }

    fn request_of(message: &Message) -> RdmPacket {
        match message {
            Message::Rdm(rdm) => rdm.packet.clone(),
            other => panic!("expected ArtRdm, got {:?}", other),
        }
    }

    #[test]
    fn test_matching_reply_is_returned() {
        let transport = FakeTransport::new();
        transport.respond_with(|message, target| {
            let request = request_of(message);
            let reply = request.reply(ResponseType::Ack, vec![0, 1]);
            vec![(Message::Rdm(ArtRdm::new(Port::new(0, 0, 1), reply)), target)]
        });
        let rdm = requester(transport.clone(), 1000);

        let reply = rdm
            .get(&node_target(), DEVICE, ParameterId::DmxStartAddress, &[])
            .unwrap();
        assert_eq!(reply.source, DEVICE);
        assert_eq!(reply.command, CommandClass::GetResponse);
        assert_eq!(reply.data, vec![0, 1]);
        assert_eq!(transport.receiver_count(), 0);
    }

    #[test]
    fn test_unrelated_traffic_is_skipped() {
        let transport = FakeTransport::new();
        transport.respond_with(|message, target| {
            let request = request_of(message);
            let port = Port::new(0, 0, 1);
            let mut stale = request.reply(ResponseType::Ack, vec![9]);
            stale.transaction = request.transaction.wrapping_sub(1);
            let mut stranger = request.reply(ResponseType::Ack, vec![8]);
            stranger.source = Uid::new(0x4c55, 0x99);
            let mut wrong_family = request.reply(ResponseType::Ack, vec![7]);
            wrong_family.command = CommandClass::SetResponse;
            let good = request.reply(ResponseType::Ack, vec![1]);
            [stale, stranger, wrong_family, request.clone(), good]
                .into_iter()
                .map(|p| (Message::Rdm(ArtRdm::new(port, p)), target))
                .collect()
        });
        let rdm = requester(transport, 1000);

        let reply = rdm
            .get(&node_target(), DEVICE, ParameterId::DeviceInfo, &[])
            .unwrap();
        assert_eq!(reply.data, vec![1]);
    }

    #[test]
    fn test_reply_after_burst_of_unrelated_responses() {
        let transport = FakeTransport::new();
        transport.respond_with(|message, target| {
            let request = request_of(message);
            let port = Port::new(0, 0, 1);
            let mut replies: Vec<(Message, SocketAddr)> = (0..40u32)
                .map(|n| {
                    let mut other = request.reply(ResponseType::Ack, vec![0xee]);
                    other.source = Uid::new(0x4c55, 0x1000 + n);
                    (Message::Rdm(ArtRdm::new(port, other)), target)
                })
                .collect();
            let good = request.reply(ResponseType::Ack, vec![1, 2, 3]);
            replies.push((Message::Rdm(ArtRdm::new(port, good)), target));
            replies
        });
        let rdm = requester(transport.clone(), 300);

        let reply = rdm
            .get(&node_target(), DEVICE, ParameterId::DeviceInfo, &[])
            .expect("matching reply should survive the burst");
        assert_eq!(reply.source, DEVICE);
        assert_eq!(reply.data, vec![1, 2, 3]);
        assert_eq!(transport.receiver_count(), 0);
    }

    #[test]
    fn test_timeout_returns_none() {
        let transport = FakeTransport::new();
        let rdm = requester(transport.clone(), 100);
        let started = Instant::now();
        assert!(rdm
            .get(&node_target(), DEVICE, ParameterId::DeviceInfo, &[])
            .is_none());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(transport.receiver_count(), 0);
    }

    #[test]
    fn test_transaction_numbers_increase() {
        let transport = FakeTransport::new();
        let rdm = requester(transport.clone(), 10);
        for _ in 0..3 {
            rdm.set(&node_target(), DEVICE, ParameterId::IdentifyDevice, &[1]);
        }
        let sent: Vec<u8> = transport
            .sent()
            .iter()
            .map(|(m, _)| request_of(m).transaction)
            .collect();
        assert_eq!(sent, vec![0, 1, 2]);
        let first = request_of(&transport.sent()[0].0);
        assert_eq!(first.command, CommandClass::Set);
        assert_eq!(first.source, rdm.source_uid());
    }

    #[test]
    fn test_broadcast_target_uses_configured_address() {
        let transport = FakeTransport::new();
        let rdm = RdmRequester::new(
            transport.clone(),
            RdmConfig::new()
                .with_timeout(Duration::from_millis(10))
                .with_broadcast(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(2, 255, 255, 255), 6454))),
        );
        rdm.get(&RdmTarget::broadcast(Port::new(0, 0, 3)), DEVICE, ParameterId::DeviceLabel, &[]);
        let (message, target) = transport.sent()[0].clone();
        assert_eq!(target, SocketAddr::from(([2, 255, 255, 255], 6454)));
        match message {
            Message::Rdm(rdm) => assert_eq!(rdm.universe(), Port::new(0, 0, 3)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_is_reply_to_rules() {
        let request = RdmPacket::request(
            DEVICE,
            Uid::new(0x7ff0, 1),
            5,
            CommandClass::Get,
            ParameterId::DeviceInfo,
            vec![],
        );
        let reply = request.reply(ResponseType::Ack, vec![]);
        assert!(is_reply_to(&request, &reply));
        assert!(!is_reply_to(&request, &request));
        let mut other = reply.clone();
        other.transaction = 6;
        assert!(!is_reply_to(&request, &other));
    }
}
