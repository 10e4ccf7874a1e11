//! UDP transports for Art-Net.
//!
//! [`Channel`] multiplexes several non-blocking sockets on one I/O thread and
//! queues outbound datagrams when a socket is busy. [`Listener`] is a single
//! blocking socket with a reader thread, for simple tools.
//!
//! Both implement [`Transport`]: decoded messages are handed to every
//! registered [`ArtNetReceiver`] on the transport's thread, and sends never
//! block the caller.

mod channel;
mod listener;
mod pool;

pub use channel::{Channel, ChannelStats};
pub use listener::Listener;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::protocol::{Message, OpCode, ProtocolError};

/// Callback interface for inbound traffic.
///
/// Callbacks run on the transport thread and must not block for long.
pub trait ArtNetReceiver: Send + Sync {
    /// A datagram decoded to a modelled message.
    fn on_message(&self, message: &Message, from: SocketAddr);

    /// An Art-Net datagram with an opcode this crate does not model.
    fn on_unsupported(&self, _opcode: OpCode, _data: &[u8], _from: SocketAddr) {}

    /// A datagram without the Art-Net identifier.
    fn on_raw(&self, _data: &[u8], _from: SocketAddr) {}
}

struct FnReceiver<F>(F);

impl<F> ArtNetReceiver for FnReceiver<F>
where
    F: Fn(&Message, SocketAddr) + Send + Sync,
{
    fn on_message(&self, message: &Message, from: SocketAddr) {
        (self.0)(message, from)
    }
}

/// Wraps a closure as a receiver that only sees decoded messages.
pub fn receiver_fn<F>(f: F) -> Arc<dyn ArtNetReceiver>
where
    F: Fn(&Message, SocketAddr) + Send + Sync + 'static,
{
    Arc::new(FnReceiver(f))
}

/// Handle returned by [`Transport::add_receiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverId(u64);

/// Something that sends and receives Art-Net datagrams.
pub trait Transport: Send + Sync {
    fn add_receiver(&self, receiver: Arc<dyn ArtNetReceiver>) -> ReceiverId;

    /// Returns false if `id` was not registered.
    fn remove_receiver(&self, id: ReceiverId) -> bool;

    /// Encodes and sends `message`. Returns false when the datagram could not
    /// be sent or queued.
    fn send(&self, message: &Message, target: SocketAddr) -> bool;

    /// Sends pre-encoded bytes.
    fn send_raw(&self, data: &[u8], target: SocketAddr) -> bool;

    /// Addresses the transport's sockets are bound to.
    fn local_addrs(&self) -> Vec<SocketAddr>;
}

/// What happened to one inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatched {
    Message,
    Unsupported,
    Raw,
    Malformed,
}

/// Registered receivers, shared between callers and the transport thread.
pub(crate) struct ReceiverSet {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ReceiverId, Arc<dyn ArtNetReceiver>)>>,
}

impl ReceiverSet {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, receiver: Arc<dyn ArtNetReceiver>) -> ReceiverId {
        let id = ReceiverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, receiver));
        id
    }

    pub(crate) fn remove(&self, id: ReceiverId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ReceiverId, Arc<dyn ArtNetReceiver>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decodes `data` once and hands it to every receiver.
    ///
    /// The receiver list is copied first so callbacks may add or remove
    /// receivers.
    pub(crate) fn dispatch(&self, data: &[u8], from: SocketAddr) -> Dispatched {
        let receivers: Vec<Arc<dyn ArtNetReceiver>> =
            self.lock().iter().map(|(_, r)| Arc::clone(r)).collect();

        match Message::decode(data) {
            Ok(Message::Unsupported { opcode, data }) => {
                log::trace!("{} from {} ({} bytes)", opcode, from, data.len());
                for receiver in &receivers {
                    receiver.on_unsupported(opcode, &data, from);
                }
                Dispatched::Unsupported
            }
            Ok(message) => {
                log::trace!("{} from {}", message.opcode(), from);
                for receiver in &receivers {
                    receiver.on_message(&message, from);
                }
                Dispatched::Message
            }
            Err(ProtocolError::InvalidHeader) => {
                for receiver in &receivers {
                    receiver.on_raw(data, from);
                }
                Dispatched::Raw
            }
            Err(e) => {
                log::debug!("dropping malformed datagram from {}: {}", from, e);
                Dispatched::Malformed
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory transport for unit tests.

    use super::*;

    type Responder = dyn Fn(&Message, SocketAddr) -> Vec<(Message, SocketAddr)> + Send + Sync;

    /// Records sends and optionally answers them through the receiver set,
    /// as a node on the wire would.
    pub(crate) struct FakeTransport {
        receivers: ReceiverSet,
        pub(crate) sent: Mutex<Vec<(Message, SocketAddr)>>,
        responder: Mutex<Option<Box<Responder>>>,
    }

    impl FakeTransport {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                receivers: ReceiverSet::new(),
                sent: Mutex::new(Vec::new()),
                responder: Mutex::new(None),
            })
        }

        pub(crate) fn respond_with<F>(&self, f: F)
        where
            F: Fn(&Message, SocketAddr) -> Vec<(Message, SocketAddr)> + Send + Sync + 'static,
        {
            *self.responder.lock().unwrap() = Some(Box::new(f));
        }

        /// Delivers `message` as if it arrived from `from`.
        pub(crate) fn inject(&self, message: &Message, from: SocketAddr) {
            self.receivers.dispatch(&message.to_bytes(), from);
        }

        pub(crate) fn sent(&self) -> Vec<(Message, SocketAddr)> {
            self.sent.lock().unwrap().clone()
        }

        pub(crate) fn receiver_count(&self) -> usize {
            self.receivers.lock().len()
        }
    }

    impl Transport for FakeTransport {
        fn add_receiver(&self, receiver: Arc<dyn ArtNetReceiver>) -> ReceiverId {
            self.receivers.add(receiver)
        }

        fn remove_receiver(&self, id: ReceiverId) -> bool {
            self.receivers.remove(id)
        }

        fn send(&self, message: &Message, target: SocketAddr) -> bool {
            self.sent.lock().unwrap().push((message.clone(), target));
            let replies = match self.responder.lock().unwrap().as_ref() {
                Some(respond) => respond(message, target),
                None => Vec::new(),
            };
            for (reply, from) in replies {
                self.inject(&reply, from);
            }
            true
        }

        fn send_raw(&self, data: &[u8], target: SocketAddr) -> bool {
            match Message::decode(data) {
                Ok(message) => self.send(&message, target),
                Err(_) => false,
            }
        }

        fn local_addrs(&self) -> Vec<SocketAddr> {
            vec![SocketAddr::from(([127, 0, 0, 1], 6454))]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ArtSync, ARTNET_ID};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        messages: AtomicUsize,
        unsupported: AtomicUsize,
        raw: AtomicUsize,
    }

    impl ArtNetReceiver for Counting {
        fn on_message(&self, _message: &Message, _from: SocketAddr) {
            self.messages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_unsupported(&self, _opcode: OpCode, _data: &[u8], _from: SocketAddr) {
            self.unsupported.fetch_add(1, Ordering::SeqCst);
        }

        fn on_raw(&self, _data: &[u8], _from: SocketAddr) {
            self.raw.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn from() -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], 6454))
    }

    #[test]
    fn test_dispatch_routes_by_kind() {
        let set = ReceiverSet::new();
        let counting = Arc::new(Counting::default());
        set.add(counting.clone());

        let sync = Message::Sync(ArtSync).to_bytes();
        assert_eq!(set.dispatch(&sync, from()), Dispatched::Message);

        let mut timecode = ARTNET_ID.to_vec();
        timecode.extend_from_slice(&[0x00, 0x97, 0, 14, 0, 0]);
        assert_eq!(set.dispatch(&timecode, from()), Dispatched::Unsupported);

        assert_eq!(set.dispatch(b"hello", from()), Dispatched::Raw);

        // right identifier, truncated body
        assert_eq!(set.dispatch(&sync[..12], from()), Dispatched::Malformed);

        assert_eq!(counting.messages.load(Ordering::SeqCst), 1);
        assert_eq!(counting.unsupported.load(Ordering::SeqCst), 1);
        assert_eq!(counting.raw.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_removed_receiver_stops_seeing_traffic() {
        let set = ReceiverSet::new();
        let counting = Arc::new(Counting::default());
        let id = set.add(counting.clone());
        assert!(set.remove(id));
        assert!(!set.remove(id));
        set.dispatch(&Message::Sync(ArtSync).to_bytes(), from());
        assert_eq!(counting.messages.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_receiver_fn_wraps_closure() {
        let set = ReceiverSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        set.add(receiver_fn(move |message, _| {
            assert_eq!(message.opcode(), OpCode::Sync);
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        set.dispatch(&Message::Sync(ArtSync).to_bytes(), from());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
