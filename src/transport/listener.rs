//! Single-socket blocking transport.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{ArtNetReceiver, ReceiverId, ReceiverSet, Transport};
use crate::error::{Error, Result};
use crate::protocol::Message;

/// How often the reader thread checks for shutdown.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

const RECV_BUFFER_SIZE: usize = 4096;

struct Shared {
    socket: UdpSocket,
    local: SocketAddr,
    receivers: ReceiverSet,
    running: AtomicBool,
}

/// One blocking UDP socket with a reader thread.
///
/// Sends are synchronous `send_to` calls on the caller's thread.
pub struct Listener {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    pub fn bind(addr: SocketAddrV4) -> Result<Listener> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        socket
            .bind(&socket2::SockAddr::from(addr))
            .map_err(|e| Error::context(format!("binding {}", addr), e))?;
        let socket: UdpSocket = socket.into();
        let local = socket.local_addr()?;
        log::debug!("Art-Net listener bound to {}", local);

        let shared = Arc::new(Shared {
            socket,
            local,
            receivers: ReceiverSet::new(),
            running: AtomicBool::new(true),
        });
        let reader = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("artnet-listener".to_string())
            .spawn(move || read_loop(&reader))?;

        Ok(Listener {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local
    }

    /// Stops the reader thread. Idempotent.
    pub fn close(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    fn send_bytes(&self, data: &[u8], target: SocketAddr) -> bool {
        match self.shared.socket.send_to(data, target) {
            Ok(n) => n == data.len(),
            Err(e) => {
                log::warn!("send to {} failed: {}", target, e);
                false
            }
        }
    }
}

fn read_loop(shared: &Shared) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    while shared.running.load(Ordering::Acquire) {
        match shared.socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                shared.receivers.dispatch(&buf[..len], from);
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::Interrupted
                        | io::ErrorKind::ConnectionReset
                ) => {}
            Err(e) => {
                log::error!("Art-Net listener on {} stopped: {}", shared.local, e);
                break;
            }
        }
    }
}

impl Transport for Listener {
    fn add_receiver(&self, receiver: Arc<dyn ArtNetReceiver>) -> ReceiverId {
        self.shared.receivers.add(receiver)
    }

    fn remove_receiver(&self, id: ReceiverId) -> bool {
        self.shared.receivers.remove(id)
    }

    fn send(&self, message: &Message, target: SocketAddr) -> bool {
        self.send_bytes(&message.to_bytes(), target)
    }

    fn send_raw(&self, data: &[u8], target: SocketAddr) -> bool {
        self.send_bytes(data, target)
    }

    fn local_addrs(&self) -> Vec<SocketAddr> {
        vec![self.shared.local]
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ArtPoll, OpCode};
    use crate::transport::receiver_fn;
    use crossbeam_channel::unbounded;
    use std::net::Ipv4Addr;

    #[test]
    fn test_listener_receives_and_replies() {
        let a = Listener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let b = Listener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let (tx, rx) = unbounded();
        a.add_receiver(receiver_fn(move |message, from| {
            let _ = tx.send((message.opcode(), from));
        }));

        assert!(b.send(&Message::Poll(ArtPoll::default()), a.local_addr()));
        let (opcode, from) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(opcode, OpCode::Poll);
        assert_eq!(from, b.local_addr());
    }

    #[test]
    fn test_listener_close_joins_reader() {
        let listener = Listener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        listener.close();
        assert!(listener.handle.lock().unwrap().is_none());
    }
}
