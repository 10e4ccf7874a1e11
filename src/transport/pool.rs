//! Fixed pool of reusable send buffers.

use crossbeam_queue::ArrayQueue;

/// Lock-free pool of byte buffers. Buffers come back through [`BufferPool::release`]
/// once their datagram has left the socket.
pub(crate) struct BufferPool {
    free: ArrayQueue<Vec<u8>>,
}

impl BufferPool {
    pub(crate) fn new(count: usize, buffer_size: usize) -> Self {
        let free = ArrayQueue::new(count.max(1));
        for _ in 0..count.max(1) {
            let _ = free.push(Vec::with_capacity(buffer_size));
        }
        Self { free }
    }

    /// Takes an empty buffer, or `None` when every buffer is in flight.
    pub(crate) fn acquire(&self) -> Option<Vec<u8>> {
        self.free.pop()
    }

    pub(crate) fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        // a full queue means the buffer did not come from this pool; drop it
        let _ = self.free.push(buf);
    }

    pub(crate) fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhausts_and_recovers() {
        let pool = BufferPool::new(2, 64);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert!(a.capacity() >= 64);
        pool.release(a);
        assert_eq!(pool.available(), 1);
        let mut c = pool.acquire().unwrap();
        c.extend_from_slice(&[1, 2, 3]);
        pool.release(c);
        assert!(pool.acquire().unwrap().is_empty());
        pool.release(b);
    }

    #[test]
    fn test_release_beyond_capacity_is_dropped() {
        let pool = BufferPool::new(1, 8);
        pool.release(Vec::new());
        assert_eq!(pool.available(), 1);
    }
}
