//! Bounded per-node delivery queue with drop-oldest overflow.
//!
//! The hub fans broadcasts out while holding its table lock, so the
//! enqueue side must never block. When a queue is full the oldest
//! packet is discarded; IPX is lossy and one stalled peer must not
//! become head-of-line blocking for the whole segment.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::packet::Packet;

/// Packets buffered per node before the oldest is dropped.
pub(crate) const QUEUE_DEPTH: usize = 32;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // The deque stays consistent across a panicking holder; recover the guard.
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct Inner {
    packets: VecDeque<Packet>,
    closed: bool,
}

pub(crate) struct PacketQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

impl PacketQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                packets: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueue without blocking. Discards the oldest queued packet when
    /// full. Returns false if the queue is already closed.
    pub(crate) fn push(&self, pkt: Packet) -> bool {
        {
            let mut inner = lock(&self.inner);
            if inner.closed {
                return false;
            }
            if inner.packets.len() >= self.capacity {
                inner.packets.pop_front();
            }
            inner.packets.push_back(pkt);
        }
        self.notify.notify_one();
        true
    }

    /// Dequeue the next packet, waiting if none is queued. Returns
    /// `None` once the queue has been closed.
    pub(crate) async fn pop(&self) -> Option<Packet> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a close() or push() racing with
            // the check cannot be missed.
            notified.as_mut().enable();
            {
                let mut inner = lock(&self.inner);
                if let Some(pkt) = inner.packets.pop_front() {
                    return Some(pkt);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Close the queue, discarding anything still buffered and waking
    /// every blocked reader. Returns false if already closed.
    pub(crate) fn close(&self) -> bool {
        {
            let mut inner = lock(&self.inner);
            if inner.closed {
                return false;
            }
            inner.closed = true;
            inner.packets.clear();
        }
        self.notify.notify_waiters();
        true
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock(&self.inner).packets.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::packet::{Packet, HEADER_LEN};
    use bytes::Bytes;

    fn numbered(n: u8) -> Packet {
        let mut raw = vec![0u8; HEADER_LEN + 1];
        raw[0] = 0xff;
        raw[1] = 0xff;
        raw[HEADER_LEN] = n;
        Packet::parse(Bytes::from(raw)).unwrap()
    }

    #[tokio::test]
    async fn fifo_order() {
        let queue = PacketQueue::new(8);
        for n in 0..4 {
            assert!(queue.push(numbered(n)));
        }
        for n in 0..4 {
            assert_eq!(queue.pop().await.unwrap().payload()[0], n);
        }
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let queue = PacketQueue::new(3);
        for n in 0..5 {
            assert!(queue.push(numbered(n)));
        }
        assert_eq!(queue.len(), 3);
        // 0 and 1 were discarded.
        for n in 2..5 {
            assert_eq!(queue.pop().await.unwrap().payload()[0], n);
        }
    }

    #[tokio::test]
    async fn close_wakes_reader_with_eof() {
        let queue = std::sync::Arc::new(PacketQueue::new(4));
        let reader = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        assert!(queue.close());
        assert!(reader.await.unwrap().is_none());
        // Idempotent; pushes after close are refused.
        assert!(!queue.close());
        assert!(!queue.push(numbered(0)));
        assert!(queue.pop().await.is_none());
    }
}
