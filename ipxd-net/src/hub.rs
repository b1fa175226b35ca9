#![forbid(unsafe_code)]

//! In-memory hub: the concrete [`Network`] that wires nodes together.
//!
//! The hub keeps one bounded delivery queue per live node, keyed by node
//! address. Fan-out happens under the table lock, which is safe because
//! enqueueing never blocks (full queues drop their oldest packet).

use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

use ipxd_core::IpxAddr;

use crate::errors::Result;
use crate::node::{Network, Node};
use crate::packet::Packet;
use crate::queue::{PacketQueue, QUEUE_DEPTH};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

type NodeTable = HashMap<IpxAddr, Arc<PacketQueue>>;

/// Virtual IPX segment held entirely in memory.
#[derive(Default)]
pub struct Hub {
    nodes: Arc<Mutex<NodeTable>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes on the segment.
    pub fn node_count(&self) -> usize {
        lock(&self.nodes).len()
    }
}

/// Draw a candidate node address: six uniformly random bytes. The bytes
/// carry no structure; collisions are handled by the caller's retry.
fn random_addr<R: Rng>(rng: &mut R) -> IpxAddr {
    let mut bytes = [0u8; 6];
    rng.fill(&mut bytes[..]);
    IpxAddr(bytes)
}

fn reserved(addr: IpxAddr) -> bool {
    addr == IpxAddr::NULL || addr == IpxAddr::BROADCAST || addr == IpxAddr::PING_REPLY
}

#[async_trait]
impl Network for Hub {
    async fn new_node(&self) -> Result<Arc<dyn Node>> {
        let queue = Arc::new(PacketQueue::new(QUEUE_DEPTH));
        let mut rng = rand::thread_rng();
        let addr = {
            let mut nodes = lock(&self.nodes);
            loop {
                let candidate = random_addr(&mut rng);
                if reserved(candidate) || nodes.contains_key(&candidate) {
                    continue;
                }
                nodes.insert(candidate, Arc::clone(&queue));
                break candidate;
            }
        };
        trace!(node = %addr, "new node");
        Ok(Arc::new(HubNode {
            addr,
            queue,
            nodes: Arc::clone(&self.nodes),
            closed: AtomicBool::new(false),
        }))
    }
}

/// A node endpoint handed out by [`Hub::new_node`].
pub struct HubNode {
    addr: IpxAddr,
    queue: Arc<PacketQueue>,
    nodes: Arc<Mutex<NodeTable>>,
    closed: AtomicBool,
}

#[async_trait]
impl Node for HubNode {
    fn address(&self) -> IpxAddr {
        self.addr
    }

    async fn read_packet(&self) -> Option<Packet> {
        self.queue.pop().await
    }

    fn write_packet(&self, pkt: Packet) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let dest = pkt.header.dest.node;
        let nodes = lock(&self.nodes);
        if dest.is_broadcast() {
            // The destination network number is deliberately ignored:
            // the segment has no multi-network routing.
            for (addr, queue) in nodes.iter() {
                if *addr != self.addr {
                    queue.push(pkt.clone());
                }
            }
        } else if dest != self.addr {
            match nodes.get(&dest) {
                Some(queue) => {
                    queue.push(pkt);
                }
                None => trace!(dest = %dest, "dropping packet for unknown node"),
            }
        }
        // Unicast to self and unknown destinations are dropped.
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        lock(&self.nodes).remove(&self.addr);
        self.queue.close();
        trace!(node = %self.addr, "node closed");
    }
}

impl Drop for HubNode {
    fn drop(&mut self) {
        self.close();
    }
}
