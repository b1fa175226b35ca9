#![forbid(unsafe_code)]

//! Statistics decorator. Wraps a network so that every node it hands
//! out counts traffic in both directions; the counters are fetched
//! through the [`Node::get_property`] capability probe, so callers need
//! no knowledge of where in the chain this layer sits.

use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ipxd_core::IpxAddr;

use crate::errors::Result;
use crate::node::{Network, Node};
use crate::packet::Packet;

/// Cumulative per-node traffic counters. Used as the typed sink for the
/// capability probe: pass `&mut Statistics` to `get_property` and the
/// statistics layer fills it.
#[derive(Debug, Clone, Copy)]
pub struct Statistics {
    /// Packets read from the segment by the node owner.
    pub rx_packets: u64,
    /// Packets written into the segment by the node owner.
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    /// When the node was created.
    pub connect_time: Instant,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            rx_packets: 0,
            tx_packets: 0,
            rx_bytes: 0,
            tx_bytes: 0,
            connect_time: Instant::now(),
        }
    }
}

/// Network decorator that wraps every node in a [`StatsNode`].
pub struct StatsNetwork {
    inner: Arc<dyn Network>,
}

impl StatsNetwork {
    pub fn new(inner: Arc<dyn Network>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Network for StatsNetwork {
    async fn new_node(&self) -> Result<Arc<dyn Node>> {
        let inner = self.inner.new_node().await?;
        Ok(Arc::new(StatsNode::new(inner)))
    }
}

/// Node decorator counting packets and bytes in both directions.
pub struct StatsNode {
    inner: Arc<dyn Node>,
    rx_packets: AtomicU64,
    tx_packets: AtomicU64,
    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
    connect_time: Instant,
}

impl StatsNode {
    pub fn new(inner: Arc<dyn Node>) -> Self {
        Self {
            inner,
            rx_packets: AtomicU64::new(0),
            tx_packets: AtomicU64::new(0),
            rx_bytes: AtomicU64::new(0),
            tx_bytes: AtomicU64::new(0),
            connect_time: Instant::now(),
        }
    }

    fn snapshot(&self) -> Statistics {
        Statistics {
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            tx_packets: self.tx_packets.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            connect_time: self.connect_time,
        }
    }
}

#[async_trait]
impl Node for StatsNode {
    fn address(&self) -> IpxAddr {
        self.inner.address()
    }

    async fn read_packet(&self) -> Option<Packet> {
        let pkt = self.inner.read_packet().await?;
        self.rx_packets.fetch_add(1, Ordering::Relaxed);
        self.rx_bytes.fetch_add(pkt.len() as u64, Ordering::Relaxed);
        Some(pkt)
    }

    fn write_packet(&self, pkt: Packet) -> Result<()> {
        self.tx_packets.fetch_add(1, Ordering::Relaxed);
        self.tx_bytes.fetch_add(pkt.len() as u64, Ordering::Relaxed);
        self.inner.write_packet(pkt)
    }

    fn close(&self) {
        self.inner.close()
    }

    fn get_property(&self, sink: &mut dyn Any) -> bool {
        if let Some(stats) = sink.downcast_mut::<Statistics>() {
            *stats = self.snapshot();
            return true;
        }
        self.inner.get_property(sink)
    }
}
