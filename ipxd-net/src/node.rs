#![forbid(unsafe_code)]

//! The `Network`/`Node` contract every segment implementation and
//! decorator speaks. External collaborators (bridges, proxies, stats
//! sinks) consume exactly this interface and nothing more.

use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

use ipxd_core::IpxAddr;

use crate::errors::Result;
use crate::packet::Packet;

/// A virtual IPX segment. Implementations hand out nodes that can reach
/// one another by node address.
#[async_trait]
pub trait Network: Send + Sync {
    /// Allocate a fresh node with an address unique within this network.
    /// Safe to call concurrently.
    async fn new_node(&self) -> Result<Arc<dyn Node>>;
}

/// One endpoint inside a virtual segment.
///
/// A node holds exactly one IPX node address for its lifetime. Reads
/// drain packets the segment delivered to this node; writes inject
/// packets into the segment as if sent by this node.
#[async_trait]
pub trait Node: Send + Sync {
    /// The node's address. Constant for the node's lifetime.
    fn address(&self) -> IpxAddr;

    /// Next packet destined to this node. Blocks until a packet arrives
    /// or the node is closed; returns `None` after close.
    async fn read_packet(&self) -> Option<Packet>;

    /// Inject a packet into the segment. Never blocks on slow peers:
    /// delivery queues are bounded and drop their oldest entry when
    /// full. Writes on a closed node are dropped silently.
    fn write_packet(&self, pkt: Packet) -> Result<()>;

    /// Unregister the node from its network and wake any blocked reader
    /// with end-of-stream. Idempotent.
    fn close(&self);

    /// Capability probe. The caller presents a typed sink; the first
    /// layer of the decorator chain that recognizes its type fills it
    /// and returns true. The innermost layer returns false.
    fn get_property(&self, sink: &mut dyn Any) -> bool {
        let _ = sink;
        false
    }
}
