#![forbid(unsafe_code)]

//! NetBIOS filter decorator.
//!
//! A virtual segment on the public Internet should not carry Windows
//! host networking traffic between strangers' machines. This wrapper
//! drops packets addressed to or from the well-known Windows networking
//! sockets on the write path and forwards everything else untouched.

use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

use ipxd_core::IpxAddr;

use crate::errors::Result;
use crate::node::{Network, Node};
use crate::packet::Packet;

/// Well-known sockets used by Windows networking over IPX: NCP, SAP,
/// RIP, NetBIOS, NWLink datagram.
const FILTERED_SOCKETS: [u16; 5] = [0x451, 0x452, 0x453, 0x455, 0x553];

fn filtered(pkt: &Packet) -> bool {
    FILTERED_SOCKETS.contains(&pkt.header.dest.socket)
        || FILTERED_SOCKETS.contains(&pkt.header.src.socket)
}

/// Network decorator that wraps every node in a [`FilterNode`].
pub struct FilterNetwork {
    inner: Arc<dyn Network>,
}

impl FilterNetwork {
    pub fn new(inner: Arc<dyn Network>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Network for FilterNetwork {
    async fn new_node(&self) -> Result<Arc<dyn Node>> {
        let inner = self.inner.new_node().await?;
        Ok(Arc::new(FilterNode { inner }))
    }
}

/// Node decorator dropping Windows networking traffic.
pub struct FilterNode {
    inner: Arc<dyn Node>,
}

#[async_trait]
impl Node for FilterNode {
    fn address(&self) -> IpxAddr {
        self.inner.address()
    }

    async fn read_packet(&self) -> Option<Packet> {
        self.inner.read_packet().await
    }

    fn write_packet(&self, pkt: Packet) -> Result<()> {
        if filtered(&pkt) {
            debug!(
                src_socket = pkt.header.src.socket,
                dest_socket = pkt.header.dest.socket,
                "filtered Windows networking packet"
            );
            return Ok(());
        }
        self.inner.write_packet(pkt)
    }

    fn close(&self) {
        self.inner.close()
    }

    fn get_property(&self, sink: &mut dyn Any) -> bool {
        self.inner.get_property(sink)
    }
}
