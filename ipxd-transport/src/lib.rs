#![forbid(unsafe_code)]

//! ipxd UDP front-end.
//!
//! * Single `UdpSocket` multiplexing every client over one port.
//! * The receive loop doubles as the timeout/keepalive timer by reading
//!   with a deadline equal to the next scheduled check.
//! * One egress task per client copies packets from its segment node
//!   back out to the UDP peer.

use socket2::{Domain, Type};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::net::UdpSocket;

mod client;
pub mod server;

pub use server::{Server, ServerConfig};

/// UDP socket pool: wraps a single socket but keeps Arc for sharing.
#[derive(Clone)]
pub struct UdpPool {
    socket: Arc<UdpSocket>,
}

impl UdpPool {
    /// Bind on 0.0.0.0:port.
    pub async fn bind(port: u16) -> std::io::Result<Self> {
        // Build socket manually to set reuse_address before binding.
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let domain = Domain::for_address(addr);
        let socket = socket2::Socket::new(domain, Type::DGRAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        let std_sock: std::net::UdpSocket = socket.into();
        std_sock.set_nonblocking(true)?;
        let udp = UdpSocket::from_std(std_sock)?;
        Ok(Self {
            socket: Arc::new(udp),
        })
    }

    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }
}
