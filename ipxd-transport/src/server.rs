#![forbid(unsafe_code)]

//! The UDP server: owns the socket, maintains client records, and
//! translates between UDP datagrams and virtual-segment packets.

use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use ipxd_core::{IpxAddr, IpxdConfig, NetworkNum, REGISTRATION_SOCKET};
use ipxd_net::packet::{IpxHeader, IpxHeaderAddr, CHECKSUM_NONE, HEADER_LEN, MAX_PACKET};
use ipxd_net::{Network, Packet};

use crate::client::{Client, ClientTable};
use crate::UdpPool;

/// Upper bound on the receive deadline so clients that connect while
/// the table is empty never wait behind a stale deadline.
const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(10);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Liveness tuning for the dual timeout/keepalive scheme.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// A client silent for this long is evicted.
    pub client_timeout: Duration,
    /// Egress silence before a keepalive ping is sent.
    pub keepalive_time: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            client_timeout: Duration::from_secs(600),
            keepalive_time: Duration::from_secs(5),
        }
    }
}

impl From<&IpxdConfig> for ServerConfig {
    fn from(cfg: &IpxdConfig) -> Self {
        Self {
            client_timeout: cfg.client_timeout(),
            keepalive_time: cfg.keepalive_time(),
        }
    }
}

/// The registration-ack packet: the client learns its assigned node
/// address from `dest.node`.
fn registration_ack(addr: IpxAddr) -> Packet {
    Packet::from_header(IpxHeader {
        checksum: CHECKSUM_NONE,
        length: HEADER_LEN as u16,
        transport_control: 0,
        packet_type: 0,
        dest: IpxHeaderAddr::new(NetworkNum::ZERO, addr, REGISTRATION_SOCKET),
        src: IpxHeaderAddr::new(
            NetworkNum([0, 0, 0, 1]),
            IpxAddr::BROADCAST,
            REGISTRATION_SOCKET,
        ),
    })
}

/// The keepalive ping: a broadcast to socket 2 that DOSBox clients
/// answer, refreshing both `last_rx` and any NAT mapping. The
/// ping-reply source address keeps the answer from looking like a
/// fresh registration.
fn keepalive_ping() -> Packet {
    Packet::from_header(IpxHeader {
        checksum: CHECKSUM_NONE,
        length: HEADER_LEN as u16,
        transport_control: 0,
        packet_type: 0,
        dest: IpxHeaderAddr::new(NetworkNum::ZERO, IpxAddr::BROADCAST, REGISTRATION_SOCKET),
        src: IpxHeaderAddr::new(NetworkNum::ZERO, IpxAddr::PING_REPLY, 0),
    })
}

/// The hub's UDP front-end.
pub struct Server {
    socket: Arc<UdpSocket>,
    network: Arc<dyn Network>,
    clients: ClientTable,
    config: ServerConfig,
    shutdown: Notify,
    closed: Mutex<bool>,
}

impl Server {
    /// Bind the server socket. The receive loop does not start until
    /// [`Server::run`] is awaited.
    pub async fn bind(
        port: u16,
        network: Arc<dyn Network>,
        config: ServerConfig,
    ) -> std::io::Result<Self> {
        let pool = UdpPool::bind(port).await?;
        let socket = pool.socket();
        let addr = socket.local_addr()?;
        info!(addr = %addr, "ipxd listening");
        Ok(Self {
            socket,
            network,
            clients: ClientTable::default(),
            config,
            shutdown: Notify::new(),
            closed: Mutex::new(false),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Number of currently registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Drive the receive loop until [`Server::close`] is called or the
    /// socket fails with a non-timeout error.
    pub async fn run(&self) -> std::io::Result<()> {
        let mut buf = [0u8; MAX_PACKET];
        loop {
            if self.is_closed() {
                return Ok(());
            }
            let wait = self.next_check();
            tokio::select! {
                _ = self.shutdown.notified() => return Ok(()),
                recv = tokio::time::timeout(wait, self.socket.recv_from(&mut buf)) => {
                    match recv {
                        Ok(Ok((len, peer))) => self.handle_datagram(&buf[..len], peer).await,
                        Ok(Err(e)) => {
                            error!(error = %e, "udp receive error, shutting down");
                            self.close();
                            return Err(e);
                        }
                        // Deadline reached: run the liveness sweep.
                        Err(_) => self.sweep().await,
                    }
                }
            }
        }
    }

    /// Close every client's node (terminating its egress task via
    /// end-of-stream) and stop the receive loop. Idempotent; concurrent
    /// calls serialise on a mutex.
    pub fn close(&self) {
        {
            let mut closed = lock(&self.closed);
            if *closed {
                return;
            }
            *closed = true;
        }
        for client in self.clients.drain() {
            client.node.close();
        }
        self.shutdown.notify_one();
        info!("server closed");
    }

    fn is_closed(&self) -> bool {
        *lock(&self.closed)
    }

    async fn handle_datagram(&self, data: &[u8], peer: SocketAddr) {
        let pkt = match Packet::parse(Bytes::copy_from_slice(data)) {
            Ok(pkt) => pkt,
            Err(e) => {
                debug!(peer = %peer, error = %e, "dropping undecodable datagram");
                return;
            }
        };
        if pkt.header.is_registration() {
            self.handle_registration(peer).await;
            return;
        }
        let Some(client) = self.clients.get(&peer) else {
            debug!(peer = %peer, "dropping datagram from unregistered peer");
            return;
        };
        // The source node must be the one assigned at registration;
        // anything else is spoofing within the segment.
        if pkt.header.src.node != client.node.address() {
            debug!(
                peer = %peer,
                claimed = %pkt.header.src.node,
                assigned = %client.node.address(),
                "dropping spoofed source address"
            );
            return;
        }
        client.touch_rx();
        let _ = client.node.write_packet(pkt);
    }

    async fn handle_registration(&self, peer: SocketAddr) {
        let client = match self.clients.get(&peer) {
            // Duplicate registration: keep the node, re-send the ack.
            Some(client) => client,
            None => {
                let node = match self.network.new_node().await {
                    Ok(node) => node,
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "node allocation failed");
                        return;
                    }
                };
                let client = Arc::new(Client::new(peer, node));
                self.clients.insert(Arc::clone(&client));
                info!(peer = %peer, node = %client.node.address(), "client registered");
                self.spawn_egress(Arc::clone(&client));
                client
            }
        };
        client.touch_rx();
        self.send_packet(&registration_ack(client.node.address()), peer)
            .await;
        client.touch_tx();
    }

    /// One task per client: copy packets from the segment node out to
    /// the UDP peer until the node reaches end-of-stream.
    fn spawn_egress(&self, client: Arc<Client>) {
        let socket = Arc::clone(&self.socket);
        tokio::spawn(async move {
            while let Some(pkt) = client.node.read_packet().await {
                match socket.send_to(pkt.as_bytes(), client.peer).await {
                    Ok(_) => client.touch_tx(),
                    // A single send failure does not take the client down.
                    Err(e) => warn!(peer = %client.peer, error = %e, "udp send error"),
                }
            }
            debug!(peer = %client.peer, "egress task finished");
        });
    }

    /// Evict silent clients and ping idle egress directions.
    async fn sweep(&self) {
        let now = Instant::now();
        for client in self.clients.snapshot() {
            if now.duration_since(client.last_rx()) >= self.config.client_timeout {
                if self.clients.remove(&client.peer).is_some() {
                    info!(peer = %client.peer, node = %client.node.address(), "client timed out");
                    client.node.close();
                }
                continue;
            }
            if now.duration_since(client.last_tx()) >= self.config.keepalive_time {
                self.send_packet(&keepalive_ping(), client.peer).await;
                client.touch_tx();
            }
        }
    }

    /// Time until the earliest per-client keepalive or timeout event,
    /// capped so newly connecting clients are noticed promptly.
    fn next_check(&self) -> Duration {
        let now = Instant::now();
        let mut next = now + MAX_CHECK_INTERVAL;
        for client in self.clients.snapshot() {
            next = next.min(client.last_tx() + self.config.keepalive_time);
            next = next.min(client.last_rx() + self.config.client_timeout);
        }
        next.saturating_duration_since(now)
    }

    async fn send_packet(&self, pkt: &Packet, peer: SocketAddr) {
        if let Err(e) = self.socket.send_to(pkt.as_bytes(), peer).await {
            warn!(peer = %peer, error = %e, "udp send error");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use hex_literal::hex;

    #[test]
    fn registration_ack_wire_shape() {
        let ack = registration_ack(IpxAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]));
        let expected = hex!(
            "ffff 001e 00 00"
            "00000000 aabbccddeeff 0002"
            "00000001 ffffffffffff 0002"
        );
        assert_eq!(ack.as_bytes(), &expected[..]);
    }

    #[test]
    fn keepalive_ping_wire_shape() {
        let ping = keepalive_ping();
        let expected = hex!(
            "ffff 001e 00 00"
            "00000000 ffffffffffff 0002"
            "00000000 02ffffff0000 0000"
        );
        assert_eq!(ping.as_bytes(), &expected[..]);
    }
}
