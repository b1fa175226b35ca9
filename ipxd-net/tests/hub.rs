#![allow(clippy::unwrap_used)]

//! Segment-level behavior of the in-memory hub: address allocation,
//! unicast and broadcast routing, close semantics, and decorator
//! transparency.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ipxd_core::{IpxAddr, NetworkNum};
use ipxd_net::packet::{IpxHeader, IpxHeaderAddr, CHECKSUM_NONE, HEADER_LEN};
use ipxd_net::{Hub, Network, Node, Packet, StatsNetwork, Statistics};

fn data_packet(src: IpxAddr, dest: IpxAddr, payload: &[u8]) -> Packet {
    let header = IpxHeader {
        checksum: CHECKSUM_NONE,
        length: (HEADER_LEN + payload.len()) as u16,
        transport_control: 0,
        packet_type: 0,
        dest: IpxHeaderAddr::new(NetworkNum::ZERO, dest, 0x4002),
        src: IpxHeaderAddr::new(NetworkNum::ZERO, src, 0x4002),
    };
    Packet::new(header, payload)
}

async fn read_with_timeout(node: &Arc<dyn Node>) -> Option<Packet> {
    tokio::time::timeout(Duration::from_secs(1), node.read_packet())
        .await
        .expect("read timed out")
}

async fn assert_no_packet(node: &Arc<dyn Node>) {
    let result = tokio::time::timeout(Duration::from_millis(100), node.read_packet()).await;
    assert!(result.is_err(), "unexpected packet delivered");
}

#[tokio::test]
async fn addresses_are_unique_and_persistent() {
    let hub = Hub::new();
    let mut nodes = Vec::new();
    let mut seen = HashSet::new();
    for _ in 0..64 {
        let node = hub.new_node().await.unwrap();
        let addr = node.address();
        assert!(!addr.is_null());
        assert!(!addr.is_broadcast());
        assert_ne!(addr, IpxAddr::PING_REPLY);
        assert!(seen.insert(addr), "duplicate address {addr}");
        nodes.push(node);
    }
    assert_eq!(hub.node_count(), 64);
    for node in &nodes {
        assert!(seen.contains(&node.address()));
    }
}

#[tokio::test]
async fn unicast_reaches_exactly_the_destination() {
    let hub = Hub::new();
    let a = hub.new_node().await.unwrap();
    let b = hub.new_node().await.unwrap();
    let c = hub.new_node().await.unwrap();

    a.write_packet(data_packet(a.address(), b.address(), b"hello"))
        .unwrap();

    let got = read_with_timeout(&b).await.unwrap();
    assert_eq!(got.payload(), b"hello");
    assert_eq!(got.header.src.node, a.address());
    assert_no_packet(&a).await;
    assert_no_packet(&c).await;
}

#[tokio::test]
async fn unicast_to_unknown_or_self_is_dropped() {
    let hub = Hub::new();
    let a = hub.new_node().await.unwrap();

    a.write_packet(data_packet(a.address(), IpxAddr([9; 6]), b"void"))
        .unwrap();
    a.write_packet(data_packet(a.address(), a.address(), b"self"))
        .unwrap();
    assert_no_packet(&a).await;
}

#[tokio::test]
async fn broadcast_reaches_everyone_but_the_sender() {
    let hub = Hub::new();
    let a = hub.new_node().await.unwrap();
    let b = hub.new_node().await.unwrap();
    let c = hub.new_node().await.unwrap();

    a.write_packet(data_packet(a.address(), IpxAddr::BROADCAST, b"all"))
        .unwrap();

    for node in [&b, &c] {
        let got = read_with_timeout(node).await.unwrap();
        assert_eq!(got.payload(), b"all");
        // Exactly one copy each.
        assert_no_packet(node).await;
    }
    assert_no_packet(&a).await;
}

#[tokio::test]
async fn broadcast_ignores_network_number() {
    let hub = Hub::new();
    let a = hub.new_node().await.unwrap();
    let b = hub.new_node().await.unwrap();

    let mut pkt = data_packet(a.address(), IpxAddr::BROADCAST, b"x");
    pkt.header.dest.network = NetworkNum([0xde, 0xad, 0xbe, 0xef]);
    let pkt = Packet::new(pkt.header, b"x");
    a.write_packet(pkt).unwrap();
    assert_eq!(read_with_timeout(&b).await.unwrap().payload(), b"x");
}

#[tokio::test]
async fn pairwise_fifo_is_preserved() {
    let hub = Hub::new();
    let a = hub.new_node().await.unwrap();
    let b = hub.new_node().await.unwrap();

    for n in 0u8..16 {
        a.write_packet(data_packet(a.address(), b.address(), &[n]))
            .unwrap();
    }
    for n in 0u8..16 {
        assert_eq!(read_with_timeout(&b).await.unwrap().payload(), &[n]);
    }
}

#[tokio::test]
async fn close_is_idempotent_and_yields_eof() {
    let hub = Hub::new();
    let a = hub.new_node().await.unwrap();
    let b = hub.new_node().await.unwrap();
    let b_addr = b.address();

    b.close();
    b.close();
    assert!(b.read_packet().await.is_none());
    assert_eq!(hub.node_count(), 1);

    // Writes to the departed node vanish; writes by it are dropped too.
    a.write_packet(data_packet(a.address(), b_addr, b"late"))
        .unwrap();
    b.write_packet(data_packet(b_addr, a.address(), b"ghost"))
        .unwrap();
    assert_no_packet(&a).await;
}

#[tokio::test]
async fn close_wakes_blocked_reader() {
    let hub = Hub::new();
    let a = hub.new_node().await.unwrap();
    let reader = {
        let a = Arc::clone(&a);
        tokio::spawn(async move { a.read_packet().await })
    };
    tokio::task::yield_now().await;
    a.close();
    let got = tokio::time::timeout(Duration::from_secs(1), reader)
        .await
        .expect("reader not woken")
        .unwrap();
    assert!(got.is_none());
}

#[tokio::test]
async fn stats_decorator_is_transparent_and_probeable() {
    let before = Instant::now();
    let network: Arc<dyn Network> = Arc::new(StatsNetwork::new(Arc::new(Hub::new())));
    let a = network.new_node().await.unwrap();
    let b = network.new_node().await.unwrap();

    let payload = b"counted";
    a.write_packet(data_packet(a.address(), b.address(), payload))
        .unwrap();
    let got = read_with_timeout(&b).await.unwrap();
    assert_eq!(got.payload(), payload);

    let mut stats = Statistics::default();
    assert!(a.get_property(&mut stats));
    assert_eq!(stats.tx_packets, 1);
    assert_eq!(stats.tx_bytes, (HEADER_LEN + payload.len()) as u64);
    assert_eq!(stats.rx_packets, 0);
    assert!(stats.connect_time >= before);
    assert!(stats.connect_time <= Instant::now());

    let mut stats = Statistics::default();
    assert!(b.get_property(&mut stats));
    assert_eq!(stats.rx_packets, 1);
    assert_eq!(stats.rx_bytes, (HEADER_LEN + payload.len()) as u64);

    // An unrecognized sink falls through the whole chain.
    let mut other = 0u32;
    assert!(!a.get_property(&mut other));
}
