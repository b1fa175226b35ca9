#![forbid(unsafe_code)]

//! Bit-exact codec for the 30-byte IPX header used by the DOSBox
//! IPX-over-UDP dialect. Every multi-byte field is big-endian on the
//! wire; socket numbers are kept host-endian in memory.

use bytes::Bytes;
use nom::{
    bytes::complete::take,
    number::complete::{be_u16, u8},
    IResult,
};

use ipxd_core::{IpxAddr, NetworkNum, REGISTRATION_SOCKET};

use crate::errors::{Error, Result};

/// Fixed IPX header length in bytes.
pub const HEADER_LEN: usize = 30;

/// Largest datagram carried over the tunnel, header included.
pub const MAX_PACKET: usize = 1500;

/// Checksum field value used on the wire. The field is unused by the
/// dialect and always carries all-ones.
pub const CHECKSUM_NONE: u16 = 0xffff;

/// One address triple inside the IPX header: network, node, socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpxHeaderAddr {
    pub network: NetworkNum,
    pub node: IpxAddr,
    pub socket: u16,
}

impl IpxHeaderAddr {
    pub fn new(network: NetworkNum, node: IpxAddr, socket: u16) -> Self {
        Self {
            network,
            node,
            socket,
        }
    }
}

/// Parsed 30-byte IPX header.
///
/// The `length` field is advisory: it is decoded but never checked
/// against the actual datagram size, and ingress never truncates based
/// on it. Egress-synthesized packets set it to the true total length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpxHeader {
    pub checksum: u16,
    pub length: u16,
    pub transport_control: u8,
    pub packet_type: u8,
    pub dest: IpxHeaderAddr,
    pub src: IpxHeaderAddr,
}

impl IpxHeader {
    /// True for a client registration request: destination socket 2 with
    /// the all-zero destination node.
    pub fn is_registration(&self) -> bool {
        self.dest.socket == REGISTRATION_SOCKET && self.dest.node.is_null()
    }

    /// Serialize into the fixed 30-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        self.encode_into(&mut buf);
        buf
    }

    /// Serialize into a caller-provided 30-byte buffer.
    pub fn encode_into(&self, buf: &mut [u8; HEADER_LEN]) {
        buf[0..2].copy_from_slice(&self.checksum.to_be_bytes());
        buf[2..4].copy_from_slice(&self.length.to_be_bytes());
        buf[4] = self.transport_control;
        buf[5] = self.packet_type;
        encode_addr(&self.dest, &mut buf[6..18]);
        encode_addr(&self.src, &mut buf[18..30]);
    }
}

fn encode_addr(addr: &IpxHeaderAddr, buf: &mut [u8]) {
    buf[0..4].copy_from_slice(addr.network.as_bytes());
    buf[4..10].copy_from_slice(addr.node.as_bytes());
    buf[10..12].copy_from_slice(&addr.socket.to_be_bytes());
}

fn parse_addr(input: &[u8]) -> IResult<&[u8], IpxHeaderAddr> {
    let (input, network) = take(4u8)(input)?;
    let (input, node) = take(6u8)(input)?;
    let (input, socket) = be_u16(input)?;
    let mut net = [0u8; 4];
    net.copy_from_slice(network);
    let mut nod = [0u8; 6];
    nod.copy_from_slice(node);
    Ok((
        input,
        IpxHeaderAddr {
            network: NetworkNum(net),
            node: IpxAddr(nod),
            socket,
        },
    ))
}

/// Parse the fixed 30-byte IPX header from the front of a datagram.
pub fn parse_header(input: &[u8]) -> IResult<&[u8], IpxHeader> {
    let (input, checksum) = be_u16(input)?;
    let (input, length) = be_u16(input)?;
    let (input, transport_control) = u8(input)?;
    let (input, packet_type) = u8(input)?;
    let (input, dest) = parse_addr(input)?;
    let (input, src) = parse_addr(input)?;
    Ok((
        input,
        IpxHeader {
            checksum,
            length,
            transport_control,
            packet_type,
            dest,
            src,
        },
    ))
}

/// Decode a datagram into header and payload. The only failure mode is
/// an input shorter than the header.
pub fn decode(input: &[u8]) -> Result<(IpxHeader, &[u8])> {
    match parse_header(input) {
        Ok((payload, header)) => Ok((header, payload)),
        Err(_) => Err(Error::TooShort(input.len())),
    }
}

/// One IPX packet travelling through the segment: the parsed header plus
/// the full original datagram bytes, header included. `Bytes` keeps the
/// broadcast fan-out cheap since clones share the same buffer.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: IpxHeader,
    raw: Bytes,
}

impl Packet {
    /// Decode a received datagram into a packet.
    pub fn parse(raw: Bytes) -> Result<Self> {
        let (header, _) = decode(&raw)?;
        Ok(Self { header, raw })
    }

    /// Synthesize a header-only packet, e.g. a registration ack or a
    /// keepalive ping.
    pub fn from_header(header: IpxHeader) -> Self {
        Self {
            header,
            raw: Bytes::copy_from_slice(&header.encode()),
        }
    }

    /// Synthesize a packet from a header and payload.
    pub fn new(header: IpxHeader, payload: &[u8]) -> Self {
        let mut raw = Vec::with_capacity(HEADER_LEN + payload.len());
        raw.extend_from_slice(&header.encode());
        raw.extend_from_slice(payload);
        Self {
            header,
            raw: Bytes::from(raw),
        }
    }

    /// Full wire bytes, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Bytes after the 30-byte header.
    pub fn payload(&self) -> &[u8] {
        &self.raw[HEADER_LEN..]
    }

    /// Total wire length, header included.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}
