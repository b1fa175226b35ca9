#![cfg_attr(test, allow(clippy::unwrap_used))]

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// IPX socket number used by the registration handshake.
///
/// IPX sockets are 16-bit demultiplexing numbers inside a node and are
/// unrelated to OS sockets. They are kept host-endian in memory and
/// written big-endian on the wire.
pub const REGISTRATION_SOCKET: u16 = 2;

/// Six-byte IPX node address identifying one endpoint inside a virtual
/// segment. MAC-shaped but carries no structural meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpxAddr(pub [u8; 6]);

impl IpxAddr {
    /// The all-zero address. Never assigned to a client; a registration
    /// packet carries it as its destination node.
    pub const NULL: IpxAddr = IpxAddr([0; 6]);

    /// The all-ones broadcast address.
    pub const BROADCAST: IpxAddr = IpxAddr([0xff; 6]);

    /// Pseudo-address used as the source of server keepalive pings, so
    /// that client replies are not mistaken for fresh registrations.
    pub const PING_REPLY: IpxAddr = IpxAddr([0x02, 0xff, 0xff, 0xff, 0x00, 0x00]);

    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Get the underlying byte array
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<[u8; 6]> for IpxAddr {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for IpxAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for IpxAddr {
    type Err = crate::Error;

    /// Parse the colon-separated form produced by `Display`, e.g.
    /// `02:ff:ff:ff:00:00`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for slot in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| crate::Error::protocol(format!("bad node address: {s}")))?;
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| crate::Error::protocol(format!("bad node address: {s}")))?;
        }
        if parts.next().is_some() {
            return Err(crate::Error::protocol(format!("bad node address: {s}")));
        }
        Ok(Self(bytes))
    }
}

/// Four-byte IPX network number. The virtual segment does no
/// multi-network routing; the value is carried verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkNum(pub [u8; 4]);

impl NetworkNum {
    pub const ZERO: NetworkNum = NetworkNum([0; 4]);

    pub fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the underlying byte array
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for NetworkNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(f, "{:02x}.{:02x}.{:02x}.{:02x}", b[0], b[1], b[2], b[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_addresses() {
        assert!(IpxAddr::NULL.is_null());
        assert!(IpxAddr::BROADCAST.is_broadcast());
        assert!(!IpxAddr::PING_REPLY.is_null());
        assert!(!IpxAddr::PING_REPLY.is_broadcast());
    }

    #[test]
    fn display_roundtrip() {
        let addr = IpxAddr([0x02, 0xff, 0xff, 0xff, 0x00, 0x00]);
        let shown = addr.to_string();
        assert_eq!(shown, "02:ff:ff:ff:00:00");
        assert_eq!(shown.parse::<IpxAddr>().unwrap(), addr);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("02:ff".parse::<IpxAddr>().is_err());
        assert!("zz:00:00:00:00:00".parse::<IpxAddr>().is_err());
        assert!("00:00:00:00:00:00:00".parse::<IpxAddr>().is_err());
    }
}
