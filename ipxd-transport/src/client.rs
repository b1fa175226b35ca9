//! Per-client records and the table keyed by UDP peer address.
//!
//! The hub resolves packet destinations internally, so the peer map is
//! the only index the server keeps; there is no node-to-client map.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use ipxd_net::Node;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct Times {
    /// Wall-clock of the most recent valid ingress datagram.
    last_rx: Instant,
    /// Wall-clock of the most recent egress datagram.
    last_tx: Instant,
}

/// One registered UDP peer bound to one segment node.
pub(crate) struct Client {
    pub(crate) peer: SocketAddr,
    pub(crate) node: Arc<dyn Node>,
    times: Mutex<Times>,
}

impl Client {
    pub(crate) fn new(peer: SocketAddr, node: Arc<dyn Node>) -> Self {
        let now = Instant::now();
        Self {
            peer,
            node,
            times: Mutex::new(Times {
                last_rx: now,
                last_tx: now,
            }),
        }
    }

    pub(crate) fn touch_rx(&self) {
        lock(&self.times).last_rx = Instant::now();
    }

    pub(crate) fn touch_tx(&self) {
        lock(&self.times).last_tx = Instant::now();
    }

    pub(crate) fn last_rx(&self) -> Instant {
        lock(&self.times).last_rx
    }

    pub(crate) fn last_tx(&self) -> Instant {
        lock(&self.times).last_tx
    }
}

/// Mutex-guarded client table. The lock is held for table mutations
/// only, never across I/O.
#[derive(Default)]
pub(crate) struct ClientTable {
    inner: Mutex<HashMap<SocketAddr, Arc<Client>>>,
}

impl ClientTable {
    pub(crate) fn get(&self, peer: &SocketAddr) -> Option<Arc<Client>> {
        lock(&self.inner).get(peer).cloned()
    }

    pub(crate) fn insert(&self, client: Arc<Client>) {
        lock(&self.inner).insert(client.peer, client);
    }

    pub(crate) fn remove(&self, peer: &SocketAddr) -> Option<Arc<Client>> {
        lock(&self.inner).remove(peer)
    }

    /// Clones of every live client, for iteration outside the lock.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Client>> {
        lock(&self.inner).values().cloned().collect()
    }

    /// Empty the table, returning the former occupants.
    pub(crate) fn drain(&self) -> Vec<Arc<Client>> {
        lock(&self.inner).drain().map(|(_, c)| c).collect()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.inner).len()
    }
}
