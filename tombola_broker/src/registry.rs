// Address registry for the signaling broker.
//
// `Registry` is the central data structure that `server.rs` drives. It maps
// room addresses to the registering host's reachable socket address, for as
// long as the host's signaling connection stays open. All mutation happens
// through methods called from the broker's single-threaded main loop — no
// internal locking.
//
// Each registration carries a generation token. Unregister events arrive
// asynchronously from monitor threads watching the registration sockets; if
// a host drops and a new host claims the same address before the old
// monitor notices EOF, the stale unregister must not evict the new entry.
// The token makes unregistration precise: it only removes the entry it was
// issued for.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};

/// A live registration: where to find the host, which signaling connection
/// keeps it alive, and the generation token guarding its removal.
pub struct Registration {
    pub host_addr: SocketAddr,
    pub token: u64,
    /// Kept so shutdown can close the signaling connection, which unblocks
    /// the monitor thread watching it.
    pub stream: TcpStream,
}

/// Room-address directory owned by the broker's main loop.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<String, Registration>,
    next_token: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to register `address`. Returns the generation token on
    /// success, or `None` if the address is already held by a live
    /// registration.
    pub fn register(
        &mut self,
        address: String,
        host_addr: SocketAddr,
        stream: TcpStream,
    ) -> Option<u64> {
        if self.entries.contains_key(&address) {
            return None;
        }
        let token = self.next_token;
        self.next_token += 1;
        self.entries.insert(
            address,
            Registration {
                host_addr,
                token,
                stream,
            },
        );
        Some(token)
    }

    /// Look up the host behind `address`.
    pub fn resolve(&self, address: &str) -> Option<SocketAddr> {
        self.entries.get(address).map(|reg| reg.host_addr)
    }

    /// Remove a registration, but only if the token matches — a stale
    /// monitor thread must not evict a newer registration of the same
    /// address.
    pub fn unregister(&mut self, address: &str, token: u64) -> bool {
        match self.entries.get(address) {
            Some(reg) if reg.token == token => {
                self.entries.remove(address);
                true
            }
            _ => false,
        }
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shut down every registration socket. Used on broker shutdown to
    /// unblock monitor threads and let hosts notice the broker is gone.
    pub fn close_all(&mut self) {
        for reg in self.entries.values() {
            let _ = reg.stream.shutdown(std::net::Shutdown::Both);
        }
        self.entries.clear();
    }
}
