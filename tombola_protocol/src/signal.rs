// Signaling messages exchanged with the broker.
//
// The broker is a thin directory: hosts register a room address pointing at
// their reachable socket address, players resolve a room address back to it.
// These messages never cross the host↔player boundary — they exist only on
// broker connections — so they use serde's default external tagging rather
// than the `{kind, payload}` envelope shape.
//
// Error classification is by typed variant, not message text:
// `AddressTaken` is the one fatal broker response (and only fatal before an
// address was ever assigned — see the transport's reconnect policy);
// everything I/O-shaped on a broker connection is transient.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Requests sent to the broker. One request per connection; a `Register`
/// connection then stays open for as long as the registration should live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalRequest {
    /// Claim `address` and map it to `host_addr` (the host's peer listener).
    Register {
        address: String,
        host_addr: SocketAddr,
    },
    /// Look up the host behind `address`.
    Resolve { address: String },
}

/// Responses from the broker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalResponse {
    /// Registration accepted; it lives until this connection closes.
    Registered,
    /// The address is already registered by a live connection.
    AddressTaken,
    /// Resolution succeeded.
    Resolved { host_addr: SocketAddr },
    /// No live registration for that address.
    NotFound,
}
