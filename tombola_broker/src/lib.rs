// tombola_broker — signaling broker for Tombola session bootstrap.
//
// The broker is a thin directory service: a host registers its room address
// (prefix + code) pointing at the socket address of its peer listener, and
// players resolve a room address back to that socket address at join time.
// The broker never sees game traffic — once a player has resolved the host,
// the two talk directly. A registration lives exactly as long as the host's
// signaling connection stays open, so a crashed host disappears from the
// directory without any timeout bookkeeping.
//
// Module overview:
// - `registry.rs`: Address → host mapping with generation tokens so stale
//                  disconnect notifications cannot evict a newer
//                  registration of the same address.
// - `server.rs`:   TCP listener, per-registration monitor threads, and the
//                  main event loop. Uses `std::net` with an `mpsc` channel
//                  funneling events into the single-threaded `Registry`.
//
// Dependencies: `tombola_protocol` (signaling message types and framing).
// No dependency on the session crate.
//
// The broker can run as a standalone binary (`main.rs`) or be embedded in a
// test process via the library API (`start_broker`).

pub mod registry;
pub mod server;

pub use server::{BrokerConfig, BrokerHandle, start_broker};
