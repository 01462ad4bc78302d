// Host-authoritative multiplayer session core for 90-ball tombola.
//
// One peer hosts: it owns the only authoritative game state and fans every
// change out to connected players. Players hold replicas that are never
// computed locally, only replaced by what the host broadcasts. A separate
// signaling broker (`tombola_broker`) maps short room codes to the host's
// direct address; it is consulted at join time only and is never in the
// gameplay path.
//
// Module map:
// - `rng`      xoshiro256++ PRNG, the sole source of randomness
// - `room`     room codes and their broker address namespace
// - `error`    typed error taxonomy (fatal vs transient is by variant)
// - `signal`   broker register/resolve plus the reconnecting link keeper
// - `ticket`   the 3×9 ticket grid, generation and marking
// - `calls`    caller commentary, canned calls and the announcer seam
// - `host`     `HostSession`: authoritative state, broadcast fan-out
// - `server`   the host event loop, acceptor, and `HostHandle`
// - `client`   `PlayerClient`: resolve, connect, pump envelopes
// - `replica`  the player-side state mirror and win detection

pub mod calls;
pub mod client;
pub mod error;
pub mod host;
pub mod replica;
pub mod rng;
pub mod room;
pub mod server;
pub mod signal;
pub mod ticket;

pub use calls::{CallAnnouncer, CannedCalls, canned_call};
pub use client::{ClientEvent, PlayerClient};
pub use error::{HostError, JoinError, MarkError};
pub use host::{ConnId, DrawOutcome, GamePhase, HostEvent, HostSession, HostState, MAX_NUMBER};
pub use replica::{Marked, Replica, ReplicaEvent, WinKind};
pub use rng::GameRng;
pub use server::{HostConfig, HostHandle, start_hosting, start_hosting_with};
pub use ticket::Ticket;
