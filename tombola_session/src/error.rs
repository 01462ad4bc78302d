// Error taxonomy for the session layer.
//
// Classification is by typed variant at the transport boundary — never by
// inspecting error message text. The fatal/transient split matters for the
// broker link: `AddressTaken` is fatal only while no address has been
// assigned yet (a fresh `start_hosting`); once hosting, the same response
// during re-registration is treated as a stale registry entry and retried,
// because live players must not be dropped over a signaling hiccup.

use std::io;

use thiserror::Error;

use crate::room::InvalidRoomCode;

/// Failures starting a hosting session. All of these occur before any
/// player has connected, so they are surfaced to the caller as fatal.
#[derive(Debug, Error)]
pub enum HostError {
    /// The signaling exchange with the broker could not complete.
    #[error("signaling broker unavailable: {0}")]
    BrokerUnavailable(#[source] io::Error),

    /// The broker reports the room address in use. Fatal here because no
    /// address has been assigned yet; pick another code.
    #[error("room address already in use")]
    AddressTaken,

    /// The caller-supplied room code is malformed.
    #[error(transparent)]
    InvalidCode(#[from] InvalidRoomCode),

    /// Local failure (binding the peer listener, cloning sockets).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Failures joining a session. Fatal for the join attempt only — no partial
/// state is created; the user re-enters a code and tries again.
#[derive(Debug, Error)]
pub enum JoinError {
    /// The entered room code is malformed.
    #[error(transparent)]
    InvalidCode(#[from] InvalidRoomCode),

    /// No host is registered at that address.
    #[error("no session found for that room code")]
    PeerNotFound,

    /// The broker could not be reached or answered garbage.
    #[error("signaling broker unavailable: {0}")]
    BrokerUnavailable(#[source] io::Error),

    /// The broker resolved the code but the host could not be reached.
    #[error("could not reach the host: {0}")]
    NetworkError(#[source] io::Error),
}

/// Rejected ticket-marking attempts. Local-only — nothing crosses the wire.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MarkError {
    /// Row or column outside the 3×9 grid.
    #[error("cell out of bounds")]
    OutOfBounds,

    /// The cell holds no number.
    #[error("cell is empty")]
    EmptyCell,

    /// The cell's number has not been called this round.
    #[error("number {0} has not been called")]
    NotCalled(u8),
}
