// The broadcast envelope — the sole unit of information crossing the
// session boundary between host and players.
//
// `Envelope` is an adjacently-tagged enum serializing to
// `{"kind": "<kebab-case>", "payload": {...}}`. This JSON shape is the one
// wire contract that must stay compatible across implementations; everything
// else (framing, signaling) is internal to this codebase.
//
// Kinds and direction:
// - `state-sync`     host → new player   full ledger + current call
// - `number-called`  host → all          number, call text, full ledger
// - `chat-message`   bidirectional       host re-broadcasts to other players
// - `reset`          host → all          round reset
// - `player-joined`  player → host       join handshake (display name)
// - `player-kicked`  host → one          forced exit
// - `bingo-claim`    player → host       manual verification by the host
//
// `number-called` deliberately carries the complete ordered history rather
// than a delta: applying it is idempotent and order-independent, so a lost
// or duplicated message self-heals on the next successful one.

use serde::{Deserialize, Serialize};

/// A single chat entry. Immutable once created; the `system` flag marks
/// host-generated announcements (round over, etc.) rather than player text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: String,
    pub text: String,
    #[serde(default)]
    pub system: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// The tagged message unit exchanged between host and players.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum Envelope {
    /// Full-state snapshot, sent once to a newly joined connection.
    StateSync {
        history: Vec<u8>,
        current: Option<u8>,
    },
    /// A number was drawn. Carries the full ordered history for self-healing.
    NumberCalled {
        number: u8,
        call_text: String,
        history: Vec<u8>,
    },
    /// Chat from either side. The host forwards player chat verbatim to
    /// every *other* open connection (never echoed back to the sender).
    ChatMessage(ChatMessage),
    /// Round reset — replicas clear everything and regenerate tickets.
    Reset {},
    /// Join handshake: the first envelope a player sends after connecting.
    PlayerJoined { name: String },
    /// The host removed this player; the client must exit.
    PlayerKicked {},
    /// The player believes a row (or the full ticket) is complete.
    BingoClaim {},
}
