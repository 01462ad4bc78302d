// Player-side replica of the game state.
//
// A replica never computes game logic on its own: the called-number ledger
// and current call are whatever the host last broadcast. Because both
// `state-sync` and `number-called` carry the complete ordered history,
// applying an envelope is idempotent — a duplicated or late message leaves
// the replica exactly as consistent as a perfect stream would.
//
// The ticket is the one piece of state the host never sees. It is generated
// locally at join (and regenerated on reset), and marking is validated
// against the replicated ledger. Win detection runs after every mark; the
// first completed row or full house arms a single `bingo-claim` envelope
// for the caller to send — claims are adjudicated by the host's human, not
// by code, so the replica only ever raises its hand once.

use tombola_protocol::envelope::{ChatMessage, Envelope};
use tracing::warn;

use crate::error::MarkError;
use crate::rng::GameRng;
use crate::ticket::Ticket;

/// What a winning ticket achieved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WinKind {
    /// All five numbers of one row marked.
    Row(usize),
    /// Every number on the ticket marked.
    FullHouse,
}

/// State changes surfaced to the embedding UI after applying an envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplicaEvent {
    Snapshot,
    NumberCalled { number: u8, call_text: String },
    Chat(ChatMessage),
    Reset,
    Kicked,
}

/// Result of a mark attempt: the cell's new state plus, at most once per
/// round, the claim envelope to send to the host.
#[derive(Clone, Debug, PartialEq)]
pub struct Marked {
    pub marked: bool,
    pub claim: Option<Envelope>,
}

/// One player's view of the session.
pub struct Replica {
    name: String,
    avatar: Option<String>,
    ledger: Vec<u8>,
    current: Option<u8>,
    ticket: Ticket,
    chat: Vec<ChatMessage>,
    won: Option<WinKind>,
    rng: GameRng,
}

impl Replica {
    pub fn new(name: String, avatar: Option<String>, mut rng: GameRng) -> Self {
        let ticket = Ticket::generate(&mut rng);
        Self {
            name,
            avatar,
            ledger: Vec::new(),
            current: None,
            ticket,
            chat: Vec::new(),
            won: None,
            rng,
        }
    }

    /// Apply one inbound envelope. Returns the resulting UI event, or
    /// `None` for envelopes that never travel host-to-player.
    pub fn apply(&mut self, envelope: &Envelope) -> Option<ReplicaEvent> {
        match envelope {
            Envelope::StateSync { history, current } => {
                self.ledger = history.clone();
                self.current = *current;
                Some(ReplicaEvent::Snapshot)
            }
            Envelope::NumberCalled {
                number,
                call_text,
                history,
            } => {
                // Full-history replacement, not an append: this is what
                // makes a lost or reordered call self-heal.
                self.ledger = history.clone();
                self.current = Some(*number);
                Some(ReplicaEvent::NumberCalled {
                    number: *number,
                    call_text: call_text.clone(),
                })
            }
            Envelope::ChatMessage(msg) => {
                self.chat.push(msg.clone());
                Some(ReplicaEvent::Chat(msg.clone()))
            }
            Envelope::Reset {} => {
                self.ledger.clear();
                self.current = None;
                self.chat.clear();
                self.won = None;
                self.ticket = Ticket::generate(&mut self.rng);
                Some(ReplicaEvent::Reset)
            }
            Envelope::PlayerKicked {} => Some(ReplicaEvent::Kicked),
            other => {
                warn!(kind = ?other, "player-only envelope from host ignored");
                None
            }
        }
    }

    /// Toggle a mark on the local ticket. The number must be on the
    /// replicated ledger. The first completed row or full house arms the
    /// claim envelope exactly once per round.
    pub fn mark_cell(&mut self, row: usize, col: usize) -> Result<Marked, MarkError> {
        let marked = self.ticket.mark(row, col, &self.ledger)?;

        let mut claim = None;
        if self.won.is_none() {
            let win = if self.ticket.full_house() {
                Some(WinKind::FullHouse)
            } else if self.ticket.row_complete(row) {
                Some(WinKind::Row(row))
            } else {
                None
            };
            if let Some(win) = win {
                self.won = Some(win);
                claim = Some(Envelope::BingoClaim {});
            }
        }

        Ok(Marked { marked, claim })
    }

    /// Build a chat envelope for sending and append it to the local log —
    /// the host never echoes a message back to its sender.
    pub fn make_chat(&mut self, text: &str) -> Envelope {
        let msg = ChatMessage {
            id: self.rng.id_hex(),
            sender: self.name.clone(),
            text: text.to_string(),
            system: false,
            avatar: self.avatar.clone(),
        };
        self.chat.push(msg.clone());
        Envelope::ChatMessage(msg)
    }

    /// The join handshake envelope, sent once after connecting.
    pub fn join_envelope(&self) -> Envelope {
        Envelope::PlayerJoined {
            name: self.name.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ledger(&self) -> &[u8] {
        &self.ledger
    }

    pub fn current_call(&self) -> Option<u8> {
        self.current
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn chat(&self) -> &[ChatMessage] {
        &self.chat
    }

    pub fn won(&self) -> Option<WinKind> {
        self.won
    }
}
