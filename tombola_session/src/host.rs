// Authoritative game state for the hosting side.
//
// `HostSession` is the central data structure that `server.rs` drives. It
// tracks the called-number ledger, the game phase, the player roster, and
// the chat history. All mutation happens through methods called from the
// host's single-threaded event loop — no internal locking. The sequencing
// rule is always mutate-then-broadcast: the owned `HostState` is updated
// first, then the resulting envelope fans out to connections.
//
// Key responsibilities:
// - Player roster: add/remove connections, associate display names, send
//   each new connection its one-off state-sync snapshot.
// - Drawing: uniform pick from the undrawn pool, append to the ledger,
//   broadcast `number-called` with the full ordered history.
// - Chat: host messages go to everyone; player messages are forwarded to
//   every *other* connection (the sender already has its local copy).
// - Round lifecycle: reset clears ledger and chat; pool exhaustion is a
//   terminal transition to `Finished`, announced via a system chat message.
//
// Writing to peer streams: `HostSession` holds cloned `TcpStream` write
// halves wrapped in `BufWriter`. The `send_to` / `broadcast` helpers
// serialize an `Envelope` to JSON, frame it, and write it out. Write errors
// on a single connection are logged but never block delivery to siblings or
// roll back local state — the reader thread for that connection will detect
// the broken pipe and report a disconnect.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::TcpStream;

use serde::{Deserialize, Serialize};
use tombola_protocol::envelope::{ChatMessage, Envelope};
use tombola_protocol::framing::write_message;
use tracing::{debug, warn};

use crate::calls::{CallAnnouncer, CannedCalls, canned_call};
use crate::rng::GameRng;

/// Highest ball in the pool; the ledger holds distinct values in 1..=90.
pub const MAX_NUMBER: u8 = 90;

/// Auto-draw pacing bounds, in milliseconds. Requested intervals are
/// clamped into this range to keep the game playable.
pub const MIN_AUTO_INTERVAL_MS: u64 = 2000;
pub const MAX_AUTO_INTERVAL_MS: u64 = 10_000;

/// Identifies one player connection for the lifetime of the session.
/// Assigned in join order, which is also the roster display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnId(pub u64);

/// Where the round stands. `Drawing` means the auto-draw timer is active;
/// `Paused` is manual mode after at least one draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    #[default]
    Idle,
    Drawing,
    Paused,
    Finished,
}

/// The single owned, serializable game state. Mutated only by
/// `HostSession` methods, then handed to the broadcast step.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HostState {
    pub ledger: Vec<u8>,
    pub current: Option<u8>,
    pub phase: GamePhase,
    pub chat: Vec<ChatMessage>,
}

/// Result of a `draw()` attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrawOutcome {
    Called { number: u8, call_text: String },
    /// Pool empty — the round is over. Not an error.
    Exhausted,
}

/// Events surfaced to the embedding UI (the presentation layer polls
/// these; the core never renders).
#[derive(Clone, Debug, PartialEq)]
pub enum HostEvent {
    PlayerJoined { conn: ConnId, name: String },
    PlayerLeft { conn: ConnId, name: String },
    NumberDrawn { number: u8, call_text: String },
    Chat(ChatMessage),
    BingoClaim { conn: ConnId, name: String },
    RoundReset,
    RoundFinished,
}

struct PeerConn {
    name: String,
    writer: BufWriter<TcpStream>,
}

/// Host session owning the authoritative state and the broadcast set.
/// Connection ids are assigned by the caller (the event loop's acceptor),
/// so reader threads know their id before the session does.
pub struct HostSession {
    state: HostState,
    connections: BTreeMap<ConnId, PeerConn>,
    rng: GameRng,
    announcer: Box<dyn CallAnnouncer>,
    host_name: String,
    events: Vec<HostEvent>,
}

impl HostSession {
    pub fn new(host_name: String, rng: GameRng) -> Self {
        Self::with_announcer(host_name, rng, Box::new(CannedCalls))
    }

    /// Plug in an external announcer (AI commentary). Its failures degrade
    /// to the canned calls — a draw never blocks on enrichment.
    pub fn with_announcer(
        host_name: String,
        rng: GameRng,
        announcer: Box<dyn CallAnnouncer>,
    ) -> Self {
        Self {
            state: HostState::default(),
            connections: BTreeMap::new(),
            rng,
            announcer,
            host_name,
            events: Vec::new(),
        }
    }

    /// Add a player whose join handshake carried `name`. Sends the
    /// state-sync snapshot to that connection only, so a late joiner
    /// recovers the full history without replaying deltas.
    pub fn add_player(&mut self, conn: ConnId, name: String, stream: TcpStream) {
        let writer = BufWriter::new(stream);

        self.connections.insert(
            conn,
            PeerConn {
                name: name.clone(),
                writer,
            },
        );

        self.send_to(
            conn,
            &Envelope::StateSync {
                history: self.state.ledger.clone(),
                current: self.state.current,
            },
        );

        self.events.push(HostEvent::PlayerJoined { conn, name });
    }

    /// Remove a connection after its channel closed. Game state is
    /// unaffected — the host is the sole source of truth.
    pub fn remove_connection(&mut self, conn: ConnId) {
        if let Some(pc) = self.connections.remove(&conn) {
            self.events.push(HostEvent::PlayerLeft {
                conn,
                name: pc.name,
            });
        }
    }

    /// Kick one player: send `player-kicked` to that connection, then drop
    /// it.
    pub fn kick(&mut self, conn: ConnId) {
        if self.connections.contains_key(&conn) {
            self.send_to(conn, &Envelope::PlayerKicked {});
            if let Some(pc) = self.connections.get(&conn) {
                let _ = pc.writer.get_ref().shutdown(std::net::Shutdown::Both);
            }
            self.remove_connection(conn);
        }
    }

    /// Draw one number uniformly from the undrawn pool and broadcast it.
    ///
    /// Valid in `Idle`, `Paused`, and `Drawing`; a manual draw from `Idle`
    /// enters `Paused` (manual mode). On an empty pool this never mutates
    /// the ledger: it transitions to `Finished` (idempotently) and the
    /// first such transition is announced with a system chat message.
    pub fn draw(&mut self) -> DrawOutcome {
        let remaining: Vec<u8> = (1..=MAX_NUMBER)
            .filter(|n| !self.state.ledger.contains(n))
            .collect();

        if remaining.is_empty() {
            self.finish_round();
            return DrawOutcome::Exhausted;
        }

        let number = remaining[self.rng.range_usize(0, remaining.len())];
        self.state.ledger.push(number);
        self.state.current = Some(number);
        if self.state.phase == GamePhase::Idle {
            self.state.phase = GamePhase::Paused;
        }

        let call_text = self
            .announcer
            .announce(number)
            .unwrap_or_else(|| canned_call(number));

        self.broadcast(&Envelope::NumberCalled {
            number,
            call_text: call_text.clone(),
            history: self.state.ledger.clone(),
        });
        self.events.push(HostEvent::NumberDrawn {
            number,
            call_text: call_text.clone(),
        });

        // The 90th draw empties the pool — close out the round right away
        // instead of waiting for one more draw attempt.
        if self.state.ledger.len() == usize::from(MAX_NUMBER) {
            self.finish_round();
        }

        DrawOutcome::Called { number, call_text }
    }

    /// Enter auto-play. Clamps the interval to the playable range, performs
    /// the immediate first draw, and returns the effective interval for the
    /// event loop's timer. Further draws are the loop's responsibility.
    pub fn start_auto(&mut self, interval_ms: u64) -> std::time::Duration {
        let clamped = interval_ms.clamp(MIN_AUTO_INTERVAL_MS, MAX_AUTO_INTERVAL_MS);
        if self.state.phase != GamePhase::Finished {
            self.state.phase = GamePhase::Drawing;
            let _ = self.draw();
        }
        std::time::Duration::from_millis(clamped)
    }

    /// Leave auto-play. Idempotent; `Idle` stays `Idle` when no draw has
    /// happened yet.
    pub fn stop_auto(&mut self) {
        if self.state.phase == GamePhase::Drawing {
            self.state.phase = if self.state.ledger.is_empty() {
                GamePhase::Idle
            } else {
                GamePhase::Paused
            };
        }
    }

    /// Start a fresh round: clear ledger, current call, and chat history,
    /// return to `Idle`, and broadcast `reset` to every connection.
    pub fn reset(&mut self) {
        self.state.ledger.clear();
        self.state.current = None;
        self.state.chat.clear();
        self.state.phase = GamePhase::Idle;
        self.broadcast(&Envelope::Reset {});
        self.events.push(HostEvent::RoundReset);
    }

    /// Chat typed by the host — goes to every connection.
    pub fn host_chat(&mut self, text: &str) {
        let msg = ChatMessage {
            id: self.rng.id_hex(),
            sender: self.host_name.clone(),
            text: text.to_string(),
            system: false,
            avatar: None,
        };
        self.state.chat.push(msg.clone());
        self.broadcast(&Envelope::ChatMessage(msg.clone()));
        self.events.push(HostEvent::Chat(msg));
    }

    /// Dispatch an inbound envelope from one player connection.
    pub fn handle_envelope(&mut self, conn: ConnId, envelope: Envelope) {
        match envelope {
            Envelope::ChatMessage(msg) => {
                self.state.chat.push(msg.clone());
                // Forward verbatim to everyone except the sender, who
                // already has its own local copy.
                self.broadcast_except(conn, &Envelope::ChatMessage(msg.clone()));
                self.events.push(HostEvent::Chat(msg));
            }
            Envelope::BingoClaim {} => {
                let name = self.player_name(conn).unwrap_or_default();
                self.events.push(HostEvent::BingoClaim { conn, name });
            }
            Envelope::PlayerJoined { .. } => {
                // The join handshake happens before add_player; a repeat is
                // harmless noise.
                debug!(?conn, "duplicate player-joined ignored");
            }
            other => {
                warn!(?conn, kind = ?other, "host-only envelope from player ignored");
            }
        }
    }

    /// Drain events for the embedding UI.
    pub fn take_events(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn phase(&self) -> GamePhase {
        self.state.phase
    }

    pub fn ledger(&self) -> &[u8] {
        &self.state.ledger
    }

    pub fn current_call(&self) -> Option<u8> {
        self.state.current
    }

    pub fn chat(&self) -> &[ChatMessage] {
        &self.state.chat
    }

    pub fn player_count(&self) -> usize {
        self.connections.len()
    }

    /// Roster in join order.
    pub fn players(&self) -> Vec<(ConnId, String)> {
        self.connections
            .iter()
            .map(|(conn, pc)| (*conn, pc.name.clone()))
            .collect()
    }

    pub fn player_name(&self, conn: ConnId) -> Option<String> {
        self.connections.get(&conn).map(|pc| pc.name.clone())
    }

    /// Shut down every peer socket. Used at session teardown to unblock
    /// reader threads.
    pub fn close_all(&mut self) {
        for pc in self.connections.values() {
            let _ = pc.writer.get_ref().shutdown(std::net::Shutdown::Both);
        }
        self.connections.clear();
    }

    /// Idempotent terminal transition. Announced once via a system chat
    /// message (the envelope vocabulary has no dedicated game-over kind).
    fn finish_round(&mut self) {
        if self.state.phase == GamePhase::Finished {
            return;
        }
        self.state.phase = GamePhase::Finished;
        let msg = ChatMessage {
            id: self.rng.id_hex(),
            sender: self.host_name.clone(),
            text: format!("That's the lot — all {MAX_NUMBER} numbers have been called!"),
            system: true,
            avatar: None,
        };
        self.state.chat.push(msg.clone());
        self.broadcast(&Envelope::ChatMessage(msg));
        self.events.push(HostEvent::RoundFinished);
    }

    /// Send an envelope to a specific connection. Write errors are logged
    /// and otherwise ignored (the reader thread will detect the broken
    /// pipe).
    fn send_to(&mut self, conn: ConnId, envelope: &Envelope) {
        if let Some(pc) = self.connections.get_mut(&conn) {
            if let Err(e) = send_envelope(&mut pc.writer, envelope) {
                debug!(?conn, "send failed, skipping connection: {e}");
            }
        }
    }

    /// Fire-and-forget fan-out to every connection.
    fn broadcast(&mut self, envelope: &Envelope) {
        let ids: Vec<ConnId> = self.connections.keys().copied().collect();
        for conn in ids {
            self.send_to(conn, envelope);
        }
    }

    /// Fan-out to every connection except `skip`.
    fn broadcast_except(&mut self, skip: ConnId, envelope: &Envelope) {
        let ids: Vec<ConnId> = self.connections.keys().copied().collect();
        for conn in ids {
            if conn != skip {
                self.send_to(conn, envelope);
            }
        }
    }
}

/// Serialize an `Envelope` to JSON and write it with length-delimited
/// framing. Returns any error (caller decides whether to log or propagate).
fn send_envelope(
    writer: &mut BufWriter<TcpStream>,
    envelope: &Envelope,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_vec(envelope)?;
    write_message(writer, &json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;
    use std::net::TcpListener;

    use tombola_protocol::framing::read_message;

    use super::*;

    /// Create a TCP pair: (client_stream, server_stream) on localhost.
    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    fn recv_envelope(reader: &mut BufReader<TcpStream>) -> Envelope {
        let bytes = read_message(reader).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn session() -> HostSession {
        HostSession::new("Host".into(), GameRng::new(42))
    }

    #[test]
    fn add_player_sends_snapshot_of_current_state() {
        let mut host = session();
        host.draw();
        host.draw();
        let ledger = host.ledger().to_vec();
        let current = host.current_call();

        let (client, server) = tcp_pair();
        host.add_player(ConnId(0), "Alice".into(), server);

        let mut reader = BufReader::new(client);
        match recv_envelope(&mut reader) {
            Envelope::StateSync {
                history,
                current: got,
            } => {
                assert_eq!(history, ledger);
                assert_eq!(got, current);
            }
            other => panic!("expected StateSync, got {other:?}"),
        }

        let events = host.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            HostEvent::PlayerJoined { name, .. } if name == "Alice"
        )));
    }

    #[test]
    fn draw_broadcasts_full_history_to_all_connections() {
        let mut host = session();
        let (client1, server1) = tcp_pair();
        let (client2, server2) = tcp_pair();
        host.add_player(ConnId(0), "Alice".into(), server1);
        host.add_player(ConnId(1), "Bob".into(), server2);

        let outcome = host.draw();
        let number = match outcome {
            DrawOutcome::Called { number, .. } => number,
            DrawOutcome::Exhausted => panic!("fresh session cannot be exhausted"),
        };

        for client in [client1, client2] {
            let mut reader = BufReader::new(client);
            // Drain the join snapshot.
            let _snapshot = recv_envelope(&mut reader);
            match recv_envelope(&mut reader) {
                Envelope::NumberCalled {
                    number: got,
                    history,
                    call_text,
                } => {
                    assert_eq!(got, number);
                    assert_eq!(history, vec![number]);
                    assert!(!call_text.is_empty());
                }
                other => panic!("expected NumberCalled, got {other:?}"),
            }
        }
    }

    #[test]
    fn manual_draw_from_idle_enters_manual_mode() {
        let mut host = session();
        assert_eq!(host.phase(), GamePhase::Idle);
        host.draw();
        assert_eq!(host.phase(), GamePhase::Paused);
    }

    #[test]
    fn draw_until_exhaustion_covers_pool_exactly_once() {
        let mut host = session();
        for _ in 0..90 {
            match host.draw() {
                DrawOutcome::Called { .. } => {}
                DrawOutcome::Exhausted => panic!("pool exhausted early"),
            }
        }
        assert_eq!(host.phase(), GamePhase::Finished);

        let mut sorted = host.ledger().to_vec();
        sorted.sort_unstable();
        let expected: Vec<u8> = (1..=90).collect();
        assert_eq!(sorted, expected, "ledger should be a permutation of 1..=90");

        // Further draws never mutate and stay Finished.
        let ledger_before = host.ledger().to_vec();
        assert_eq!(host.draw(), DrawOutcome::Exhausted);
        assert_eq!(host.draw(), DrawOutcome::Exhausted);
        assert_eq!(host.ledger(), ledger_before.as_slice());
        assert_eq!(host.phase(), GamePhase::Finished);
    }

    #[test]
    fn exhaustion_announced_once_via_system_chat() {
        let mut host = session();
        let (client, server) = tcp_pair();
        host.add_player(ConnId(0), "Alice".into(), server);

        for _ in 0..90 {
            host.draw();
        }
        host.draw(); // Exhausted — must not re-announce.

        let mut reader = BufReader::new(client);
        let _snapshot = recv_envelope(&mut reader);
        let mut system_msgs = 0;
        for _ in 0..90 {
            match recv_envelope(&mut reader) {
                Envelope::NumberCalled { .. } => {}
                Envelope::ChatMessage(msg) if msg.system => system_msgs += 1,
                other => panic!("unexpected envelope {other:?}"),
            }
        }
        // The terminal announcement follows the 90th call.
        match recv_envelope(&mut reader) {
            Envelope::ChatMessage(msg) => {
                assert!(msg.system);
                system_msgs += 1;
            }
            other => panic!("expected system chat, got {other:?}"),
        }
        assert_eq!(system_msgs, 1);

        let events = host.take_events();
        let finishes = events
            .iter()
            .filter(|e| matches!(e, HostEvent::RoundFinished))
            .count();
        assert_eq!(finishes, 1);
    }

    #[test]
    fn start_auto_draws_immediately_and_clamps_interval() {
        let mut host = session();
        let interval = host.start_auto(500);
        assert_eq!(interval.as_millis() as u64, MIN_AUTO_INTERVAL_MS);
        assert_eq!(host.phase(), GamePhase::Drawing);
        assert_eq!(host.ledger().len(), 1);

        let interval = host.start_auto(60_000);
        assert_eq!(interval.as_millis() as u64, MAX_AUTO_INTERVAL_MS);
        assert_eq!(host.ledger().len(), 2);
    }

    #[test]
    fn stop_auto_is_idempotent() {
        let mut host = session();
        // Stop without ever starting: stays Idle.
        host.stop_auto();
        assert_eq!(host.phase(), GamePhase::Idle);

        host.start_auto(3000);
        host.stop_auto();
        assert_eq!(host.phase(), GamePhase::Paused);
        host.stop_auto();
        assert_eq!(host.phase(), GamePhase::Paused);
    }

    #[test]
    fn reset_clears_state_and_broadcasts_once() {
        let mut host = session();
        let (client, server) = tcp_pair();
        host.add_player(ConnId(0), "Alice".into(), server);

        host.draw();
        host.host_chat("warming up");
        host.reset();

        assert_eq!(host.ledger().len(), 0);
        assert_eq!(host.current_call(), None);
        assert_eq!(host.chat().len(), 0);
        assert_eq!(host.phase(), GamePhase::Idle);

        let mut reader = BufReader::new(client);
        let _snapshot = recv_envelope(&mut reader);
        let _called = recv_envelope(&mut reader);
        let _chat = recv_envelope(&mut reader);
        assert_eq!(recv_envelope(&mut reader), Envelope::Reset {});
    }

    #[test]
    fn player_chat_forwarded_to_others_not_sender() {
        let mut host = session();
        let (client1, server1) = tcp_pair();
        let (client2, server2) = tcp_pair();
        let alice = ConnId(0);
        host.add_player(alice, "Alice".into(), server1);
        host.add_player(ConnId(1), "Bob".into(), server2);

        let msg = ChatMessage {
            id: "m1".into(),
            sender: "Alice".into(),
            text: "gl!".into(),
            system: false,
            avatar: None,
        };
        host.handle_envelope(alice, Envelope::ChatMessage(msg.clone()));

        // Bob receives the forwarded copy, verbatim.
        let mut bob = BufReader::new(client2);
        let _snapshot = recv_envelope(&mut bob);
        assert_eq!(recv_envelope(&mut bob), Envelope::ChatMessage(msg.clone()));

        // Alice receives nothing beyond her snapshot: the host draws next,
        // and her next envelope is that call, not an echo of her chat.
        host.draw();
        let mut alice_reader = BufReader::new(client1);
        let _snapshot = recv_envelope(&mut alice_reader);
        assert!(matches!(
            recv_envelope(&mut alice_reader),
            Envelope::NumberCalled { .. }
        ));

        // The host's own log picked it up.
        assert_eq!(host.chat().first().map(|m| m.text.as_str()), Some("gl!"));
    }

    #[test]
    fn host_chat_reaches_everyone() {
        let mut host = session();
        let (client, server) = tcp_pair();
        host.add_player(ConnId(0), "Alice".into(), server);

        host.host_chat("welcome all");

        let mut reader = BufReader::new(client);
        let _snapshot = recv_envelope(&mut reader);
        match recv_envelope(&mut reader) {
            Envelope::ChatMessage(msg) => {
                assert_eq!(msg.sender, "Host");
                assert_eq!(msg.text, "welcome all");
                assert!(!msg.system);
                assert!(!msg.id.is_empty());
            }
            other => panic!("expected ChatMessage, got {other:?}"),
        }
    }

    #[test]
    fn kick_sends_player_kicked_and_removes() {
        let mut host = session();
        let (client, server) = tcp_pair();
        let alice = ConnId(0);
        host.add_player(alice, "Alice".into(), server);
        host.take_events();

        host.kick(alice);
        assert_eq!(host.player_count(), 0);

        let mut reader = BufReader::new(client);
        let _snapshot = recv_envelope(&mut reader);
        assert_eq!(recv_envelope(&mut reader), Envelope::PlayerKicked {});

        let events = host.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            HostEvent::PlayerLeft { name, .. } if name == "Alice"
        )));
    }

    #[test]
    fn bingo_claim_surfaces_claimant_name() {
        let mut host = session();
        let (_client, server) = tcp_pair();
        let alice = ConnId(0);
        host.add_player(alice, "Alice".into(), server);
        host.take_events();

        host.handle_envelope(alice, Envelope::BingoClaim {});
        let events = host.take_events();
        assert_eq!(
            events,
            vec![HostEvent::BingoClaim {
                conn: alice,
                name: "Alice".into()
            }]
        );
    }

    #[test]
    fn disconnect_removes_connection_without_touching_state() {
        let mut host = session();
        let (_client, server) = tcp_pair();
        let alice = ConnId(0);
        host.add_player(alice, "Alice".into(), server);
        host.draw();
        let ledger = host.ledger().to_vec();

        host.remove_connection(alice);
        assert_eq!(host.player_count(), 0);
        assert_eq!(host.ledger(), ledger.as_slice());

        // Removing again is a no-op.
        host.remove_connection(alice);
    }

    #[test]
    fn custom_announcer_with_fallback() {
        struct EveryOther(bool);
        impl CallAnnouncer for EveryOther {
            fn announce(&mut self, number: u8) -> Option<String> {
                self.0 = !self.0;
                self.0.then(|| format!("fancy rhyme for {number}"))
            }
        }

        let mut host = HostSession::with_announcer(
            "Host".into(),
            GameRng::new(7),
            Box::new(EveryOther(false)),
        );
        let first = host.draw();
        let second = host.draw();
        match (first, second) {
            (
                DrawOutcome::Called { call_text: a, .. },
                DrawOutcome::Called {
                    number: n2,
                    call_text: b,
                },
            ) => {
                assert!(a.starts_with("fancy rhyme for "));
                // Announcer returned None — canned fallback takes over.
                assert_eq!(b, canned_call(n2));
            }
            other => panic!("expected two calls, got {other:?}"),
        }
    }
}
