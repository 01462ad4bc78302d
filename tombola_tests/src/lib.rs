// Test-only player for session integration tests.
//
// Wraps the real `PlayerClient` (from `tombola_session::client`) and a real
// `Replica` (from `tombola_session::replica`) to provide a synchronous,
// test-friendly API for exercising the full pipeline:
// broker → host → join → snapshot → draw/chat/claim → replica verify.
//
// The only test-specific code here is the synchronous polling wrappers
// (blocking loops around `PlayerClient::poll()` and
// `HostHandle::poll_events()`). All networking and game logic uses the same
// code paths as a real session.
//
// See also: `tests/full_game.rs` for the integration test scenarios.

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use tombola_broker::{BrokerConfig, BrokerHandle, start_broker};
use tombola_session::{
    ClientEvent, GameRng, HostEvent, HostHandle, JoinError, Marked, PlayerClient, Replica,
    ReplicaEvent,
};

/// Default timeout for blocking poll operations.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A test player wrapping a real client and replica.
pub struct TestPlayer {
    client: PlayerClient,
    pub replica: Replica,
    pub closed: bool,
    /// Events drained by a wait helper but not yet handed to a caller, so a
    /// later `wait_for` can still observe them.
    pending: Vec<ReplicaEvent>,
}

impl TestPlayer {
    /// Join a room through the broker. The replica is seeded so each test
    /// player's ticket is reproducible.
    pub fn join(
        broker_addr: SocketAddr,
        code: &str,
        name: &str,
        seed: u64,
    ) -> Result<Self, JoinError> {
        let client = PlayerClient::connect(broker_addr, code, name)?;
        let replica = Replica::new(name.to_string(), None, GameRng::new(seed));
        Ok(Self {
            client,
            replica,
            closed: false,
            pending: Vec::new(),
        })
    }

    /// Non-blocking: drain pending traffic into the replica. Returns the
    /// replica events produced; a connection close sets `self.closed`.
    pub fn pump(&mut self) -> Vec<ReplicaEvent> {
        let mut events = Vec::new();
        for event in self.client.poll() {
            match event {
                ClientEvent::Message(envelope) => {
                    if let Some(e) = self.replica.apply(&envelope) {
                        events.push(e);
                    }
                }
                ClientEvent::Closed => self.closed = true,
            }
        }
        events
    }

    /// Blocking poll until an event matching `pred` arrives. Earlier events
    /// are still applied to the replica, just not returned.
    pub fn wait_for(&mut self, mut pred: impl FnMut(&ReplicaEvent) -> bool) -> ReplicaEvent {
        let start = Instant::now();
        loop {
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for replica event"
            );
            let events = self.pump();
            self.pending.extend(events);
            if let Some(pos) = self.pending.iter().position(&mut pred) {
                let event = self.pending.remove(pos);
                self.pending.drain(..pos);
                return event;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Blocking poll until the replicated ledger reaches `len` numbers.
    pub fn wait_ledger_len(&mut self, len: usize) {
        let start = Instant::now();
        loop {
            let events = self.pump();
            self.pending.extend(events);
            if self.replica.ledger().len() == len {
                return;
            }
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for ledger length {len}, have {}",
                self.replica.ledger().len()
            );
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Blocking poll until the connection closes.
    pub fn wait_closed(&mut self) {
        let start = Instant::now();
        while !self.closed {
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for connection close"
            );
            self.pump();
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Send a chat message (also appended to the local log, as the host
    /// never echoes it back).
    pub fn chat(&mut self, text: &str) {
        let envelope = self.replica.make_chat(text);
        self.client.send(&envelope).expect("chat send failed");
    }

    /// Mark one cell; if the mark completes a win the claim envelope is
    /// sent to the host.
    pub fn mark(&mut self, row: usize, col: usize) -> Marked {
        let marked = self.replica.mark_cell(row, col).expect("mark failed");
        if let Some(claim) = &marked.claim {
            self.client.send(claim).expect("claim send failed");
        }
        marked
    }

    /// Mark every numbered cell of one row.
    pub fn mark_row(&mut self, row: usize) {
        let cols: Vec<usize> = (0..tombola_session::ticket::COLS)
            .filter(|&c| {
                self.replica
                    .ticket()
                    .cell(row, c)
                    .is_some_and(|cell| cell.value.is_some())
            })
            .collect();
        for col in cols {
            self.mark(row, col);
        }
    }

    /// Close the connection; the host drops this player from the roster.
    pub fn close(self) {
        self.client.close();
    }
}

/// Blocking poll on the host's event stream until `pred` matches. Earlier
/// events are discarded.
pub fn wait_host_event(
    handle: &HostHandle,
    mut pred: impl FnMut(&HostEvent) -> bool,
) -> HostEvent {
    let start = Instant::now();
    loop {
        assert!(
            start.elapsed() < POLL_TIMEOUT,
            "timed out waiting for host event"
        );
        if let Some(event) = handle.poll_events().into_iter().find(&mut pred) {
            return event;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Blocking poll on an arbitrary condition.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + POLL_TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(POLL_INTERVAL);
    }
    false
}

/// Start a broker, retrying briefly on bind failure — restart-on-same-port
/// scenarios can race the kernel releasing the listener.
pub fn start_test_broker(port: u16) -> (BrokerHandle, SocketAddr) {
    let deadline = Instant::now() + POLL_TIMEOUT;
    loop {
        match start_broker(BrokerConfig { port }) {
            Ok(pair) => return pair,
            Err(e) => {
                assert!(
                    Instant::now() < deadline,
                    "broker failed to bind port {port}: {e}"
                );
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}
