// Hosting side: peer listener, per-connection readers, and the event loop
// that owns the `HostSession`.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Acceptor thread**: accepts direct peer connections on the host's own
//   listener (the broker is not in this path) and spawns a reader per
//   connection, assigning the connection id up front.
// - **Reader threads** (one per peer): perform the join handshake — the
//   first envelope must be `player-joined` — then funnel every inbound
//   envelope to the loop. EOF or error becomes a single `Disconnected`.
// - **Keeper thread** (see `signal.rs`): holds the broker registration and
//   re-registers in the background when the link drops. Peer connections
//   never route through the broker, so a broker outage only pauses new
//   joins.
// - **Main loop**: sole owner of the `HostSession`. Receives reader events
//   and `HostHandle` commands from the same channel, drives the auto-draw
//   timer off `recv_timeout`, and forwards session events to the UI.
//
// `start_hosting` wires all of this up and returns a `HostHandle`; fatal
// errors (broker unreachable, chosen room code taken) surface before any
// thread is spawned.

use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tombola_protocol::envelope::Envelope;
use tombola_protocol::framing::read_message;
use tracing::{debug, info, warn};

use crate::error::HostError;
use crate::host::{ConnId, DrawOutcome, GamePhase, HostEvent, HostSession};
use crate::rng::GameRng;
use crate::signal;
use crate::{calls::CallAnnouncer, room};

/// How long a fresh peer connection gets to send its join handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle wakeup so the shutdown flag gets checked with no traffic and no
/// auto-draw timer armed.
const LOOP_POLL: Duration = Duration::from_millis(200);

/// Configuration for starting a hosting session.
pub struct HostConfig {
    pub broker_addr: SocketAddr,
    /// Fixed room code, or `None` to generate one.
    pub room_code: Option<String>,
    pub host_name: String,
    /// Delay between broker re-registration attempts after the first.
    pub retry_delay: Duration,
    /// Fixed seed for reproducible draw sequences; `None` seeds from
    /// entropy.
    pub seed: Option<u64>,
}

impl HostConfig {
    pub fn new(broker_addr: SocketAddr, host_name: impl Into<String>) -> Self {
        Self {
            broker_addr,
            room_code: None,
            host_name: host_name.into(),
            retry_delay: Duration::from_secs(3),
            seed: None,
        }
    }
}

/// Commands from the `HostHandle` to the loop.
enum HostCommand {
    Draw,
    StartAuto { interval_ms: u64 },
    StopAuto,
    Reset,
    Chat(String),
    Kick(ConnId),
    Stop,
}

/// Everything the main loop can receive, from readers and the handle alike.
enum LoopEvent {
    Joined {
        conn: ConnId,
        name: String,
        stream: TcpStream,
    },
    EnvelopeFrom {
        conn: ConnId,
        envelope: Envelope,
    },
    Disconnected {
        conn: ConnId,
    },
    Command(HostCommand),
}

/// Handle to a running hosting session.
pub struct HostHandle {
    room_code: String,
    peer_addr: SocketAddr,
    tx: Sender<LoopEvent>,
    events: Receiver<HostEvent>,
    degraded: Arc<AtomicBool>,
    keep_running: Arc<AtomicBool>,
    loop_thread: Option<thread::JoinHandle<()>>,
    keeper_thread: Option<thread::JoinHandle<()>>,
}

impl HostHandle {
    /// The shareable 6-character room code.
    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    /// The direct address players connect to (useful in tests).
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// True while the broker registration is down and new players cannot
    /// resolve the room. Established connections are unaffected.
    pub fn signaling_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub fn draw(&self) {
        self.send(HostCommand::Draw);
    }

    pub fn start_auto(&self, interval_ms: u64) {
        self.send(HostCommand::StartAuto { interval_ms });
    }

    pub fn stop_auto(&self) {
        self.send(HostCommand::StopAuto);
    }

    pub fn reset(&self) {
        self.send(HostCommand::Reset);
    }

    pub fn chat(&self, text: impl Into<String>) {
        self.send(HostCommand::Chat(text.into()));
    }

    pub fn kick(&self, conn: ConnId) {
        self.send(HostCommand::Kick(conn));
    }

    /// Drain pending session events without blocking.
    pub fn poll_events(&self) -> Vec<HostEvent> {
        self.events.try_iter().collect()
    }

    /// Shut the session down: unregister from the broker (by dropping the
    /// link) and close every peer connection.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        let _ = self.tx.send(LoopEvent::Command(HostCommand::Stop));
        if let Some(handle) = self.loop_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.keeper_thread.take() {
            let _ = handle.join();
        }
    }

    fn send(&self, command: HostCommand) {
        let _ = self.tx.send(LoopEvent::Command(command));
    }
}

/// Start hosting a session. Registers the room with the broker, binds the
/// peer listener, and spawns the acceptor, keeper, and main loop threads.
pub fn start_hosting(config: HostConfig) -> Result<HostHandle, HostError> {
    start_hosting_with(config, None)
}

/// As `start_hosting`, with an optional external call announcer.
pub fn start_hosting_with(
    config: HostConfig,
    announcer: Option<Box<dyn CallAnnouncer>>,
) -> Result<HostHandle, HostError> {
    let mut rng = match config.seed {
        Some(seed) => GameRng::new(seed),
        None => GameRng::from_entropy(),
    };

    let room_code = match &config.room_code {
        Some(code) => room::normalize_code(code)?,
        None => room::generate_code(&mut rng),
    };
    let address = room::code_to_address(&room_code)?;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let peer_addr = listener.local_addr()?;

    // Fatal here: no point starting a session nobody can find.
    let link = signal::register(config.broker_addr, &address, peer_addr)?;
    info!(room_code, %peer_addr, "session registered");

    let keep_running = Arc::new(AtomicBool::new(true));
    let degraded = Arc::new(AtomicBool::new(false));

    let keeper_thread = signal::spawn_keeper(
        config.broker_addr,
        address,
        peer_addr,
        link,
        Arc::clone(&degraded),
        Arc::clone(&keep_running),
        config.retry_delay,
    );

    let (tx, rx) = mpsc::channel::<LoopEvent>();
    let (event_tx, event_rx) = mpsc::channel::<HostEvent>();

    spawn_acceptor(listener, tx.clone(), Arc::clone(&keep_running));

    let session = match announcer {
        Some(announcer) => HostSession::with_announcer(config.host_name, rng, announcer),
        None => HostSession::new(config.host_name, rng),
    };
    let keep_running_loop = Arc::clone(&keep_running);
    let loop_thread = thread::spawn(move || {
        run_host_loop(session, rx, event_tx, keep_running_loop);
    });

    Ok(HostHandle {
        room_code,
        peer_addr,
        tx,
        events: event_rx,
        degraded,
        keep_running,
        loop_thread: Some(loop_thread),
        keeper_thread: Some(keeper_thread),
    })
}

/// Accept peer connections and hand each to its own reader thread. The
/// listener is non-blocking so the shutdown flag gets checked between
/// accepts.
fn spawn_acceptor(listener: TcpListener, tx: Sender<LoopEvent>, keep_running: Arc<AtomicBool>) {
    listener.set_nonblocking(true).ok();
    let next_conn = Arc::new(AtomicU64::new(0));
    thread::spawn(move || {
        while keep_running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    stream.set_nonblocking(false).ok();
                    let conn = ConnId(next_conn.fetch_add(1, Ordering::Relaxed));
                    debug!(?conn, %addr, "peer connection accepted");
                    let tx = tx.clone();
                    thread::spawn(move || reader_loop(conn, stream, tx));
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(_) => break,
            }
        }
    });
}

/// Per-connection reader: join handshake first, then envelope funnel.
fn reader_loop(conn: ConnId, stream: TcpStream, tx: Sender<LoopEvent>) {
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)).ok();
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });

    // The first envelope must be the join handshake; anything else is not a
    // player and the connection is dropped without ever reaching the loop.
    match read_envelope(&mut reader) {
        Ok(Envelope::PlayerJoined { name }) => {
            stream.set_read_timeout(None).ok();
            if tx
                .send(LoopEvent::Joined { conn, name, stream })
                .is_err()
            {
                return;
            }
        }
        Ok(other) => {
            warn!(?conn, kind = ?other, "connection rejected: bad handshake");
            return;
        }
        Err(e) => {
            debug!(?conn, "connection dropped before handshake: {e}");
            return;
        }
    }

    loop {
        match read_envelope(&mut reader) {
            Ok(envelope) => {
                if tx.send(LoopEvent::EnvelopeFrom { conn, envelope }).is_err() {
                    return;
                }
            }
            Err(_) => {
                let _ = tx.send(LoopEvent::Disconnected { conn });
                return;
            }
        }
    }
}

fn read_envelope(reader: &mut BufReader<TcpStream>) -> std::io::Result<Envelope> {
    let bytes = read_message(reader)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Main loop: sole owner of the session. The auto-draw timer is the
/// `recv_timeout` deadline — no separate timer thread.
fn run_host_loop(
    mut session: HostSession,
    rx: Receiver<LoopEvent>,
    event_tx: Sender<HostEvent>,
    keep_running: Arc<AtomicBool>,
) {
    // (interval, next draw instant) while auto-play is active.
    let mut auto: Option<(Duration, Instant)> = None;

    while keep_running.load(Ordering::SeqCst) {
        let timeout = match auto {
            Some((_, deadline)) => deadline
                .saturating_duration_since(Instant::now())
                .min(LOOP_POLL),
            None => LOOP_POLL,
        };

        match rx.recv_timeout(timeout) {
            Ok(LoopEvent::Joined { conn, name, stream }) => {
                session.add_player(conn, name, stream);
            }
            Ok(LoopEvent::EnvelopeFrom { conn, envelope }) => {
                session.handle_envelope(conn, envelope);
            }
            Ok(LoopEvent::Disconnected { conn }) => {
                session.remove_connection(conn);
            }
            Ok(LoopEvent::Command(command)) => match command {
                HostCommand::Draw => {
                    let _ = session.draw();
                }
                HostCommand::StartAuto { interval_ms } => {
                    let interval = session.start_auto(interval_ms);
                    auto = Some((interval, Instant::now() + interval));
                }
                HostCommand::StopAuto => {
                    session.stop_auto();
                    auto = None;
                }
                HostCommand::Reset => {
                    session.reset();
                    auto = None;
                }
                HostCommand::Chat(text) => session.host_chat(&text),
                HostCommand::Kick(conn) => session.kick(conn),
                HostCommand::Stop => break,
            },
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if let Some((interval, deadline)) = auto {
            if Instant::now() >= deadline {
                match session.draw() {
                    DrawOutcome::Called { .. } => {
                        auto = Some((interval, Instant::now() + interval));
                    }
                    DrawOutcome::Exhausted => auto = None,
                }
                if session.phase() == GamePhase::Finished {
                    auto = None;
                }
            }
        }

        for event in session.take_events() {
            let _ = event_tx.send(event);
        }
    }

    session.close_all();
}
