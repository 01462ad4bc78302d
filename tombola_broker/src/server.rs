// TCP server and main event loop for the signaling broker.
//
// Architecture: thread-per-watcher with a central `mpsc` channel.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections and sends `BrokerEvent::NewConnection` to the main thread.
// - **Monitor threads** (one per registration): block reading the host's
//   signaling socket until EOF/error, then send `BrokerEvent::Unregister`.
//   A registration lives exactly as long as its signaling connection.
// - **Main thread**: owns the `Registry`, receives events from the channel,
//   and dispatches them. The first framed request on a new connection is
//   read here with a short handshake timeout; `Resolve` connections are
//   answered and dropped immediately, `Register` connections are answered
//   and kept open.
//
// The main thread is the only writer to broker sockets. Monitor threads
// only read. Shutdown closes every registration socket so hosts notice the
// broker is gone and start their reconnect loops.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use tombola_protocol::framing::{read_message, write_message};
use tombola_protocol::signal::{SignalRequest, SignalResponse};
use tracing::{debug, info, warn};

use crate::registry::Registry;

/// Events sent from listener/monitor threads to the main thread.
enum BrokerEvent {
    NewConnection { stream: TcpStream },
    Unregister { address: String, token: u64 },
}

/// Handle returned by `start_broker` to control the running server.
pub struct BrokerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl BrokerHandle {
    /// Signal the broker to stop and wait for it to shut down. Closes every
    /// live registration socket on the way out.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a broker.
pub struct BrokerConfig {
    pub port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { port: 7879 }
    }
}

/// How long a new connection gets to send its first (and usually only)
/// signaling request before being dropped.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Start the broker on a background thread. Returns a handle for stopping
/// it and the actual bound address (useful when port 0 is used to let the
/// OS pick a free port).
pub fn start_broker(config: BrokerConfig) -> std::io::Result<(BrokerHandle, SocketAddr)> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", config.port))?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    let thread = thread::spawn(move || {
        run_broker(listener, keep_running_clone);
    });

    Ok((
        BrokerHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main broker loop. Runs until `keep_running` is set to false.
fn run_broker(listener: TcpListener, keep_running: Arc<AtomicBool>) {
    let mut registry = Registry::new();

    let (tx, rx): (Sender<BrokerEvent>, Receiver<BrokerEvent>) = mpsc::channel();

    // Set the listener to non-blocking so the accept thread can check
    // keep_running periodically.
    listener.set_nonblocking(true).ok();

    // Listener thread: accepts new connections.
    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    stream.set_nonblocking(false).ok();
                    let _ = tx_listener.send(BrokerEvent::NewConnection { stream });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(_) => break,
            }
        }
    });

    // Main event loop. The timeout only exists so the shutdown flag gets
    // checked even when no events arrive.
    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => handle_event(&mut registry, event, &tx, &keep_running),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    registry.close_all();
}

/// Dispatch a single event to the registry.
fn handle_event(
    registry: &mut Registry,
    event: BrokerEvent,
    tx: &Sender<BrokerEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    match event {
        BrokerEvent::NewConnection { stream } => {
            handle_new_connection(registry, stream, tx, keep_running);
        }
        BrokerEvent::Unregister { address, token } => {
            if registry.unregister(&address, token) {
                info!(address, "registration dropped");
            }
        }
    }
}

/// Handle a new connection: read the first signaling request, answer it,
/// and either keep the connection (Register) or drop it (Resolve).
fn handle_new_connection(
    registry: &mut Registry,
    stream: TcpStream,
    tx: &Sender<BrokerEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)).ok();

    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });

    let request_bytes = match read_message(&mut reader) {
        Ok(bytes) => bytes,
        Err(_) => return,
    };

    let request: SignalRequest = match serde_json::from_slice(&request_bytes) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("malformed signaling request: {e}");
            return;
        }
    };

    match request {
        SignalRequest::Register { address, host_addr } => {
            let monitor_stream = match stream.try_clone() {
                Ok(s) => s,
                Err(_) => return,
            };
            match registry.register(address.clone(), host_addr, monitor_stream) {
                Some(token) => {
                    info!(address, %host_addr, "host registered");
                    send_response(&stream, &SignalResponse::Registered);

                    // Clear the handshake timeout: the monitor blocks until
                    // the host goes away.
                    stream.set_read_timeout(None).ok();
                    let tx_monitor = tx.clone();
                    let keep_running_monitor = keep_running.clone();
                    thread::spawn(move || {
                        monitor_loop(reader, address, token, tx_monitor, keep_running_monitor);
                    });
                }
                None => {
                    warn!(address, "registration rejected: address taken");
                    send_response(&stream, &SignalResponse::AddressTaken);
                }
            }
        }
        SignalRequest::Resolve { address } => {
            let response = match registry.resolve(&address) {
                Some(host_addr) => {
                    debug!(address, %host_addr, "resolved");
                    SignalResponse::Resolved { host_addr }
                }
                None => {
                    debug!(address, "resolve miss");
                    SignalResponse::NotFound
                }
            };
            send_response(&stream, &response);
        }
    }
}

/// Monitor loop for one registration. Blocks reading the host's signaling
/// socket; any message is ignored, EOF or error ends the registration.
fn monitor_loop(
    mut reader: BufReader<TcpStream>,
    address: String,
    token: u64,
    tx: Sender<BrokerEvent>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        if read_message(&mut reader).is_err() {
            let _ = tx.send(BrokerEvent::Unregister { address, token });
            break;
        }
    }
}

/// Write a response, ignoring failures — a peer that vanished mid-handshake
/// costs nothing.
fn send_response(stream: &TcpStream, response: &SignalResponse) {
    if let Ok(write_half) = stream.try_clone() {
        let mut writer = BufWriter::new(write_half);
        if let Ok(json) = serde_json::to_vec(response) {
            let _ = write_message(&mut writer, &json);
        }
    }
}
