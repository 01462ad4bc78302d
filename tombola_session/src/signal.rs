// Broker signaling client.
//
// The broker is only a directory: it maps room addresses to the host's
// direct socket address, and a registration lives exactly as long as the
// TCP connection that carried it. Two exchanges exist:
//
// - `register`: the host opens a connection, sends `Register`, and on
//   success *keeps the connection open*. That held stream IS the
//   registration.
// - `resolve`: a player opens a short-lived connection, asks for the
//   address, and hangs up.
//
// `spawn_keeper` owns the host's registration stream after startup. It
// watches for the link dropping (broker restart, network blip) and
// re-registers in the background: one immediate attempt, then a fixed
// delay between retries. While unregistered the shared `degraded` flag is
// raised — established player connections keep working throughout, only
// new joins are affected. `AddressTaken` during re-registration means the
// broker still holds our stale entry; that is transient here (the old
// registration dies when the broker notices the dead socket), unlike at
// first registration where it is fatal.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tombola_protocol::framing::{read_message, write_message};
use tombola_protocol::signal::{SignalRequest, SignalResponse};
use tracing::{info, warn};

use crate::error::{HostError, JoinError};

/// How long to wait for the broker's handshake response.
const BROKER_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll granularity for the keeper's keep-running check while idle on a
/// healthy link.
const LINK_POLL: Duration = Duration::from_millis(500);

/// Register `address` with the broker, pointing at `host_addr`. On success
/// the returned stream must be kept open — dropping it unregisters.
pub fn register(
    broker_addr: SocketAddr,
    address: &str,
    host_addr: SocketAddr,
) -> Result<TcpStream, HostError> {
    let mut stream = TcpStream::connect(broker_addr).map_err(HostError::BrokerUnavailable)?;
    stream
        .set_read_timeout(Some(BROKER_TIMEOUT))
        .map_err(HostError::BrokerUnavailable)?;

    let request = SignalRequest::Register {
        address: address.to_string(),
        host_addr,
    };
    let response = exchange(&mut stream, &request).map_err(HostError::BrokerUnavailable)?;

    match response {
        SignalResponse::Registered => {
            // Registration held; further reads have no deadline.
            stream
                .set_read_timeout(None)
                .map_err(HostError::BrokerUnavailable)?;
            Ok(stream)
        }
        SignalResponse::AddressTaken => Err(HostError::AddressTaken),
        other => Err(HostError::BrokerUnavailable(unexpected(&other))),
    }
}

/// Ask the broker for the host behind `address`. Short-lived connection.
pub fn resolve(broker_addr: SocketAddr, address: &str) -> Result<SocketAddr, JoinError> {
    let mut stream = TcpStream::connect(broker_addr).map_err(JoinError::BrokerUnavailable)?;
    stream
        .set_read_timeout(Some(BROKER_TIMEOUT))
        .map_err(JoinError::BrokerUnavailable)?;

    let request = SignalRequest::Resolve {
        address: address.to_string(),
    };
    let response = exchange(&mut stream, &request).map_err(JoinError::BrokerUnavailable)?;

    match response {
        SignalResponse::Resolved { host_addr } => Ok(host_addr),
        SignalResponse::NotFound => Err(JoinError::PeerNotFound),
        other => Err(JoinError::BrokerUnavailable(unexpected(&other))),
    }
}

/// One framed request/response round trip on an open broker connection.
fn exchange(stream: &mut TcpStream, request: &SignalRequest) -> std::io::Result<SignalResponse> {
    let json = serde_json::to_vec(request)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    write_message(stream, &json)?;
    let bytes = read_message(stream)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn unexpected(response: &SignalResponse) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("unexpected broker response: {response:?}"),
    )
}

/// Watch the registration link and re-register whenever it drops.
///
/// Takes ownership of the stream returned by `register`. Exits when
/// `keep_running` clears. `degraded` is raised while the room is not
/// resolvable and lowered on every successful re-registration.
pub fn spawn_keeper(
    broker_addr: SocketAddr,
    address: String,
    host_addr: SocketAddr,
    link: TcpStream,
    degraded: Arc<AtomicBool>,
    keep_running: Arc<AtomicBool>,
    retry_delay: Duration,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut link = Some(link);
        while keep_running.load(Ordering::Relaxed) {
            match link.take() {
                Some(stream) => {
                    watch_link(&stream, &keep_running);
                    if !keep_running.load(Ordering::Relaxed) {
                        return;
                    }
                    degraded.store(true, Ordering::Relaxed);
                    warn!(address, "broker link lost, re-registering");
                }
                None => {
                    // Immediate first attempt, fixed delay afterwards.
                    match register(broker_addr, &address, host_addr) {
                        Ok(stream) => {
                            degraded.store(false, Ordering::Relaxed);
                            info!(address, "broker link restored");
                            link = Some(stream);
                        }
                        Err(e) => {
                            // AddressTaken here means our stale entry is
                            // still in the registry — retry like any other
                            // transient failure.
                            warn!(address, "re-registration failed, will retry: {e}");
                            sleep_while_running(retry_delay, &keep_running);
                        }
                    }
                }
            }
        }
    })
}

/// Block until the registration link drops or `keep_running` clears. The
/// broker sends nothing after `Registered`, so any completed read means the
/// link is gone.
fn watch_link(stream: &TcpStream, keep_running: &AtomicBool) {
    if stream.set_read_timeout(Some(LINK_POLL)).is_err() {
        return;
    }
    let mut reader = stream;
    loop {
        match read_message(&mut reader) {
            Ok(_) => {} // Unexpected traffic; the link is still up.
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                if !keep_running.load(Ordering::Relaxed) {
                    return;
                }
            }
            Err(_) => return,
        }
    }
}

fn sleep_while_running(total: Duration, keep_running: &AtomicBool) {
    let step = Duration::from_millis(50);
    let mut remaining = total;
    while remaining > Duration::ZERO && keep_running.load(Ordering::Relaxed) {
        let nap = remaining.min(step);
        thread::sleep(nap);
        remaining = remaining.saturating_sub(nap);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tombola_broker::{BrokerConfig, start_broker};

    use super::*;

    const POLL_TIMEOUT: Duration = Duration::from_secs(5);
    const POLL_INTERVAL: Duration = Duration::from_millis(10);

    fn fake_host_addr() -> SocketAddr {
        "127.0.0.1:4567".parse().unwrap()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + POLL_TIMEOUT;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(POLL_INTERVAL);
        }
        false
    }

    #[test]
    fn register_then_resolve() {
        let (broker, broker_addr) = start_broker(BrokerConfig { port: 0 }).unwrap();
        let host_addr = fake_host_addr();

        let _link = register(broker_addr, "tombola-ABC123", host_addr).unwrap();
        let resolved = resolve(broker_addr, "tombola-ABC123").unwrap();
        assert_eq!(resolved, host_addr);

        broker.stop();
    }

    #[test]
    fn resolve_unknown_address_is_not_found() {
        let (broker, broker_addr) = start_broker(BrokerConfig { port: 0 }).unwrap();
        match resolve(broker_addr, "tombola-NOSUCH") {
            Err(JoinError::PeerNotFound) => {}
            other => panic!("expected PeerNotFound, got {other:?}"),
        }
        broker.stop();
    }

    #[test]
    fn duplicate_registration_is_address_taken() {
        let (broker, broker_addr) = start_broker(BrokerConfig { port: 0 }).unwrap();
        let host_addr = fake_host_addr();

        let _link = register(broker_addr, "tombola-DUPDUP", host_addr).unwrap();
        match register(broker_addr, "tombola-DUPDUP", host_addr) {
            Err(HostError::AddressTaken) => {}
            Ok(_) => panic!("duplicate registration accepted"),
            Err(other) => panic!("expected AddressTaken, got {other:?}"),
        }
        broker.stop();
    }

    #[test]
    fn unreachable_broker_is_broker_unavailable() {
        // Bind-then-drop to get a port nothing listens on.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        match register(addr, "tombola-ABCDEF", fake_host_addr()) {
            Err(HostError::BrokerUnavailable(_)) => {}
            other => panic!("expected BrokerUnavailable, got {other:?}"),
        }
        match resolve(addr, "tombola-ABCDEF") {
            Err(JoinError::BrokerUnavailable(_)) => {}
            other => panic!("expected BrokerUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn keeper_reregisters_after_link_drop() {
        let (broker, broker_addr) = start_broker(BrokerConfig { port: 0 }).unwrap();
        let host_addr = fake_host_addr();

        let link = register(broker_addr, "tombola-KEEPER", host_addr).unwrap();
        let degraded = Arc::new(AtomicBool::new(false));
        let keep_running = Arc::new(AtomicBool::new(true));
        let keeper = spawn_keeper(
            broker_addr,
            "tombola-KEEPER".into(),
            host_addr,
            link.try_clone().unwrap(),
            Arc::clone(&degraded),
            Arc::clone(&keep_running),
            Duration::from_millis(50),
        );

        // Kill the registration from our side; the keeper should notice and
        // re-register with the same broker.
        link.shutdown(std::net::Shutdown::Both).unwrap();
        assert!(
            wait_until(|| matches!(resolve(broker_addr, "tombola-KEEPER"), Ok(a) if a == host_addr)),
            "keeper never restored the registration"
        );
        assert!(
            wait_until(|| !degraded.load(Ordering::Relaxed)),
            "degraded flag never cleared"
        );

        keep_running.store(false, Ordering::Relaxed);
        broker.stop();
        let _ = keeper.join();
    }

    #[test]
    fn keeper_raises_degraded_while_broker_down() {
        let (broker, broker_addr) = start_broker(BrokerConfig { port: 0 }).unwrap();
        let host_addr = fake_host_addr();

        let link = register(broker_addr, "tombola-DEGRAD", host_addr).unwrap();
        let degraded = Arc::new(AtomicBool::new(false));
        let keep_running = Arc::new(AtomicBool::new(true));
        let keeper = spawn_keeper(
            broker_addr,
            "tombola-DEGRAD".into(),
            host_addr,
            link,
            Arc::clone(&degraded),
            Arc::clone(&keep_running),
            Duration::from_millis(50),
        );

        // Stop the broker entirely: link drops and re-registration fails.
        broker.stop();
        assert!(
            wait_until(|| degraded.load(Ordering::Relaxed)),
            "degraded flag never raised"
        );

        // Bring a broker back on the same port.
        let port = broker_addr.port();
        let (broker2, _) = start_broker(BrokerConfig { port }).unwrap();
        assert!(
            wait_until(|| matches!(resolve(broker_addr, "tombola-DEGRAD"), Ok(a) if a == host_addr)),
            "keeper never recovered after broker restart"
        );
        assert!(
            wait_until(|| !degraded.load(Ordering::Relaxed)),
            "degraded flag never cleared"
        );

        keep_running.store(false, Ordering::Relaxed);
        broker2.stop();
        let _ = keeper.join();
    }
}
