// Player-side transport: resolve the room, connect to the host, and pump
// envelopes.
//
// The broker is consulted exactly once, on a short-lived connection; after
// that the client talks to the host directly and a broker outage is
// invisible. A reader thread funnels inbound envelopes into a channel the
// UI drains with `poll`; when the connection dies (host gone, or this
// player was kicked and the socket closed) a single `Closed` event is the
// last thing delivered.
//
// The client is transport only. Interpreting envelopes is `Replica::apply`,
// which the embedding UI feeds from `poll`.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use tombola_protocol::envelope::Envelope;
use tombola_protocol::framing::{read_message, write_message};
use tracing::debug;

use crate::error::JoinError;
use crate::{room, signal};

/// Inbound traffic as seen by the embedding UI.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    Message(Envelope),
    /// The connection to the host is gone. Always the final event.
    Closed,
}

/// A live connection to a host.
#[derive(Debug)]
pub struct PlayerClient {
    stream: TcpStream,
    writer: BufWriter<TcpStream>,
    events: Receiver<ClientEvent>,
}

impl PlayerClient {
    /// Resolve `code` through the broker, connect to the host, and send the
    /// join handshake. The host answers with a state-sync snapshot as its
    /// first envelope.
    pub fn connect(
        broker_addr: SocketAddr,
        code: &str,
        name: &str,
    ) -> Result<PlayerClient, JoinError> {
        let address = room::code_to_address(code)?;
        let host_addr = signal::resolve(broker_addr, &address)?;
        debug!(code, %host_addr, "room resolved");

        let stream = TcpStream::connect(host_addr).map_err(JoinError::NetworkError)?;
        let mut writer = BufWriter::new(stream.try_clone().map_err(JoinError::NetworkError)?);
        let reader = BufReader::new(stream.try_clone().map_err(JoinError::NetworkError)?);

        send_envelope(
            &mut writer,
            &Envelope::PlayerJoined { name: name.into() },
        )
        .map_err(JoinError::NetworkError)?;

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || reader_loop(reader, tx));

        Ok(PlayerClient {
            stream,
            writer,
            events: rx,
        })
    }

    /// Send one envelope to the host.
    pub fn send(&mut self, envelope: &Envelope) -> std::io::Result<()> {
        send_envelope(&mut self.writer, envelope)
    }

    /// Drain pending inbound events without blocking.
    pub fn poll(&self) -> Vec<ClientEvent> {
        self.events.try_iter().collect()
    }

    /// Leave the session. The host sees the disconnect and drops this
    /// player from the roster; game state is unaffected.
    pub fn close(self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

fn send_envelope(writer: &mut BufWriter<TcpStream>, envelope: &Envelope) -> std::io::Result<()> {
    let json = serde_json::to_vec(envelope)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    write_message(writer, &json)
}

/// Funnel inbound envelopes until the stream dies, then emit `Closed`.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: Sender<ClientEvent>) {
    loop {
        match read_message(&mut reader) {
            Ok(bytes) => match serde_json::from_slice::<Envelope>(&bytes) {
                Ok(envelope) => {
                    if tx.send(ClientEvent::Message(envelope)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    debug!("malformed envelope from host: {e}");
                }
            },
            Err(_) => {
                let _ = tx.send(ClientEvent::Closed);
                return;
            }
        }
    }
}
