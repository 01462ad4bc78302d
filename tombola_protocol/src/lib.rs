// tombola_protocol — wire protocol for the Tombola multiplayer session layer.
//
// This crate defines the message types, framing, and serialization used by
// the signaling broker (`tombola_broker`), the host, and player clients
// (`tombola_session`) to communicate over TCP. It is shared between all
// sides and has no dependency on game state or any UI crate.
//
// Module overview:
// - `envelope.rs`: The `Envelope` tagged union — the sole unit crossing the
//                  host↔player boundary, serialized as `{kind, payload}`
//                  JSON. This shape is the external wire contract.
// - `signal.rs`:   Broker register/resolve request and response enums.
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  4-byte big-endian length prefix, then JSON payload.
//
// Design decisions:
// - **JSON serialization.** The envelope contract is JSON and must stay
//   readable by other implementations of the game.
// - **Adjacent tagging for `Envelope`.** serde's `tag`/`content` attributes
//   produce exactly the `{kind, payload}` shape without hand-written
//   serialization code.
// - **No async runtime.** Uses `std::io::Read`/`Write` for framing,
//   compatible with both blocking TCP streams and buffered wrappers.

pub mod envelope;
pub mod framing;
pub mod signal;

pub use envelope::{ChatMessage, Envelope};
pub use framing::{MAX_MESSAGE_SIZE, read_message, write_message};
pub use signal::{SignalRequest, SignalResponse};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Serialize an Envelope to JSON, frame it, read it back, deserialize.
    #[test]
    fn framed_envelope_roundtrip() {
        let msg = Envelope::NumberCalled {
            number: 88,
            call_text: "Two fat ladies".into(),
            history: vec![12, 88],
        };
        let json = serde_json::to_vec(&msg).unwrap();
        let mut wire = Vec::new();
        write_message(&mut wire, &json).unwrap();

        let mut cursor = Cursor::new(&wire);
        let recovered_json = read_message(&mut cursor).unwrap();
        let recovered: Envelope = serde_json::from_slice(&recovered_json).unwrap();
        assert_eq!(recovered, msg);
    }

    /// Several framed envelopes on one stream read back in order.
    #[test]
    fn framed_stream_preserves_order() {
        let msgs = [
            Envelope::PlayerJoined { name: "P1".into() },
            Envelope::StateSync {
                history: vec![3],
                current: Some(3),
            },
            Envelope::Reset {},
        ];
        let mut wire = Vec::new();
        for msg in &msgs {
            let json = serde_json::to_vec(msg).unwrap();
            write_message(&mut wire, &json).unwrap();
        }

        let mut cursor = Cursor::new(&wire);
        for expected in &msgs {
            let bytes = read_message(&mut cursor).unwrap();
            let recovered: Envelope = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(&recovered, expected);
        }
    }
}
