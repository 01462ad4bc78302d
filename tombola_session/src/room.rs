// Room directory: short shareable room codes ↔ full transport addresses.
//
// The broker's address space is namespaced with a fixed prefix so that
// unrelated services sharing a broker cannot collide with game rooms. The
// host sees and shares only the 6-character code; the prefix is prepended
// when talking to the broker and stripped when displaying. Codes are
// case-insensitive — normalization uppercases before use in either
// direction.

use thiserror::Error;

use crate::rng::GameRng;

/// Fixed prefix prepended to a room code to form the broker address.
pub const ADDRESS_PREFIX: &str = "tombola-";

/// Room codes are exactly this many characters.
pub const CODE_LEN: usize = 6;

/// Alphabet for generated codes. Entered codes accept lowercase too and are
/// uppercased during normalization.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// The entered room code is not 6 alphanumeric characters.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid room code: must be {CODE_LEN} alphanumeric characters")]
pub struct InvalidRoomCode;

/// Normalize a user-entered code: trim, uppercase, validate shape.
pub fn normalize_code(code: &str) -> Result<String, InvalidRoomCode> {
    let trimmed = code.trim();
    if trimmed.len() != CODE_LEN || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(InvalidRoomCode);
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// Form the full broker address for a user-entered code.
pub fn code_to_address(code: &str) -> Result<String, InvalidRoomCode> {
    Ok(format!("{ADDRESS_PREFIX}{}", normalize_code(code)?))
}

/// Strip the prefix off a broker address for display to the host.
/// Returns `None` for addresses outside the game's namespace.
pub fn address_to_code(address: &str) -> Option<&str> {
    address.strip_prefix(ADDRESS_PREFIX)
}

/// Generate a fresh 6-character room code.
pub fn generate_code(rng: &mut GameRng) -> String {
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.range_usize(0, CODE_ALPHABET.len())] as char)
        .collect()
}
