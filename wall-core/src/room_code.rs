use rand::Rng;
use wall_types::{ROOM_CODE_LEN, RoomError};

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Upper bound on generation attempts before creation aborts with
/// `CodeSpaceExhausted`. With 36^6 possible codes this only trips when the
/// live-room count approaches the code space itself.
const MAX_GENERATION_ATTEMPTS: usize = 1024;

/// Generate a random room code (uppercase alphanumeric, fixed length).
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// Generate a code that the `in_use` predicate does not already know,
/// retrying up to the attempt bound.
pub fn generate_unique_code<F>(mut in_use: F) -> Result<String, RoomError>
where
    F: FnMut(&str) -> bool,
{
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let code = generate_code();
        if !in_use(&code) {
            return Ok(code);
        }
    }
    Err(RoomError::CodeSpaceExhausted)
}
