//! Random secrets handed out to clients: refresh, CSRF and password-reset
//! tokens and the temporary passwords given to new moderators.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

pub const REFRESH_TOKEN_BYTES: usize = 64;
pub const RESET_TOKEN_BYTES: usize = 32;
pub const CSRF_TOKEN_BYTES: usize = 64;
pub const TEMPORARY_PASSWORD_LEN: usize = 12;

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";

/// 64 random bytes as 128 lowercase hex characters.
pub fn generate_refresh_token() -> String {
    random_hex(REFRESH_TOKEN_BYTES)
}

/// 32 random bytes as 64 lowercase hex characters.
pub fn generate_reset_token() -> String {
    random_hex(RESET_TOKEN_BYTES)
}

/// 64 random bytes as 128 lowercase hex characters.
pub fn generate_csrf_token() -> String {
    random_hex(CSRF_TOKEN_BYTES)
}

pub fn is_refresh_token_format(token: &str) -> bool {
    token.len() == REFRESH_TOKEN_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Twelve characters with at least one uppercase letter, one lowercase
/// letter and one digit, shuffled so no position reveals its class.
pub fn generate_temporary_password() -> String {
    let mut rng = rand::thread_rng();
    let classes = [UPPERCASE, LOWERCASE, DIGITS];

    let mut chars: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();

    let alphabet = classes.concat();
    while chars.len() < TEMPORARY_PASSWORD_LEN {
        chars.push(alphabet[rng.gen_range(0..alphabet.len())]);
    }

    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time comparison to avoid timing side-channels.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}
