use std::time::Instant;

use crypto::digest::Digest;
use crypto::sha2::Sha256;
use lazy_static::lazy_static;
use rand::distributions::Alphanumeric;
use rand::Rng;

lazy_static! {
    static ref STARTED: Instant = Instant::now();
}

pub fn sha256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.input(input.as_bytes());
    hasher.result_str()
}

pub fn rand_string(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

/// Seconds since process start. The first caller pins the epoch, so
/// timestamps are comparable across the whole process lifetime.
pub fn monotonic_seconds() -> u64 {
    STARTED.elapsed().as_secs()
}
