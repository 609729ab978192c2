//! Small shared helpers

use rand::Rng;

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a lowercase alphanumeric string of the given length
pub fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Join path segments into a dotted key
pub fn join_paths(paths: &[&str]) -> String {
    paths.join(".")
}
