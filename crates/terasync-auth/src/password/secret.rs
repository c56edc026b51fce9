//! Random secret generation for generated passwords, invites, and ids.

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Random alphanumeric string of `len` characters.
pub fn generate_secret(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
