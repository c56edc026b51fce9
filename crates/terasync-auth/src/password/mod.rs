//! Group password hashing and random secrets.

mod hasher;
mod secret;

pub use hasher::PasswordHasher;
pub use secret::generate_secret;
