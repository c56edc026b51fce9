//! # terasync-auth
//!
//! Identity checks for TeraSync. Tokens are minted by the external account
//! service; this crate validates them, mints the short-lived service tokens
//! used between TeraSync processes, and hashes group passwords.
//!
//! ## Modules
//!
//! - `jwt`: claims, validation, service-token issuance
//! - `password`: Argon2id hashing and random secret generation

pub mod jwt;
pub mod password;

pub use jwt::{Claims, JwtDecoder, JwtEncoder, TokenType};
pub use password::{PasswordHasher, generate_secret};
