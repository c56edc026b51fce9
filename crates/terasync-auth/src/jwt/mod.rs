//! JWT claims, validation, and issuance.

mod claims;
mod decoder;
mod encoder;

pub use claims::{Claims, TokenType};
pub use decoder::JwtDecoder;
pub use encoder::JwtEncoder;
