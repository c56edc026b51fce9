//! # terasync-core
//!
//! Core crate for the TeraSync server. Contains configuration schemas,
//! typed identifiers, the traits other crates implement across process
//! and storage boundaries, and the unified error system.
//!
//! This crate has **no** internal dependencies on other TeraSync crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
