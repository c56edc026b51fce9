//! Core type definitions used across the TeraSync workspace.

pub mod hash;
pub mod id;
pub mod uid;

pub use hash::ContentHash;
pub use id::*;
pub use uid::{GroupId, Uid};
