//! Group (syncshell) operations.

pub mod dto;
mod service;

pub use dto::*;
pub use service::GroupService;
