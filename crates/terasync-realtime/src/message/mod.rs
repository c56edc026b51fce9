//! Hub wire protocol.

pub mod call;
pub mod types;

pub use call::{ClientRequest, HubCall};
pub use types::{ErrorBody, OutboundMessage, Severity};
