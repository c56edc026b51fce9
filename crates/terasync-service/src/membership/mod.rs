//! Visible peer resolution.

mod peer;
mod resolver;

pub use peer::{PeerPermissions, PeerSource, VisiblePeer};
pub use resolver::MembershipResolver;
