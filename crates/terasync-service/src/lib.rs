//! # terasync-service
//!
//! Business logic over the social graph:
//!
//! - [`directory`]: the contract with the external relationship store, plus
//!   an in-memory implementation
//! - [`membership`]: computes the set of peers each identity can see
//! - [`group`]: group operations and their admission rules
//! - [`pair`]: individual pair operations
//!
//! Services follow constructor injection; every dependency is provided at
//! construction time via `Arc` references.

pub mod directory;
pub mod group;
pub mod membership;
pub mod pair;

pub use directory::{MembershipLimits, MemoryDirectory, RelationshipDirectory};
pub use group::GroupService;
pub use membership::{MembershipResolver, VisiblePeer};
pub use pair::PairService;
