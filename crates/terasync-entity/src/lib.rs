//! # terasync-entity
//!
//! Domain entity models for TeraSync. These are the rows the external
//! relationship store hands to the membership resolver and the group
//! service, plus the value objects exchanged with clients.

pub mod group;
pub mod identity;
pub mod pair;
pub mod permission;
pub mod upload;

pub use group::{Group, GroupBan, GroupMember, GroupMemberRole, TempInvite};
pub use identity::{User, UserData};
pub use pair::{Pair, PairStatus};
pub use permission::{GroupPermissions, GroupUserPreferredPermissions, UserPermissions};
pub use upload::PendingUpload;
