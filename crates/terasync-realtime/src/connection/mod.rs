//! Local connections of this shard.

pub mod guard;
pub mod handle;
pub mod pool;
