//! In-memory shared store.

mod store;

pub use store::MemoryStore;
