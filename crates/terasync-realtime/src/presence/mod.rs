//! Shared presence registry.

pub mod registry;
