//! # terasync-storage
//!
//! Blob storage for the file distribution side of TeraSync:
//!
//! - [`LocalBlobStore`]: content-addressed directory with atomic publication
//! - [`origin`]: where blobs come from on a cache miss (cold directory or
//!   an upstream server over HTTP)
//! - [`CachedBlobProvider`]: `ensure(hash)` with a process-wide single-flight
//!   map so each hash is fetched from the origin at most once at a time
//! - [`block`]: concatenation of many blobs into one delimited stream

pub mod block;
pub mod local;
pub mod manager;
pub mod origin;
pub mod provider;
pub mod stats;

pub use local::LocalBlobStore;
pub use manager::StorageManager;
pub use provider::{BlobHandle, CachedBlobProvider};
pub use stats::{FileStatistics, StatisticsSnapshot};
