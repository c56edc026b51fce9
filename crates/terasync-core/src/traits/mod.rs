//! Core traits defined in `terasync-core` and implemented by other crates.

pub mod notify;
pub mod storage;
pub mod store;
pub mod upload;

pub use notify::ReadyNotifier;
pub use storage::{BlobMeta, BlobStore, ByteStream};
pub use store::SharedStore;
pub use upload::UploadLedger;
