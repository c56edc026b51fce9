//! Hook into the external file ledger.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::Uid;

/// Bookkeeping of uploads that have been announced but not completed.
#[async_trait]
pub trait UploadLedger: Send + Sync + std::fmt::Debug + 'static {
    /// Drop every unfinished upload started by `uid`. Returns how many were removed.
    async fn discard_unfinished(&self, uid: &Uid) -> AppResult<u64>;
}
