//! Key builders for every shared-store entry.
//!
//! Keys are relative; the store applies the configured prefix.

use terasync_core::types::Uid;

/// Prefix of every presence session row.
pub const PRESENCE_PREFIX: &str = "presence:uid:";

/// Key of the session row for `uid`.
pub fn presence(uid: &Uid) -> String {
    format!("{PRESENCE_PREFIX}{uid}")
}
