//! Convenience result type alias for TeraSync.

use crate::error::AppError;

/// A specialized `Result` type for TeraSync operations.
pub type AppResult<T> = Result<T, AppError>;
