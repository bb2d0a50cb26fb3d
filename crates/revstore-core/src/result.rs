//! Convenience result type alias for RevStore.

use crate::error::AppError;

/// A specialized `Result` type for RevStore operations.
pub type AppResult<T> = Result<T, AppError>;
