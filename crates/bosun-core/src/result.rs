//! Result type aliases for Bosun.

use crate::BosunError;

/// A specialized `Result` type for Bosun operations.
pub type BosunResult<T> = Result<T, BosunError>;

