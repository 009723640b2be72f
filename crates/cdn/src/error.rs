//! Edge Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An edge cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for edge cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The request could not be built (empty path list, invalid reference).
    #[display("invalid invalidation request: {_0}")]
    InvalidRequest(#[error(not(source))] String),
    /// The provider refused the batch (quota exceeded, unknown distribution,
    /// access denied, ...).
    #[display("invalidation rejected by {_0}")]
    Rejected(#[error(not(source))] String),
    /// The provider accepted the request but returned something unusable.
    #[display("unexpected response from {_0}")]
    UnexpectedResponse(#[error(not(source))] String),
}
