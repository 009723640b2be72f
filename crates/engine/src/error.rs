//! Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Failures of the storage and edge
//! cache crates are kept as children of these kinds.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the stage of a sync that failed.
///
/// None of these are recovered from: a half-synced deployment behind a cache
/// is worse than a hard stop, so every kind aborts the run.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The remote listing failed or returned a page that cannot be trusted.
    /// No partial inventory is ever used.
    #[display("failed to list remote objects")]
    RemoteList,
    /// A local file or directory could not be walked, read or keyed.
    #[display("failed to read local file: {}", _0.display())]
    LocalRead(#[error(not(source))] PathBuf),
    /// A single object upload failed.
    #[display("failed to upload `{_0}`")]
    Upload(#[error(not(source))] String),
    /// The edge cache rejected the invalidation batch.
    #[display("invalidation rejected")]
    Invalidation,
}
