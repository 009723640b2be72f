//! Progress reporting.
//!
//! The engine never prints. It reports what it is doing to an [`Observer`],
//! which only ever watches: nothing an observer does can influence control
//! flow.

use edgesync_storage::StoreKey;
use std::path::Path;

/// Progress events emitted during a [`sync`](crate::sync()).
///
/// Events follow a loose ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. [`InventoryComplete`](Self::InventoryComplete), exactly once.
/// 3. [`Unchanged`](Self::Unchanged), [`UploadStarted`](Self::UploadStarted),
///    [`UploadProgress`](Self::UploadProgress) and [`Uploaded`](Self::Uploaded),
///    interleaved.
/// 4. [`InvalidationSkipped`](Self::InvalidationSkipped) or
///    [`Invalidated`](Self::Invalidated).
/// 5. [`Complete`](Self::Complete).
///
/// A fatal error ends the sequence early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent<'a> {
    Started { source: &'a Path, store: &'a str },
    /// The remote listing is complete; carries the number of objects.
    InventoryComplete(u64),
    /// A local file matches its remote counterpart and will not be uploaded.
    Unchanged(&'a StoreKey),
    UploadStarted { key: &'a StoreKey, size: u64 },
    /// `sent` of `total` bytes of one upload have been handed to the store.
    UploadProgress { key: &'a StoreKey, sent: u64, total: u64 },
    Uploaded { key: &'a StoreKey, size: u64 },
    /// Nothing changed, so no invalidation request was sent.
    InvalidationSkipped,
    Invalidated { id: &'a str, paths: usize },
    Complete { uploaded: u64, unchanged: u64 },
}

/// Receives [`SyncEvent`]s as they happen.
pub trait Observer: Send + Sync {
    fn notify(&self, event: SyncEvent<'_>);
}

/// Ignores everything.
impl Observer for () {
    fn notify(&self, _event: SyncEvent<'_>) {}
}

/// Reports progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn notify(&self, event: SyncEvent<'_>) {
        match event {
            SyncEvent::Started { source, store } => {
                tracing::info!(source = %source.display(), store, "Retrieving remote inventory")
            },
            SyncEvent::InventoryComplete(objects) => tracing::info!(objects, "Remote inventory complete"),
            SyncEvent::Unchanged(key) => tracing::debug!(%key, "Unchanged"),
            SyncEvent::UploadStarted { key, size } => tracing::debug!(%key, size, "Uploading"),
            SyncEvent::UploadProgress { key, sent, total } => tracing::trace!(%key, sent, total, "Upload progress"),
            SyncEvent::Uploaded { key, size } => tracing::info!(%key, size, "Uploaded"),
            SyncEvent::InvalidationSkipped => tracing::info!("No files to invalidate"),
            SyncEvent::Invalidated { id, paths } => tracing::info!(id, paths, "Invalidation submitted"),
            SyncEvent::Complete { uploaded, unchanged } => tracing::info!(uploaded, unchanged, "Sync complete"),
        }
    }
}
