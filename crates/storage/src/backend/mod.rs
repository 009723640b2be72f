//! Object store trait and implementations.
//!
//! This module defines the `ObjectStore` trait, which provides the two
//! operations a sync needs from a remote store: a paginated listing of
//! what is already there, and a streamed upload of a local file.

#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(feature = "s3")]
mod s3;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::{MockBackend, PROGRESS_CHUNK_SIZE};
#[cfg(feature = "s3")]
pub use self::s3::{S3Backend, S3Settings};
use crate::error::Result;
use crate::models::{ListPage, PutRequest, RemoteObject};
use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

/// Receives byte counts while an upload is in progress.
///
/// Purely informational: a backend never consults it, and an upload
/// behaves the same whatever the receiver does.
pub trait TransferProgress: Send + Sync {
    /// `sent` of `total` bytes have been handed to the store.
    fn transferred(&self, sent: u64, total: u64);
}

/// Ignores progress.
impl TransferProgress for () {
    fn transferred(&self, _sent: u64, _total: u64) {}
}

pub type RemoteObjectStream<'a> = Pin<Box<dyn Stream<Item = Result<RemoteObject>> + Send + 'a>>;

/// Unified interface for remote object stores.
///
/// All operations are asynchronous. Keys are always relative to whatever
/// prefix the backend was configured with.
///
/// # Pagination
/// Backends only implement [`list_page()`](Self::list_page). Following
/// continuation tokens is done once, in [`list_stream()`](Self::list_stream),
/// so every backend paginates the same way.
///
/// # Examples
///
/// ```
/// use futures::TryStreamExt;
/// # use edgesync_storage::{ObjectStore, error::Result};
/// # async fn example(store: &dyn ObjectStore) -> Result<()> {
///
/// // Process objects one at a time, across every page
/// let mut stream = store.list_stream();
/// while let Some(object) = stream.try_next().await? {
///     println!("{}: {}", object.key, object.fingerprint);
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Fetch a single listing page.
    ///
    /// Pass `None` for the first page, then the previous page's
    /// [`continuation`](ListPage::continuation) until it is `None`.
    async fn list_page(&self, continuation: Option<String>) -> Result<ListPage>;

    /// Stream every object in the store, following continuation tokens
    /// until the store reports the last page.
    ///
    /// The first error terminates the stream; a partial listing is never
    /// presented as complete.
    fn list_stream(&self) -> RemoteObjectStream<'_> {
        Box::pin(stream! {
            let mut continuation = None;
            let mut page_number: u64 = 0;
            loop {
                let page = match self.list_page(continuation.take()).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                page_number += 1;
                tracing::debug!(store = self.name(), page = page_number, objects = page.objects.len(), "Fetched listing page");
                for object in page.objects {
                    yield Ok(object);
                }
                match page.continuation {
                    Some(token) => continuation = Some(token),
                    None => break,
                }
            }
        })
    }

    /// Collect the whole listing into a [`Vec`].
    async fn list(&self) -> Result<Vec<RemoteObject>> {
        self.list_stream().try_collect().await
    }

    /// Upload a local file, streaming it from disk, reporting the bytes
    /// sent to `progress`.
    ///
    /// Overwrites any existing object at the same key.
    async fn put(&self, request: PutRequest, progress: &dyn TransferProgress) -> Result<()>;
}
