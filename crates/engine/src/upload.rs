//! Bounded upload scheduler.

use crate::error::{Error, ErrorKind, Result};
use crate::event::{Observer, SyncEvent};
use crate::scan::{LocalFile, content_type};
use crate::sync::SyncOptions;
use edgesync_storage::{PutRequest, StoreHandle, StoreKey, TransferProgress};
use exn::ResultExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// A changed file waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub key: StoreKey,
    pub source: PathBuf,
    pub content_type: String,
    pub size: u64,
}
impl UploadTask {
    pub fn new(key: StoreKey, file: LocalFile) -> Self {
        let content_type = content_type(&file.relative);
        Self { key, source: file.absolute, content_type, size: file.size }
    }

    fn into_request(self, options: &SyncOptions) -> PutRequest {
        PutRequest {
            key: self.key,
            source: self.source,
            content_type: self.content_type,
            cache_control: options.cache_control.clone(),
            acl: options.acl.clone(),
        }
    }
}

/// Keys uploaded during a run, in completion order.
///
/// The site root is always part of the invalidation set, so it's seeded
/// in; a set holding only the root means nothing changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedKeys(Vec<StoreKey>);

impl ChangedKeys {
    pub const ROOT: &'static str = "/";

    pub fn push(&mut self, key: StoreKey) {
        self.0.push(key);
    }

    /// Whether only the seeded root remains.
    pub fn is_root_only(&self) -> bool {
        self.0.is_empty()
    }

    /// Edge cache paths: the root followed by `/` + key for every upload.
    pub fn paths(&self) -> Vec<String> {
        std::iter::once(Self::ROOT.to_string()).chain(self.0.iter().map(StoreKey::to_url_path)).collect()
    }

    pub fn into_keys(self) -> Vec<StoreKey> {
        self.0
    }
}

/// Forwards a backend's byte counts to the observer.
struct ObservedProgress<'a> {
    key: &'a StoreKey,
    observer: &'a dyn Observer,
}
impl TransferProgress for ObservedProgress<'_> {
    fn transferred(&self, sent: u64, total: u64) {
        self.observer.notify(SyncEvent::UploadProgress { key: self.key, sent, total });
    }
}

async fn upload(
    store: &StoreHandle,
    task: UploadTask,
    options: &SyncOptions,
    observer: &dyn Observer,
) -> Result<(StoreKey, u64)> {
    observer.notify(SyncEvent::UploadStarted { key: &task.key, size: task.size });
    let (key, size) = (task.key.clone(), task.size);
    let progress = ObservedProgress { key: &key, observer };
    store.put(task.into_request(options), &progress).await.or_raise(|| ErrorKind::Upload(key.to_string()))?;
    Ok((key, size))
}

fn record_failure(failure: &mut Option<Error>, err: Error) {
    match failure {
        None => *failure = Some(err),
        Some(_) => tracing::warn!(error = ?err, "Additional failure while draining uploads"),
    }
}

/// Upload every task received on `queue`, keeping at most
/// `options.concurrency` uploads in flight.
///
/// Fails fast. After the first error, whether from an upload or from the
/// producer, the queue is closed and no further task is admitted; uploads
/// already in flight are allowed to finish before that first error is
/// returned.
pub async fn run_uploads(
    store: &StoreHandle,
    mut queue: mpsc::Receiver<Result<UploadTask>>,
    options: &SyncOptions,
    observer: &dyn Observer,
) -> Result<ChangedKeys> {
    let concurrency = options.concurrency.max(1);
    let mut in_flight = FuturesUnordered::new();
    let mut changed = ChangedKeys::default();
    let mut failure: Option<Error> = None;
    let mut queue_open = true;

    loop {
        let admitting = queue_open && failure.is_none() && in_flight.len() < concurrency;
        tokio::select! {
            task = queue.recv(), if admitting => match task {
                Some(Ok(task)) => in_flight.push(upload(store, task, options, observer)),
                Some(Err(err)) => {
                    queue.close();
                    record_failure(&mut failure, err);
                },
                None => queue_open = false,
            },
            Some(result) = in_flight.next(), if !in_flight.is_empty() => match result {
                Ok((key, size)) => {
                    observer.notify(SyncEvent::Uploaded { key: &key, size });
                    changed.push(key);
                },
                Err(err) => {
                    queue.close();
                    record_failure(&mut failure, err);
                },
            },
            else => break,
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(changed),
    }
}
