//! The sync workflow: inventory, scan, upload, invalidate.

use crate::error::Result;
use crate::event::{Observer, SyncEvent};
use crate::inventory::fetch_inventory;
use crate::invalidate::{invalidate, reference_token};
use crate::scan::{Decision, plan};
use crate::upload::{UploadTask, run_uploads};
use edgesync_cdn::{CdnHandle, InvalidationId};
use edgesync_config::UploadConfig;
use edgesync_storage::{StoreHandle, StoreKey};
use futures::StreamExt;
use std::path::Path;
use tokio::sync::mpsc;

/// Tunables for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Maximum number of uploads in flight at once.
    pub concurrency: usize,
    /// Number of pending uploads buffered between the scan and the uploads
    /// before the scan waits.
    pub queue_depth: usize,
    pub cache_control: Option<String>,
    pub acl: Option<String>,
}
impl From<&UploadConfig> for SyncOptions {
    fn from(config: &UploadConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            queue_depth: config.queue_depth,
            cache_control: config.cache_control().map(str::to_string),
            acl: config.acl().map(str::to_string),
        }
    }
}
impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&UploadConfig::default())
    }
}

/// Everything a run needs, built once at startup.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub store: &'a StoreHandle,
    pub cdn: &'a CdnHandle,
    /// Local directory to publish.
    pub source: &'a Path,
    pub options: &'a SyncOptions,
    pub observer: &'a dyn Observer,
}

/// Summary of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Keys uploaded, in completion order.
    pub uploaded: Vec<StoreKey>,
    pub unchanged: u64,
    /// `None` when nothing changed and no invalidation was requested.
    pub invalidation: Option<InvalidationId>,
}

/// Publish `ctx.source` to the store, then invalidate whatever changed.
///
/// The complete remote inventory is fetched before any file is compared.
/// Files are then scanned and uploaded concurrently, the scan waiting
/// whenever `queue_depth` uploads are already pending. The first error of
/// any kind aborts the run.
pub async fn sync(ctx: Context<'_>) -> Result<SyncReport> {
    ctx.observer.notify(SyncEvent::Started { source: ctx.source, store: ctx.store.name() });
    let inventory = fetch_inventory(ctx.store).await?;
    ctx.observer.notify(SyncEvent::InventoryComplete(u64::try_from(inventory.len()).unwrap_or(u64::MAX)));

    let (tx, rx) = mpsc::channel::<Result<UploadTask>>(ctx.options.queue_depth.max(1));
    let inventory = &inventory;
    let producer = async move {
        let mut unchanged = 0u64;
        let mut decisions = std::pin::pin!(plan(ctx.source, inventory));
        while let Some(decision) = decisions.next().await {
            let task = match decision {
                Ok(Decision::Unchanged(key)) => {
                    ctx.observer.notify(SyncEvent::Unchanged(&key));
                    unchanged += 1;
                    continue;
                },
                Ok(Decision::Changed(task)) => Ok(task),
                Err(err) => Err(err),
            };
            // A closed queue means the uploads already failed; stop scanning.
            if tx.send(task).await.is_err() {
                break;
            }
        }
        unchanged
    };
    let (unchanged, changed) = tokio::join!(producer, run_uploads(ctx.store, rx, ctx.options, ctx.observer));
    let changed = changed?;

    let invalidation = invalidate(ctx.cdn, &changed, &reference_token()).await?;
    match &invalidation {
        Some(id) => ctx.observer.notify(SyncEvent::Invalidated { id, paths: changed.paths().len() }),
        None => ctx.observer.notify(SyncEvent::InvalidationSkipped),
    }

    let uploaded = changed.into_keys();
    ctx.observer.notify(SyncEvent::Complete {
        uploaded: u64::try_from(uploaded.len()).unwrap_or(u64::MAX),
        unchanged,
    });
    Ok(SyncReport { uploaded, unchanged, invalidation })
}
