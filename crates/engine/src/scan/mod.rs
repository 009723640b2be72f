//! Change detection: decide, file by file, what needs uploading.

mod walk;

pub use walk::{LocalFile, walk};

use crate::error::{ErrorKind, Result};
use crate::inventory::Inventory;
use crate::upload::UploadTask;
use async_stream::stream;
use edgesync_storage::{Fingerprint, StoreKey};
use exn::ResultExt;
use futures::Stream;
use std::path::Path;

/// Content type used when nothing can be guessed from the file name.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Outcome of comparing one local file against the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Unchanged(StoreKey),
    Changed(UploadTask),
}

/// Guess a MIME type from the file extension.
pub fn content_type(path: &Path) -> String {
    mime_guess::from_path(path).first_raw().unwrap_or(FALLBACK_CONTENT_TYPE).to_string()
}

/// Compare a single local file against the inventory.
///
/// Every file is read in full, whether or not the store knows its key, so
/// an unreadable file fails here as a local read. A file is unchanged only
/// when the store holds an object at the same key with an identical
/// fingerprint; absent keys and any mismatch mean upload.
pub async fn classify(file: LocalFile, inventory: &Inventory) -> Result<Decision> {
    let key = StoreKey::from_relative(&file.relative).or_raise(|| ErrorKind::LocalRead(file.absolute.clone()))?;
    let fingerprint =
        Fingerprint::of_file(&file.absolute).await.or_raise(|| ErrorKind::LocalRead(file.absolute.clone()))?;
    if inventory.matches(&key, &fingerprint) {
        Ok(Decision::Unchanged(key))
    } else {
        Ok(Decision::Changed(UploadTask::new(key, file)))
    }
}

/// Walk `root` and classify every file found, in walk order.
///
/// The first error ends the stream.
pub fn plan<'a>(root: &'a Path, inventory: &'a Inventory) -> impl Stream<Item = Result<Decision>> + 'a {
    stream! {
        for await file in walk(root) {
            let decision = match file {
                Ok(file) => classify(file, inventory).await,
                Err(err) => Err(err),
            };
            let failed = decision.is_err();
            yield decision;
            if failed {
                return;
            }
        }
    }
}
