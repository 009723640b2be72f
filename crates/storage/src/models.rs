//! Storage models.
//!
//! These types represent both the remote listing (for change detection) and
//! the parameters of an upload.

use crate::{Fingerprint, StoreKey};
use std::path::PathBuf;

/// An object currently present in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Key relative to the backend's configured prefix (if any). Kept as the
    /// raw string the store reported; remote keys are not required to be
    /// valid [`StoreKey`]s.
    pub key: String,
    /// Normalized ETag
    pub fingerprint: Fingerprint,
}
impl RemoteObject {
    pub fn new(key: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self { key: key.into(), fingerprint }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<RemoteObject>,
    /// Token to request the next page with; `None` on the last page.
    pub continuation: Option<String>,
}

/// Everything a backend needs to upload one local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    pub key: StoreKey,
    /// Local file streamed as the object body.
    pub source: PathBuf,
    pub content_type: String,
    pub cache_control: Option<String>,
    /// Canned access policy (e.g. `public-read`); `None` leaves the bucket
    /// default in place.
    pub acl: Option<String>,
}
