//! Remote inventory: what the store already holds.

use crate::error::{ErrorKind, Result};
use edgesync_storage::{Fingerprint, RemoteObject, StoreHandle, StoreKey};
use exn::ResultExt;
use futures::TryStreamExt;
use std::collections::HashMap;

/// Map of every remote key to its fingerprint, as listed at the start of a
/// run. Built once, never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory(HashMap<String, Fingerprint>);

impl Inventory {
    pub fn get(&self, key: &str) -> Option<&Fingerprint> {
        self.0.get(key)
    }

    /// Whether the store already holds exactly this content at `key`.
    pub fn matches(&self, key: &StoreKey, fingerprint: &Fingerprint) -> bool {
        self.get(key.as_str()) == Some(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
// Store listings are not guaranteed to be ordered or duplicate-free; the
// last record seen for a key wins.
impl Extend<RemoteObject> for Inventory {
    fn extend<I: IntoIterator<Item = RemoteObject>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(|object| (object.key, object.fingerprint)));
    }
}
impl FromIterator<RemoteObject> for Inventory {
    fn from_iter<I: IntoIterator<Item = RemoteObject>>(iter: I) -> Self {
        let mut inventory = Self::default();
        inventory.extend(iter);
        inventory
    }
}

/// Fetch the complete remote inventory, following every listing page.
///
/// Any failure discards everything fetched so far: deciding "unchanged"
/// against a partial listing would skip files that were never uploaded.
pub async fn fetch_inventory(store: &StoreHandle) -> Result<Inventory> {
    let inventory: Inventory = store.list_stream().try_collect().await.or_raise(|| ErrorKind::RemoteList)?;
    tracing::debug!(store = store.name(), objects = inventory.len(), "Fetched remote inventory");
    Ok(inventory)
}
