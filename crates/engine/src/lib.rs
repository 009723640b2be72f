//! Change detection and bounded-concurrency sync of a local directory to an
//! object store, followed by a single edge cache invalidation.
//!
//! A run is strictly phased:
//! 1. [`fetch_inventory`] lists every remote object.
//! 2. [`plan`] walks the source tree and compares each file's fingerprint
//!    against the inventory, feeding changed files through a bounded queue.
//! 3. [`run_uploads`] drains that queue with a fixed ceiling on concurrent
//!    uploads.
//! 4. [`invalidate`] sends one batch for the root and every uploaded key.
//!
//! [`sync`] drives all four.

pub mod error;
mod event;
mod inventory;
mod invalidate;
mod scan;
mod sync;
mod upload;

pub use crate::event::{LogObserver, Observer, SyncEvent};
pub use crate::inventory::{Inventory, fetch_inventory};
pub use crate::invalidate::{invalidate, reference_token};
pub use crate::scan::{Decision, FALLBACK_CONTENT_TYPE, LocalFile, classify, content_type, plan, walk};
pub use crate::sync::{Context, SyncOptions, SyncReport, sync};
pub use crate::upload::{ChangedKeys, UploadTask, run_uploads};
