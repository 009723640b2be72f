pub mod backend;
pub mod error;
mod fingerprint;
mod key;
mod models;

pub use crate::backend::{ObjectStore, TransferProgress};
pub use crate::fingerprint::Fingerprint;
pub use crate::key::{SEPARATOR, StoreKey};
pub use crate::models::{ListPage, PutRequest, RemoteObject};
use std::sync::Arc;

pub type StoreHandle = Arc<dyn ObjectStore + Send + Sync>;
