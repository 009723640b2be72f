pub mod backend;
pub mod error;

pub use crate::backend::{EdgeCache, InvalidationId};
use std::sync::Arc;

pub type CdnHandle = Arc<dyn EdgeCache + Send + Sync>;
