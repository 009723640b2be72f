//! In-memory edge cache for testing.

use crate::EdgeCache;
use crate::backend::InvalidationId;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::sync::Mutex;

/// A recorded invalidation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub reference: String,
    pub paths: Vec<String>,
}

/// In-memory edge cache for testing.
///
/// Records every request it receives. Can be told to reject requests, or to
/// reject batches above a path quota the way real providers do.
#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<Invalidation>>,
    reject: bool,
    max_paths: Option<usize>,
}

impl MockBackend {
    /// Reject every request.
    pub fn rejecting() -> Self {
        Self { reject: true, ..Self::default() }
    }

    /// Reject batches with more than `max_paths` paths.
    pub fn with_max_paths(mut self, max_paths: usize) -> Self {
        self.max_paths = Some(max_paths);
        self
    }

    /// Every accepted request, in order.
    pub fn calls(&self) -> Vec<Invalidation> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl EdgeCache for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invalidate(&self, reference: &str, paths: &[String]) -> Result<InvalidationId> {
        if paths.is_empty() {
            exn::bail!(ErrorKind::InvalidRequest("no paths to invalidate".to_string()));
        }
        if self.reject || self.max_paths.is_some_and(|max| paths.len() > max) {
            exn::bail!(ErrorKind::Rejected(self.name().to_string()));
        }
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls.push(Invalidation { reference: reference.to_string(), paths: paths.to_vec() });
        Ok(format!("MOCK{}", calls.len()))
    }
}
