//! Edge cache trait and implementations.

#[cfg(feature = "cloudfront")]
mod cloudfront;
#[cfg(any(test, feature = "mock"))]
mod mock;

#[cfg(feature = "cloudfront")]
pub use self::cloudfront::CloudFrontBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::{Invalidation, MockBackend};
use crate::error::Result;
use async_trait::async_trait;

/// Identifier the provider assigned to an accepted invalidation.
pub type InvalidationId = String;

/// A downstream cache sitting in front of the object store.
///
/// Implementations are bound to a single distribution when constructed, so
/// callers only supply what changes per request.
#[async_trait]
pub trait EdgeCache: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Submit one invalidation batch for `paths`.
    ///
    /// `reference` must be unique per logical request: providers use it to
    /// deduplicate retried submissions, so reusing one silently returns the
    /// earlier invalidation instead of creating a new one.
    async fn invalidate(&self, reference: &str, paths: &[String]) -> Result<InvalidationId>;
}
