//! Amazon CloudFront edge cache backend.
//!
//! CloudFront is a global service; its API lives in `us-east-1` regardless
//! of where the distribution's origin bucket is.

use crate::EdgeCache;
use crate::backend::InvalidationId;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use aws_sdk_cloudfront::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    types::{InvalidationBatch, Paths},
};
use exn::{OptionExt, ResultExt};

/// Region the CloudFront control plane is served from.
pub const CLOUDFRONT_REGION: &str = "us-east-1";

/// CloudFront backend bound to a single distribution.
///
/// # Examples
///
/// ```no_run
/// use edgesync_cdn::backend::CloudFrontBackend;
///
/// let cdn = CloudFrontBackend::new("E2QWRUHEXAMPLE", "access_key_id", "secret_access_key", 1);
/// ```
#[derive(Debug, Clone)]
pub struct CloudFrontBackend {
    name: String,
    client: Client,
    distribution_id: String,
}

impl CloudFrontBackend {
    pub fn new(
        distribution_id: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        let credentials = Credentials::new(key_id, key_secret, None, None, "edgesync-config");
        let config = aws_sdk_cloudfront::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(CLOUDFRONT_REGION))
            .retry_config(RetryConfig::standard().with_max_attempts(max_attempts.max(1)))
            .build();
        Self::from_client(Client::from_conf(config), distribution_id)
    }

    /// Wrap an already-configured client.
    pub fn from_client(client: Client, distribution_id: impl Into<String>) -> Self {
        let distribution_id = distribution_id.into();
        Self {
            name: format!("cloudfront:{distribution_id}"),
            client,
            distribution_id,
        }
    }
}

/// Build the invalidation batch for a request.
fn batch(reference: &str, paths: &[String]) -> Result<InvalidationBatch> {
    if paths.is_empty() {
        exn::bail!(ErrorKind::InvalidRequest("no paths to invalidate".to_string()));
    }
    let quantity = i32::try_from(paths.len())
        .or_raise(|| ErrorKind::InvalidRequest(format!("{} paths do not fit in one batch", paths.len())))?;
    let paths = Paths::builder()
        .quantity(quantity)
        .set_items(Some(paths.to_vec()))
        .build()
        .or_raise(|| ErrorKind::InvalidRequest("invalid path list".to_string()))?;
    InvalidationBatch::builder()
        .paths(paths)
        .caller_reference(reference)
        .build()
        .or_raise(|| ErrorKind::InvalidRequest("invalid invalidation batch".to_string()))
}

#[async_trait]
impl EdgeCache for CloudFrontBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invalidate(&self, reference: &str, paths: &[String]) -> Result<InvalidationId> {
        let batch = batch(reference, paths)?;
        let response = self
            .client
            .create_invalidation()
            .distribution_id(&self.distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .or_raise(|| ErrorKind::Rejected(self.name.clone()))?;
        let invalidation = response.invalidation().ok_or_raise(|| ErrorKind::UnexpectedResponse(self.name.clone()))?;
        tracing::debug!(cdn = %self.name, id = invalidation.id(), status = invalidation.status(), "Invalidation accepted");
        Ok(invalidation.id().to_string())
    }
}
