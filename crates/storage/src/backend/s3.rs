//! S3-compatible object store backend.
//!
//! This module provides an object store implementation for S3-compatible
//! services including AWS S3, Backblaze B2, Tigris (Fly.io), and others.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file (or the
//! environment, through the configuration layer). The backend never consults
//! the AWS credential chain on its own.
//!
//! # Retries
//!
//! The SDK's standard retry strategy is configured with an explicit attempt
//! budget. A sync treats an upload that exhausted its budget as fatal, so the
//! default budget is a single attempt.

use crate::{
    Fingerprint, ObjectStore, TransferProgress,
    error::{ErrorKind, Result},
    models::{ListPage, PutRequest, RemoteObject},
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    primitives::ByteStream,
    types::ObjectCannedAcl,
};
use exn::ResultExt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests. The upload scheduler has its
/// own, lower, ceiling; this only guards against a misconfigured one.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// Largest object a single `PutObject` request accepts (5 GiB).
pub const MAX_SINGLE_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Connection settings for [`S3Backend::new`].
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    /// Optional key prefix (acts as virtual directory)
    pub prefix: Option<String>,
    /// AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    pub region: String,
    /// Custom endpoint URL for S3-compatible services
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
}

/// S3-compatible object store backend.
///
/// Lists and uploads objects in an S3 bucket, optionally under a key prefix.
/// All keys handed to and returned from this backend are relative to the
/// configured prefix (if any).
///
/// # Examples
///
/// ```no_run
/// use edgesync_storage::backend::{S3Backend, S3Settings};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = S3Backend::new("site", S3Settings {
///     bucket: "my-bucket".to_string(),
///     prefix: None,
///     region: "us-west-2".to_string(),
///     endpoint: None,
///     key_id: "access_key_id".to_string(),
///     key_secret: "secret_access_key".to_string(),
///     max_attempts: 1,
/// })?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 object store backend.
    pub fn new(name: impl Into<String>, settings: S3Settings) -> Result<Self> {
        let credentials = Credentials::new(settings.key_id, settings.key_secret, None, None, "edgesync-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(settings.region))
            .retry_config(RetryConfig::standard().with_max_attempts(settings.max_attempts.max(1)))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        // Set custom endpoint for non-AWS services
        if let Some(endpoint_url) = settings.endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        let client = Client::from_conf(config_builder.build());
        Ok(Self::from_client(name, client, settings.bucket, settings.prefix))
    }

    /// Wrap an already-configured client.
    pub fn from_client(name: impl Into<String>, client: Client, bucket: impl Into<String>, prefix: Option<String>) -> Self {
        let prefix = prefix.map(|p| normalize_prefix(&p)).filter(|p| !p.is_empty());
        Self {
            name: name.into(),
            client,
            bucket: bucket.into(),
            prefix,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        }
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }
}

/// Trim surrounding slashes so the prefix can be joined with a single `/`.
fn normalize_prefix(prefix: &str) -> String {
    prefix.trim_matches('/').to_string()
}

/// Construct the full S3 key from a key relative to the prefix.
fn full_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}/{key}"),
        None => key.to_string(),
    }
}

/// Strip the configured prefix from an S3 key. Keys outside the prefix
/// cannot be addressed by this backend and are dropped from listings.
fn relative_key<'k>(prefix: Option<&str>, key: &'k str) -> Option<&'k str> {
    match prefix {
        Some(prefix) => key.strip_prefix(prefix).and_then(|s| s.strip_prefix('/')),
        None => Some(key),
    }
}

/// Decide the continuation token of a listing page.
///
/// A page that claims to be truncated without a token to continue from is
/// malformed: treating it as the last page would present a partial listing
/// as complete.
fn next_continuation(is_truncated: Option<bool>, token: Option<&str>) -> Result<Option<String>> {
    match (is_truncated.unwrap_or(false), token) {
        (true, Some(token)) if !token.is_empty() => Ok(Some(token.to_string())),
        (true, _) => exn::bail!(ErrorKind::MalformedListing("truncated page without continuation token".to_string())),
        (false, _) => Ok(None),
    }
}

/// Uploads are single-part so the resulting ETag stays a plain MD5; refuse
/// anything the store would reject for size.
fn check_single_part_size(source: &std::path::Path, size: u64) -> Result<()> {
    if size > MAX_SINGLE_PART_SIZE {
        exn::bail!(ErrorKind::TooLarge { path: source.to_path_buf(), size, limit: MAX_SINGLE_PART_SIZE });
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_page(&self, continuation: Option<String>) -> Result<ListPage> {
        let _permit = self.acquire_permit().await?;
        // A trailing slash keeps "site" from matching "site-old/...".
        let prefix = self.prefix.as_deref().map(|p| format!("{p}/"));
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("failed to list bucket `{}`", self.bucket)))?;

        let mut objects = Vec::with_capacity(response.contents().len());
        for object in response.contents() {
            let Some(key) = object.key() else {
                exn::bail!(ErrorKind::MalformedListing("object without a key".to_string()));
            };
            let Some(relative) = relative_key(self.prefix.as_deref(), key) else {
                continue;
            };
            match object.e_tag() {
                Some(etag) => objects.push(RemoteObject::new(relative, Fingerprint::from_etag(etag))),
                // Absent from the inventory means "changed"; it gets re-uploaded.
                None => tracing::warn!(store = %self.name, key, "Listed object has no ETag"),
            }
        }
        let continuation = next_continuation(response.is_truncated(), response.next_continuation_token())?;
        Ok(ListPage { objects, continuation })
    }

    // The SDK exposes no hook into the request body, so progress is only
    // reported when the upload starts and once the store has accepted it.
    async fn put(&self, request: PutRequest, progress: &dyn TransferProgress) -> Result<()> {
        let key = full_key(self.prefix.as_deref(), request.key.as_str());
        let metadata =
            tokio::fs::metadata(&request.source).await.map_err(|e| ErrorKind::from_io(e, &request.source))?;
        check_single_part_size(&request.source, metadata.len())?;
        let body = ByteStream::from_path(&request.source)
            .await
            .or_raise(|| ErrorKind::BackendError(format!("cannot open `{}` for upload", request.source.display())))?;
        let _permit = self.acquire_permit().await?;
        progress.transferred(0, metadata.len());
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .content_type(&request.content_type)
            .set_cache_control(request.cache_control)
            .set_acl(request.acl.as_deref().map(ObjectCannedAcl::from))
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("failed to upload `{key}`")))?;
        progress.transferred(metadata.len(), metadata.len());
        Ok(())
    }
}
