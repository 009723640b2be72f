//! Edge cache invalidation.

use crate::error::{ErrorKind, Result};
use crate::upload::ChangedKeys;
use edgesync_cdn::{CdnHandle, InvalidationId};
use exn::ResultExt;
use time::OffsetDateTime;

/// A caller reference that is unique per run: the current time in
/// nanoseconds since the Unix epoch.
pub fn reference_token() -> String {
    OffsetDateTime::now_utc().unix_timestamp_nanos().to_string()
}

/// Invalidate the root and every uploaded key in a single batch.
///
/// Must only be called once all uploads have finished. When nothing besides
/// the root changed, no request is sent and `None` is returned.
pub async fn invalidate(cdn: &CdnHandle, changed: &ChangedKeys, reference: &str) -> Result<Option<InvalidationId>> {
    if changed.is_root_only() {
        tracing::debug!(cdn = cdn.name(), "Nothing changed, skipping invalidation");
        return Ok(None);
    }
    let paths = changed.paths();
    let id = cdn.invalidate(reference, &paths).await.or_raise(|| ErrorKind::Invalidation)?;
    tracing::debug!(cdn = cdn.name(), id = %id, paths = paths.len(), reference, "Invalidation created");
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgesync_cdn::backend::{Invalidation, MockBackend};
    use edgesync_storage::StoreKey;
    use std::sync::Arc;

    fn changed(keys: &[&str]) -> ChangedKeys {
        let mut changed = ChangedKeys::default();
        keys.iter().for_each(|key| changed.push(StoreKey::from_relative(key).unwrap()));
        changed
    }

    #[tokio::test]
    async fn test_root_only_is_suppressed() {
        let mock = Arc::new(MockBackend::rejecting());
        let cdn: CdnHandle = mock.clone();
        assert_eq!(invalidate(&cdn, &changed(&[]), "ref").await.unwrap(), None);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_single_batch() {
        let mock = Arc::new(MockBackend::default());
        let cdn: CdnHandle = mock.clone();
        let id = invalidate(&cdn, &changed(&["b.txt", "assets/app.js"]), "ref-1").await.unwrap();

        assert_eq!(id.as_deref(), Some("MOCK1"));
        assert_eq!(
            mock.calls(),
            vec![Invalidation {
                reference: "ref-1".to_string(),
                paths: vec!["/".to_string(), "/b.txt".to_string(), "/assets/app.js".to_string()],
            }]
        );
    }

    #[tokio::test]
    async fn test_rejection_is_fatal() {
        let cdn: CdnHandle = Arc::new(MockBackend::default().with_max_paths(2));
        let err = invalidate(&cdn, &changed(&["a.txt", "b.txt"]), "ref").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalidation));
    }

    #[test]
    fn test_reference_tokens_differ() {
        let first = reference_token();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let second = reference_token();
        assert!(first.parse::<i128>().is_ok());
        assert_ne!(first, second);
    }
}
