//! In-memory object store for testing.

use crate::error::{ErrorKind, Result};
use crate::models::{ListPage, PutRequest, RemoteObject};
use crate::{Fingerprint, ObjectStore, TransferProgress};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Bytes reported per progress update.
pub const PROGRESS_CHUNK_SIZE: usize = 16 * 1024;

/// In-memory object store for testing.
///
/// Objects are stored in a sorted map behind a [`Mutex`], so all trait
/// methods operate on `&self`. Listings are split into pages of
/// [`page_size`](Self::with_page_size) objects, continuation tokens being the
/// index of the next object. Uploads read the source file from disk and
/// record the request, so tests can assert on exactly what was uploaded.
pub struct MockBackend {
    objects: Mutex<BTreeMap<String, (Fingerprint, Vec<u8>)>>,
    page_size: usize,
    puts: Mutex<Vec<PutRequest>>,
    failing_keys: HashSet<String>,
    fail_listing: bool,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockBackend {
    /// Create a mock store pre-populated with objects (ETags are computed
    /// from the given contents).
    pub fn with_objects(objects: impl IntoIterator<Item = (impl Into<String>, impl AsRef<[u8]>)>) -> Self {
        let objects = objects
            .into_iter()
            .map(|(key, data)| (key.into(), (Fingerprint::of_bytes(data.as_ref()), data.as_ref().to_vec())))
            .collect();
        Self {
            objects: Mutex::new(objects),
            page_size: 1000,
            puts: Mutex::new(Vec::new()),
            failing_keys: HashSet::new(),
            fail_listing: false,
            latency: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Create a mock store whose listing reports arbitrary (raw) ETags.
    pub fn with_etags(etags: impl IntoIterator<Item = (impl Into<String>, impl AsRef<str>)>) -> Self {
        let store = Self::default();
        {
            let mut guard = store.lock_objects();
            for (key, etag) in etags {
                guard.insert(key.into(), (Fingerprint::from_etag(etag.as_ref()), Vec::new()));
            }
        }
        store
    }

    /// Number of objects per listing page. Panics on zero: a test asking for
    /// empty pages would loop forever.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        assert!(page_size > 0, "MockBackend::with_page_size: page size must be non-zero");
        self.page_size = page_size;
        self
    }

    /// Make every upload to `key` fail.
    pub fn with_failing_key(mut self, key: impl Into<String>) -> Self {
        self.failing_keys.insert(key.into());
        self
    }

    /// Make every listing request fail.
    pub fn with_failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Hold each upload open for `latency` so concurrent uploads overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every upload request received, in completion order.
    pub fn puts(&self) -> Vec<PutRequest> {
        self.puts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Keys of every upload request received, sorted.
    pub fn put_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.puts().into_iter().map(|p| p.key.into()).collect();
        keys.sort();
        keys
    }

    /// The highest number of uploads that were in progress at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Stored content of an object.
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock_objects().get(key).map(|(_, data)| data.clone())
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, (Fingerprint, Vec<u8>)>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn store(&self, request: &PutRequest, progress: &dyn TransferProgress) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing_keys.contains(request.key.as_str()) {
            exn::bail!(ErrorKind::Network(format!("injected failure for {}", request.key)));
        }
        let data = tokio::fs::read(&request.source).await.map_err(|e| ErrorKind::from_io(e, &request.source))?;
        let total = data.len() as u64;
        if data.is_empty() {
            progress.transferred(0, 0);
        }
        let mut sent = 0;
        for chunk in data.chunks(PROGRESS_CHUNK_SIZE) {
            sent += chunk.len() as u64;
            progress.transferred(sent, total);
        }
        let fingerprint = Fingerprint::of_bytes(&data);
        self.lock_objects().insert(request.key.to_string(), (fingerprint, data));
        self.puts.lock().unwrap_or_else(|e| e.into_inner()).push(request.clone());
        Ok(())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let objects: [(&str, &[u8]); 0] = [];
        Self::with_objects(objects)
    }
}

#[async_trait]
impl ObjectStore for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_page(&self, continuation: Option<String>) -> Result<ListPage> {
        if self.fail_listing {
            exn::bail!(ErrorKind::Network("injected listing failure".to_string()));
        }
        let start = match continuation {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ErrorKind::MalformedListing(format!("unknown continuation token `{token}`")))?,
            None => 0,
        };
        let guard = self.lock_objects();
        let objects: Vec<RemoteObject> = guard
            .iter()
            .skip(start)
            .take(self.page_size)
            .map(|(key, (fingerprint, _))| RemoteObject::new(key.clone(), fingerprint.clone()))
            .collect();
        let next = start + objects.len();
        let continuation = (next < guard.len()).then(|| next.to_string());
        Ok(ListPage { objects, continuation })
    }

    async fn put(&self, request: PutRequest, progress: &dyn TransferProgress) -> Result<()> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let result = self.store(&request, progress).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreKey;
    use rstest::rstest;
    use std::collections::HashMap;

    fn request(key: &str, source: &std::path::Path) -> PutRequest {
        PutRequest {
            key: StoreKey::from_relative(key).unwrap(),
            source: source.to_path_buf(),
            content_type: "text/plain".to_string(),
            cache_control: None,
            acl: None,
        }
    }

    #[tokio::test]
    async fn test_put_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        std::fs::write(&source, b"x").unwrap();
        let store = MockBackend::default();
        store.put(request("a.txt", &source), &()).await.unwrap();
        let objects = store.list().await.unwrap();
        assert_eq!(objects, vec![RemoteObject::new("a.txt", Fingerprint::of_bytes(b"x"))]);
        assert_eq!(store.object("a.txt").unwrap(), b"x");
        assert_eq!(store.put_keys(), vec!["a.txt".to_string()]);
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(u64, u64)>>);
    impl TransferProgress for Recorder {
        fn transferred(&self, sent: u64, total: u64) {
            self.0.lock().unwrap().push((sent, total));
        }
    }

    #[rstest]
    #[case(0, vec![(0, 0)])]
    #[case(10, vec![(10, 10)])]
    #[case(PROGRESS_CHUNK_SIZE, vec![(16384, 16384)])]
    #[case(PROGRESS_CHUNK_SIZE * 2 + 1, vec![(16384, 32769), (32768, 32769), (32769, 32769)])]
    #[tokio::test]
    async fn test_progress_per_chunk(#[case] size: usize, #[case] expected: Vec<(u64, u64)>) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.bin");
        std::fs::write(&source, vec![7u8; size]).unwrap();
        let store = MockBackend::default();
        let recorder = Recorder::default();
        store.put(request("a.bin", &source), &recorder).await.unwrap();
        assert_eq!(recorder.0.into_inner().unwrap(), expected);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(7)]
    #[case(1000)]
    #[tokio::test]
    async fn test_pagination_matches_single_page(#[case] page_size: usize) {
        let contents: Vec<(String, String)> = (0..7).map(|i| (format!("dir/file-{i}.txt"), format!("content {i}"))).collect();
        let single = MockBackend::with_objects(contents.clone()).list().await.unwrap();
        let paged = MockBackend::with_objects(contents).with_page_size(page_size).list().await.unwrap();
        let single: HashMap<_, _> = single.into_iter().map(|o| (o.key, o.fingerprint)).collect();
        let paged: HashMap<_, _> = paged.into_iter().map(|o| (o.key, o.fingerprint)).collect();
        assert_eq!(single.len(), 7);
        assert_eq!(single, paged);
    }

    #[tokio::test]
    async fn test_page_continuation() {
        let store = MockBackend::with_objects([("a", "1"), ("b", "2"), ("c", "3")]).with_page_size(2);
        let first = store.list_page(None).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        let second = store.list_page(first.continuation.clone()).await.unwrap();
        assert_eq!(second.objects.len(), 1);
        assert!(second.continuation.is_none());
    }

    #[tokio::test]
    async fn test_listing_failure_terminates_stream() {
        let store = MockBackend::with_objects([("a", "1")]).with_failing_listing();
        let err = store.list().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Network(_)));
    }

    #[tokio::test]
    async fn test_bad_continuation_token() {
        let store = MockBackend::default();
        let err = store.list_page(Some("not-a-number".to_string())).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::MalformedListing(_)));
    }

    #[tokio::test]
    async fn test_failing_key() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        std::fs::write(&source, b"x").unwrap();
        let store = MockBackend::default().with_failing_key("a.txt");
        let err = store.put(request("a.txt", &source), &()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Network(_)));
        assert!(store.puts().is_empty());
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let store = MockBackend::default();
        let err = store.put(request("a.txt", &dir.path().join("missing")), &()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_with_etags_normalizes() {
        let store = MockBackend::with_etags([("a.txt", "\"9DD4E461268C8034F5C8564E155C67A6\"")]);
        let guard = store.lock_objects();
        assert_eq!(guard.get("a.txt").unwrap().0, Fingerprint::of_bytes(b"x"));
    }

    #[test]
    #[should_panic(expected = "page size must be non-zero")]
    fn test_zero_page_size_panics() {
        let _ = MockBackend::default().with_page_size(0);
    }
}
