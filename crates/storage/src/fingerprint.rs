//! Content fingerprints.
//!
//! A fingerprint is the lowercase hex MD5 digest of an object's bytes, which
//! is exactly what S3 reports as the ETag of a single-part upload. Remote
//! ETags are normalized into the same representation before comparison.

use crate::error::{ErrorKind, Result};
use std::fmt;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Read buffer used when streaming a file through the hasher.
const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint an in-memory buffer.
    pub fn of_bytes(data: impl AsRef<[u8]>) -> Self {
        Self(format!("{:x}", md5::compute(data)))
    }

    /// Fingerprint a file by streaming it once through the hasher.
    ///
    /// The file is never loaded into memory in full; empty files are hashed
    /// like any other (the digest of zero bytes).
    pub async fn of_file(path: &Path) -> Result<Self> {
        let mut file = tokio::fs::File::open(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
        let mut context = md5::Context::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let read = file.read(&mut buffer).await.map_err(|e| ErrorKind::from_io(e, path))?;
            if read == 0 {
                break;
            }
            context.consume(&buffer[..read]);
        }
        Ok(Self(format!("{:x}", context.compute())))
    }

    /// Normalize an ETag as reported by the store.
    ///
    /// Strips a weak validator prefix (`W/`) and surrounding double quotes,
    /// then lowercases. Multipart ETags (`<hex>-<parts>`) survive untouched
    /// apart from that, so they never equal a plain digest and the object is
    /// treated as changed.
    ///
    /// ```
    /// use edgesync_storage::Fingerprint;
    /// let plain = Fingerprint::of_bytes(b"x");
    /// assert_eq!(Fingerprint::from_etag("\"9dd4e461268c8034f5c8564e155c67a6\""), plain);
    /// assert_eq!(Fingerprint::from_etag("W/\"9DD4E461268C8034F5C8564E155C67A6\""), plain);
    /// ```
    pub fn from_etag(etag: &str) -> Self {
        let etag = etag.trim();
        let etag = etag.strip_prefix("W/").unwrap_or(etag);
        let etag = etag.strip_prefix('"').and_then(|e| e.strip_suffix('"')).unwrap_or(etag);
        Self(etag.to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
