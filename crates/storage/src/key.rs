//! Store key derivation.
//!
//! Object stores address objects by a flat, slash-separated key. Local files
//! are addressed by a host path. This module turns the latter into the former
//! without ever letting a host-specific separator leak into a key.

use crate::error::{ErrorKind, Result};
use std::fmt;
use std::path::{Component, Path};

/// The canonical separator used by object stores.
pub const SEPARATOR: char = '/';

/// A canonical, slash-separated object key.
///
/// Built from the *components* of a relative path rather than its string
/// form, so the host separator is never part of a key and two different
/// relative paths can never produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreKey(String);

impl StoreKey {
    /// Derive a key from a path relative to the sync root.
    ///
    /// > **Note:** On Unix a backslash is an ordinary filename character and
    /// >           is kept as-is. On Windows it is a separator and becomes `/`.
    ///
    /// # Returns
    /// Returns [`InvalidKey`](crate::error::ErrorKind::InvalidKey) if the path
    /// escapes the root, is empty, carries a platform prefix, or contains
    /// null bytes or non-UTF-8 components.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use edgesync_storage::StoreKey;
    /// // Valid paths
    /// assert_eq!(StoreKey::from_relative("assets/app.js").unwrap().as_str(), "assets/app.js");
    /// assert_eq!(StoreKey::from_relative("./a//b/").unwrap().as_str(), "a/b");
    /// // Invalid paths
    /// assert!(StoreKey::from_relative("../etc/passwd").is_err());
    /// assert!(StoreKey::from_relative("").is_err());
    /// assert!(StoreKey::from_relative("a\0b").is_err());
    /// ```
    pub fn from_relative(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut components: Vec<&str> = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(s) => {
                    // Null bytes pass through Path::components() on Unix but
                    // no object store accepts them.
                    if s.as_encoded_bytes().contains(&0) {
                        exn::bail!(ErrorKind::InvalidKey(path.to_path_buf()));
                    }
                    let Some(s) = s.to_str() else {
                        exn::bail!(ErrorKind::InvalidKey(path.to_path_buf()));
                    };
                    components.push(s);
                },
                Component::CurDir => {},
                // A key is always relative to the sync root.
                Component::RootDir | Component::Prefix(_) | Component::ParentDir => {
                    exn::bail!(ErrorKind::InvalidKey(path.to_path_buf()))
                },
            }
        }
        match components.is_empty() {
            true => exn::bail!(ErrorKind::InvalidKey(path.to_path_buf())),
            false => Ok(Self(components.join("/"))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URL path an edge cache serves this object under (`/` + key).
    pub fn to_url_path(&self) -> String {
        format!("{SEPARATOR}{}", self.0)
    }
}
impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
impl AsRef<str> for StoreKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
impl From<StoreKey> for String {
    fn from(key: StoreKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("index.html", "index.html")]
    #[case("assets/app.js", "assets/app.js")]
    #[case("a/b/c/file.css", "a/b/c/file.css")]
    #[case("a//b//c", "a/b/c")]
    #[case("a/./b/./c", "a/b/c")]
    #[case("./a/b/", "a/b")]
    #[case("dir with spaces/ünïcødé.txt", "dir with spaces/ünïcødé.txt")]
    fn test_valid_keys(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(StoreKey::from_relative(path).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("./.")]
    #[case("../etc/passwd")]
    #[case("a/../b")]
    #[case("/absolute/file")]
    #[case("a\0b")]
    fn test_invalid_keys(#[case] path: &str) {
        let err = StoreKey::from_relative(path).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }

    #[test]
    fn test_url_path() {
        let key = StoreKey::from_relative("b.txt").unwrap();
        assert_eq!(key.to_url_path(), "/b.txt");
        let key = StoreKey::from_relative("nested/b.txt").unwrap();
        assert_eq!(key.to_url_path(), "/nested/b.txt");
    }

    #[cfg(unix)]
    #[test]
    fn test_backslash_is_not_a_separator_on_unix() {
        // A literal backslash in a Unix filename must not collide with a
        // nested path of the same spelling.
        let literal = StoreKey::from_relative(Path::new("a\\b")).unwrap();
        let nested = StoreKey::from_relative(Path::new("a/b")).unwrap();
        assert_eq!(literal.as_str(), "a\\b");
        assert_ne!(literal, nested);
    }

    #[cfg(windows)]
    #[test]
    fn test_backslash_normalization() {
        assert_eq!(StoreKey::from_relative(Path::new("a\\b\\c")).unwrap().as_str(), "a/b/c");
        assert_eq!(StoreKey::from_relative(Path::new("a\\b/c\\d")).unwrap().as_str(), "a/b/c/d");
    }

    #[test]
    fn test_key_never_contains_host_separator() {
        let relative: std::path::PathBuf = ["deep", "nested", "tree", "file.bin"].iter().collect();
        let key = StoreKey::from_relative(&relative).unwrap();
        assert_eq!(key.as_str(), "deep/nested/tree/file.bin");
        if std::path::MAIN_SEPARATOR != SEPARATOR {
            assert!(!key.as_str().contains(std::path::MAIN_SEPARATOR));
        }
    }
}
