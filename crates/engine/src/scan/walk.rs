//! Recursive walk of the source directory.

use crate::error::{ErrorKind, Result};
use async_stream::stream;
use exn::ResultExt;
use futures::Stream;
use std::fs::Metadata;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

/// A regular file found under the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub absolute: PathBuf,
    /// Path relative to the source root, in host form.
    pub relative: PathBuf,
    pub size: u64,
}

enum WalkEntry {
    File(LocalFile),
    Descend(PathBuf),
    Skip,
}

#[track_caller]
fn local_read(err: std::io::Error, path: &Path) -> crate::error::Error {
    exn::Exn::from(err).raise(ErrorKind::LocalRead(path.to_path_buf()))
}

/// Resolve what an entry actually is. Symbolic links are followed; links to
/// files count as files, links to anything else (or to nothing) are dropped.
async fn resolve(entry: &DirEntry) -> Result<Option<Metadata>> {
    let path = entry.path();
    let file_type = entry.file_type().await.map_err(|e| local_read(e, &path))?;
    if !file_type.is_symlink() {
        return entry.metadata().await.map(Some).map_err(|e| local_read(e, &path));
    }
    match fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => Ok(Some(metadata)),
        Ok(_) => {
            tracing::debug!(path = %path.display(), "Skipping symlink to non-file");
            Ok(None)
        },
        Err(err) if err.kind() == IoErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Skipping dangling symlink");
            Ok(None)
        },
        Err(err) => Err(local_read(err, &path)),
    }
}

async fn process_entry(root: &Path, entry: DirEntry) -> Result<WalkEntry> {
    let path = entry.path();
    let Some(metadata) = resolve(&entry).await? else {
        return Ok(WalkEntry::Skip);
    };
    if metadata.is_dir() {
        // Symlinked directories were already filtered out by `resolve`.
        return Ok(WalkEntry::Descend(path));
    }
    if !metadata.is_file() {
        tracing::debug!(path = %path.display(), "Skipping special file");
        return Ok(WalkEntry::Skip);
    }
    let relative = path
        .strip_prefix(root)
        .or_raise(|| ErrorKind::LocalRead(path.clone()))?
        .to_path_buf();
    Ok(WalkEntry::File(LocalFile { absolute: path, relative, size: metadata.len() }))
}

/// Stream every regular file under `root`, depth first, in no particular
/// order.
///
/// Any directory that cannot be read ends the walk with an error: skipping
/// it would silently leave its files out of the deployment.
pub fn walk(root: &Path) -> impl Stream<Item = Result<LocalFile>> + '_ {
    let mut stack = vec![root.to_path_buf()];
    stream!({
        while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(err) => {
                    yield Err(local_read(err, &current));
                    return;
                },
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(err) => {
                        yield Err(local_read(err, &current));
                        return;
                    },
                };
                match process_entry(root, entry).await {
                    Ok(WalkEntry::File(file)) => yield Ok(file),
                    Ok(WalkEntry::Descend(dir)) => stack.push(dir),
                    Ok(WalkEntry::Skip) => {},
                    Err(err) => {
                        yield Err(err);
                        return;
                    },
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    async fn relative_paths(root: &Path) -> BTreeSet<PathBuf> {
        walk(root).map_ok(|file| file.relative).try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn test_walk_nested() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("assets/css")).unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>").unwrap();
        std::fs::write(dir.path().join("assets/app.js"), "app").unwrap();
        std::fs::write(dir.path().join("assets/css/site.css"), "body{}").unwrap();

        let expected: BTreeSet<PathBuf> =
            ["index.html", "assets/app.js", "assets/css/site.css"].into_iter().map(PathBuf::from).collect();
        assert_eq!(relative_paths(dir.path()).await, expected);
    }

    #[tokio::test]
    async fn test_sizes_and_absolute_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("empty.txt"), "").unwrap();
        std::fs::write(dir.path().join("five.txt"), "12345").unwrap();

        let mut files: Vec<LocalFile> = walk(dir.path()).try_collect().await.unwrap();
        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        assert_eq!(files[0].size, 0);
        assert_eq!(files[1].size, 5);
        assert_eq!(files[1].absolute, dir.path().join("five.txt"));
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        assert!(relative_paths(dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let err = walk(&missing).try_collect::<Vec<_>>().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::LocalRead(path) if path == &missing));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks() {
        use std::os::unix::fs::symlink;

        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("target.txt"), "target").unwrap();
        std::fs::create_dir(outside.path().join("linked")).unwrap();
        std::fs::write(outside.path().join("linked/inner.txt"), "inner").unwrap();

        symlink(outside.path().join("target.txt"), dir.path().join("file-link.txt")).unwrap();
        symlink(outside.path().join("linked"), dir.path().join("dir-link")).unwrap();
        symlink(outside.path().join("nowhere"), dir.path().join("dangling")).unwrap();

        let files: Vec<LocalFile> = walk(dir.path()).try_collect().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, PathBuf::from("file-link.txt"));
        assert_eq!(files[0].size, 6);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_directory_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(locked.join("secret.txt"), "secret").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        // Privileged users can read the directory anyway.
        let readable = std::fs::read_dir(&locked).is_ok();

        let result = walk(dir.path()).try_collect::<Vec<_>>().await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        if !readable {
            assert!(matches!(&*result.unwrap_err(), ErrorKind::LocalRead(path) if path == &locked));
        }
    }
}
