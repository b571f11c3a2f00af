//! Local durable copy of registered content.
//!
//! Each registration is written to `{root}/{YYYYmmdd_HHMMSS_ffffff}_{name}`.
//! Files are created exclusively, so two registrations of the same name in
//! the same microsecond get distinct files rather than one overwriting the
//! other.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::{MedproofError, Result};
use crate::fingerprint::Fingerprint;

const MAX_NAME_ATTEMPTS: u32 = 100;

/// Length of the `%Y%m%d_%H%M%S_%6f` prefix.
const STAMP_LEN: usize = 22;

/// Directory of archived uploads.
#[derive(Debug, Clone)]
pub struct LocalArchive {
    root: PathBuf,
}

/// An archived copy found for a record.
#[derive(Debug, Clone)]
pub struct ArchivedCopy {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub fingerprint: Fingerprint,
}

impl LocalArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` under a time-qualified name and return the path.
    ///
    /// `file_name` must already be sanitised.
    pub async fn persist(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| storage_error("create archive directory", &self.root, e))?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{stamp}_{file_name}")
            } else {
                format!("{stamp}~{attempt:02}_{file_name}")
            };
            let path = self.root.join(name);

            let file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(storage_error("create", &path, e)),
            };
            let file = fill(file, &path, bytes).await?;
            if let Err(e) = file.sync_all().await {
                drop(file);
                remove_quietly(&path).await;
                return Err(storage_error("sync", &path, e));
            }

            debug!(path = %path.display(), size = bytes.len(), "Archived content");
            return Ok(path);
        }

        Err(MedproofError::StorageError(format!(
            "Could not find a free archive name for {file_name}"
        )))
    }

    /// Remove an archived file; used to undo a registration that did not
    /// reach the ledger.
    pub async fn discard(&self, path: &Path) {
        remove_quietly(path).await;
    }

    /// Find the archived copy of `file_name` whose fingerprint is `expected`.
    ///
    /// When no copy matches, the most recent copy under that name is returned
    /// so the caller can report the divergence. `None` when no copy exists.
    pub async fn find(&self, file_name: &str, expected: &Fingerprint) -> Result<Option<ArchivedCopy>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error("read archive directory", &self.root, e)),
        };

        let mut candidates = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_error("read archive directory", &self.root, e))?
        {
            let name = entry.file_name();
            if name.to_str().is_some_and(|n| is_archived_name_of(n, file_name)) {
                candidates.push(entry.path());
            }
        }
        // Names start with the timestamp, so lexical order is age order.
        candidates.sort();

        let mut newest = None;
        for path in candidates.into_iter().rev() {
            let bytes = fs::read(&path)
                .await
                .map_err(|e| storage_error("read", &path, e))?;
            let fingerprint = Fingerprint::of_bytes(&bytes);
            let copy = ArchivedCopy {
                path,
                bytes,
                fingerprint,
            };
            if copy.fingerprint.matches(expected) {
                return Ok(Some(copy));
            }
            newest.get_or_insert(copy);
        }
        Ok(newest)
    }
}

/// Write `bytes` to a freshly created archive file. A partial file is
/// removed before the error is returned.
async fn fill<W: AsyncWrite + Unpin>(mut writer: W, path: &Path, bytes: &[u8]) -> Result<W> {
    let written = match writer.write_all(bytes).await {
        Ok(()) => writer.flush().await.map_err(|e| storage_error("flush", path, e)),
        Err(e) => Err(storage_error("write", path, e)),
    };
    match written {
        Ok(()) => Ok(writer),
        Err(e) => {
            drop(writer);
            remove_quietly(path).await;
            Err(e)
        }
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove archived copy");
    }
}

/// Whether `name` is `{stamp}_{file_name}` or `{stamp}~NN_{file_name}`.
fn is_archived_name_of(name: &str, file_name: &str) -> bool {
    let Some(prefix) = name
        .strip_suffix(file_name)
        .and_then(|p| p.strip_suffix('_'))
    else {
        return false;
    };
    prefix.len() == STAMP_LEN
        || (prefix.len() == STAMP_LEN + 3 && prefix.as_bytes()[STAMP_LEN] == b'~')
}

fn storage_error(action: &str, path: &Path, e: std::io::Error) -> MedproofError {
    MedproofError::StorageError(format!("Failed to {action} {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_persist_uses_distinct_names() {
        let dir = TempDir::new().unwrap();
        let archive = LocalArchive::new(dir.path().join("verified_files"));

        let a = archive.persist("note.txt", b"one").await.unwrap();
        let b = archive.persist("note.txt", b"two").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(std::fs::read(&a).unwrap(), b"one");
        assert_eq!(std::fs::read(&b).unwrap(), b"two");
        assert!(a.file_name().unwrap().to_str().unwrap().ends_with("_note.txt"));
    }

    #[tokio::test]
    async fn test_find_prefers_matching_fingerprint() {
        let dir = TempDir::new().unwrap();
        let archive = LocalArchive::new(dir.path());
        let original = archive.persist("note.txt", b"ok").await.unwrap();
        archive.persist("note.txt", b"changed").await.unwrap();
        archive.persist("other.txt", b"ok").await.unwrap();

        let found = archive
            .find("note.txt", &Fingerprint::of_bytes(b"ok"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.path, original);
        assert_eq!(found.bytes, b"ok");
    }

    #[tokio::test]
    async fn test_find_without_match_returns_newest_copy() {
        let dir = TempDir::new().unwrap();
        let archive = LocalArchive::new(dir.path());
        archive.persist("note.txt", b"first").await.unwrap();
        let newest = archive.persist("note.txt", b"second").await.unwrap();

        let found = archive
            .find("note.txt", &Fingerprint::of_bytes(b"ok"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.path, newest);
        assert!(!found.fingerprint.matches(&Fingerprint::of_bytes(b"ok")));
    }

    #[test]
    fn test_archived_name_matching() {
        assert!(is_archived_name_of("20240101_120000_000001_note.txt", "note.txt"));
        assert!(is_archived_name_of("20240101_120000_000001~03_note.txt", "note.txt"));
        assert!(!is_archived_name_of("20240101_120000_000001_my_note.txt", "note.txt"));
        assert!(!is_archived_name_of("note.txt", "note.txt"));
    }

    #[tokio::test]
    async fn test_find_in_missing_directory_is_none() {
        let dir = TempDir::new().unwrap();
        let archive = LocalArchive::new(dir.path().join("absent"));
        assert!(archive
            .find("note.txt", &Fingerprint::of_bytes(b"ok"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_discard_removes_file() {
        let dir = TempDir::new().unwrap();
        let archive = LocalArchive::new(dir.path());
        let path = archive.persist("note.txt", b"ok").await.unwrap();
        archive.discard(&path).await;
        assert!(!path.exists());
    }

    /// Accepts nothing, like a full disk.
    struct FullDisk;

    impl AsyncWrite for FullDisk {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Err(std::io::Error::other("no space left on device")))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("20240101_120000_000001_note.txt");
        std::fs::write(&path, b"o").unwrap();

        let err = fill(FullDisk, &path, b"ok").await.err().unwrap();
        assert!(matches!(err, MedproofError::StorageError(_)), "{err:?}");
        assert!(!path.exists());

        let archive = LocalArchive::new(dir.path());
        assert!(archive
            .find("note.txt", &Fingerprint::of_bytes(b"ok"))
            .await
            .unwrap()
            .is_none());
    }
}
