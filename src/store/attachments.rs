//! Content-addressed attachment store.
//!
//! Every payload is published once under the hex SHA-256 of its bytes.
//! Files are staged in a temporary file inside the store directory and then
//! linked into place without clobbering, so a reader never observes a
//! partially written attachment and concurrent writers of the same payload
//! cannot corrupt each other.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{IngestError, Result};

/// Whether a `put` created the file or found it already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Written,
    AlreadyPresent,
}

/// Running totals for the end-of-run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub written: u64,
    pub deduplicated: u64,
    pub failed: u64,
    pub bytes_written: u64,
}

/// Directory of attachments named by the digest of their content.
#[derive(Debug)]
pub struct AttachmentStore {
    base_dir: PathBuf,
    written: AtomicU64,
    deduplicated: AtomicU64,
    failed: AtomicU64,
    bytes_written: AtomicU64,
}

impl AttachmentStore {
    /// Open the store at `base_dir`, creating the directory if needed.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| IngestError::io(&base_dir, e))?;
        Ok(Self {
            base_dir,
            written: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Where `data` is (or would be) stored.
    pub fn path_for(&self, data: &[u8]) -> PathBuf {
        self.base_dir.join(content_digest(data))
    }

    /// Store `data` and return its path.
    ///
    /// On failure the error still carries the intended destination, see
    /// [`IngestError::Store`].
    pub fn put(&self, data: &[u8]) -> Result<(PathBuf, StoreOutcome)> {
        let path = self.path_for(data);

        if path.exists() {
            debug!(path = %path.display(), "Attachment already stored");
            self.deduplicated.fetch_add(1, Ordering::Relaxed);
            return Ok((path, StoreOutcome::AlreadyPresent));
        }

        match self.publish(&path, data) {
            Ok(outcome) => {
                match outcome {
                    StoreOutcome::Written => {
                        self.written.fetch_add(1, Ordering::Relaxed);
                        self.bytes_written
                            .fetch_add(data.len() as u64, Ordering::Relaxed);
                    }
                    StoreOutcome::AlreadyPresent => {
                        self.deduplicated.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Ok((path, outcome))
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                Err(IngestError::store(path, e))
            }
        }
    }

    /// Stage `data` in a temporary file and link it to `path` without replacing anything.
    fn publish(&self, path: &Path, data: &[u8]) -> io::Result<StoreOutcome> {
        let mut staged = NamedTempFile::new_in(&self.base_dir)?;
        staged.as_file_mut().write_all(data)?;
        staged.as_file_mut().sync_all()?;

        let mut permissions = staged.as_file().metadata()?.permissions();
        permissions.set_readonly(true);
        staged.as_file().set_permissions(permissions)?;

        match staged.persist_noclobber(path) {
            Ok(_) => Ok(StoreOutcome::Written),
            // Another worker published the same content first.
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "Attachment published concurrently");
                Ok(StoreOutcome::AlreadyPresent)
            }
            Err(e) => Err(e.error),
        }
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            written: self.written.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Lower-case hex SHA-256 of `data`.
pub fn content_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_content_digest() {
        assert_eq!(
            content_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(content_digest(b"abc").len(), 64);
    }

    #[test]
    fn test_put_writes_read_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::open(dir.path().join("files")).unwrap();

        let (path, outcome) = store.put(b"payload").unwrap();
        assert_eq!(outcome, StoreOutcome::Written);
        assert_eq!(path, store.base_dir().join(content_digest(b"payload")));
        assert_eq!(fs::read(&path).unwrap(), b"payload");
        assert!(fs::metadata(&path).unwrap().permissions().readonly());
    }

    #[test]
    fn test_put_twice_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::open(dir.path()).unwrap();

        let (first, first_outcome) = store.put(b"same bytes").unwrap();
        let (second, second_outcome) = store.put(b"same bytes").unwrap();
        assert_eq!(first, second);
        assert_eq!(first_outcome, StoreOutcome::Written);
        assert_eq!(second_outcome, StoreOutcome::AlreadyPresent);

        let stats = store.stats();
        assert_eq!(stats.written, 1);
        assert_eq!(stats.deduplicated, 1);
        assert_eq!(stats.bytes_written, 10);
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::open(dir.path()).unwrap();
        store.put(b"one").unwrap();
        store.put(b"two").unwrap();
        store.put(b"one").unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_concurrent_puts_of_same_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AttachmentStore::open(dir.path()).unwrap());
        let payload = vec![7u8; 64 * 1024];

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let store = Arc::clone(&store);
                let payload = &payload;
                scope.spawn(move || {
                    let (path, _) = store.put(payload).unwrap();
                    assert_eq!(fs::read(path).unwrap(), *payload);
                });
            }
        });

        let stats = store.stats();
        assert_eq!(stats.written, 1);
        assert_eq!(stats.deduplicated, 7);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_put_reports_intended_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::open(dir.path().join("files")).unwrap();
        fs::remove_dir(store.base_dir()).unwrap();

        let expected = store.path_for(b"lost");
        match store.put(b"lost") {
            Err(IngestError::Store { path, .. }) => assert_eq!(path, expected),
            other => panic!("expected store error, got {other:?}"),
        }
        assert_eq!(store.stats().failed, 1);
    }
}
