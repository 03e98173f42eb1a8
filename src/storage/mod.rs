//! Storage of uploaded originals
//!
//! Originals live in one flat directory, one file per identifier, with no
//! sidecar metadata. Identifiers are validated before they reach this layer,
//! so they never contain path separators.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::errors::StorageResult;

pub mod identity;
pub mod memory;

pub use identity::IdGenerator;
pub use memory::MemoryStore;

/// Backing store for uploaded originals
#[async_trait]
pub trait OriginalStore: Send + Sync {
    /// Atomically claim `id`. Returns `false` if it is already taken.
    async fn reserve(&self, id: &str) -> StorageResult<bool>;

    /// Write the bytes for a reserved identifier.
    ///
    /// Readers see either the empty reservation or the complete contents,
    /// never a partial write.
    async fn write(&self, id: &str, contents: &[u8]) -> StorageResult<()>;

    /// Read an original, or `None` when nothing is stored under `id`.
    /// A reservation that has not been written yet reads as empty.
    async fn read(&self, id: &str) -> StorageResult<Option<Bytes>>;

    /// Drop a reservation whose write failed. Missing ids are ignored.
    async fn discard(&self, id: &str) -> StorageResult<()>;

    async fn exists(&self, id: &str) -> StorageResult<bool>;
}

/// Filesystem-backed store rooted at the uploads directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    permissions: u32,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, permissions: u32) -> Self {
        Self {
            root: root.into(),
            permissions,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the uploads directory if needed and apply its permissions.
    ///
    /// Failure here is fatal at startup.
    pub async fn ensure_root(&self) -> StorageResult<()> {
        if !fs::try_exists(&self.root).await? {
            fs::create_dir_all(&self.root).await?;
            info!(path = %self.root.display(), "Created uploads directory");
        }
        self.apply_permissions().await
    }

    #[cfg(unix)]
    async fn apply_permissions(&self) -> StorageResult<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&self.root, std::fs::Permissions::from_mode(self.permissions)).await?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn apply_permissions(&self) -> StorageResult<()> {
        debug!(
            permissions = format!("{:o}", self.permissions),
            "Directory permissions are not applied on this platform"
        );
        Ok(())
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    // Identifiers are alphanumeric, so a dotted name never collides with one.
    fn staging_path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!(".{id}.part"))
    }
}

#[async_trait]
impl OriginalStore for FileStore {
    async fn reserve(&self, id: &str) -> StorageResult<bool> {
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path_for(id))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(id = %id, "Identifier already taken");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, id: &str, contents: &[u8]) -> StorageResult<()> {
        let staging = self.staging_path_for(id);
        let result = async {
            fs::write(&staging, contents).await?;
            fs::rename(&staging, self.path_for(id)).await
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&staging).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(id = %id, error = %cleanup, "Failed to remove staging file");
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn read(&self, id: &str) -> StorageResult<Option<Bytes>> {
        match fs::read(self.path_for(id)).await {
            Ok(contents) => Ok(Some(Bytes::from(contents))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        Ok(fs::try_exists(self.path_for(id)).await?)
    }

    async fn discard(&self, id: &str) -> StorageResult<()> {
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => {
                debug!(id = %id, "Discarded reservation");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reserve_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 0o700);

        assert!(store.reserve("abc123").await.unwrap());
        assert!(!store.reserve("abc123").await.unwrap());
        assert!(store.exists("abc123").await.unwrap());
    }

    #[tokio::test]
    async fn test_write_then_read_returns_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 0o700);
        let contents = b"\x00\x01binary\xffcontent".to_vec();

        store.reserve("abc123").await.unwrap();
        store.write("abc123", &contents).await.unwrap();

        let read = store.read("abc123").await.unwrap().unwrap();
        assert_eq!(read.as_ref(), contents.as_slice());
    }

    #[tokio::test]
    async fn test_write_replaces_reservation_and_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 0o700);

        store.reserve("abc123").await.unwrap();
        assert_eq!(store.read("abc123").await.unwrap().unwrap().len(), 0);

        store.write("abc123", b"contents").await.unwrap();
        assert_eq!(
            store.read("abc123").await.unwrap().unwrap().as_ref(),
            b"contents"
        );

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("abc123")]);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_reservation_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 0o700);
        store.reserve("abc123").await.unwrap();

        // A directory where the staging file would go makes the write fail.
        std::fs::create_dir(dir.path().join(".abc123.part")).unwrap();
        assert!(store.write("abc123", b"contents").await.is_err());
        assert_eq!(store.read("abc123").await.unwrap().unwrap().len(), 0);

        store.discard("abc123").await.unwrap();
        assert!(!store.exists("abc123").await.unwrap());
        store.discard("abc123").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_original_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 0o700);
        assert!(store.read("zzz999").await.unwrap().is_none());
        assert!(!store.exists("zzz999").await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_root_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("uploads");
        let store = FileStore::new(&root, 0o700);

        store.ensure_root().await.unwrap();
        assert!(root.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&root).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }

        // Idempotent
        store.ensure_root().await.unwrap();
    }
}
