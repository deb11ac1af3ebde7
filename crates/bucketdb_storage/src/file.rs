//! File-based document store for persistent storage.

use crate::backend::DocumentStore;
use crate::document::{Document, Revision, ScanRange, ScanRow, WriteResult};
use crate::error::StoreResult;
use crate::memory::InMemoryDocumentStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A document store persisted as a JSON snapshot.
///
/// Documents live in memory with the same semantics as
/// [`InMemoryDocumentStore`]; after every write the full document set,
/// tombstones included, is written to a temporary file which then replaces the
/// snapshot. Data survives process restarts.
///
/// # Durability
///
/// The snapshot is synced before the rename, so a crash leaves either the old
/// or the new snapshot in place. If persisting fails the write is still
/// visible in memory and the error is returned to the caller.
///
/// # Example
///
/// ```no_run
/// use bucketdb_storage::FileDocumentStore;
/// use std::path::Path;
///
/// let store = FileDocumentStore::open(Path::new("data.json")).unwrap();
/// ```
#[derive(Debug)]
pub struct FileDocumentStore {
    path: PathBuf,
    inner: InMemoryDocumentStore,
    persist_lock: Mutex<()>,
}

impl FileDocumentStore {
    /// Opens the snapshot at `path`, or starts empty if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid snapshot.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let inner = if path.exists() {
            let bytes = fs::read(path)?;
            let documents: Vec<Document> = if bytes.is_empty() {
                Vec::new()
            } else {
                serde_json::from_slice(&bytes)?
            };
            debug!(path = %path.display(), documents = documents.len(), "loaded snapshot");
            InMemoryDocumentStore::from_documents(documents)?
        } else {
            InMemoryDocumentStore::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            inner,
            persist_lock: Mutex::new(()),
        })
    }

    /// Opens the snapshot, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the snapshot is invalid.
    pub fn open_with_create_dirs(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the in-memory view of the snapshot.
    #[must_use]
    pub fn inner(&self) -> &InMemoryDocumentStore {
        &self.inner
    }

    fn persist(&self) -> StoreResult<()> {
        let _guard = self.persist_lock.lock();
        let documents = self.inner.documents();
        let bytes = serde_json::to_vec(&documents)?;

        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), documents = documents.len(), "persisted snapshot");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get(&self, key: &str) -> StoreResult<Document> {
        self.inner.get(key).await
    }

    async fn put(&self, doc: Document) -> StoreResult<Revision> {
        let revision = self.inner.put(doc).await?;
        self.persist()?;
        Ok(revision)
    }

    async fn bulk_write(&self, docs: Vec<Document>) -> StoreResult<Vec<WriteResult>> {
        let results = self.inner.bulk_write(docs).await?;
        if results.iter().any(WriteResult::is_ok) {
            self.persist()?;
        }
        Ok(results)
    }

    async fn range_scan(&self, range: ScanRange) -> StoreResult<Vec<ScanRow>> {
        self.inner.range_scan(range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_starts_empty() {
        let dir = tempdir().unwrap();
        let store = FileDocumentStore::open(&dir.path().join("db.json")).unwrap();
        assert!(store.inner().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn file_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.json");

        let rev = {
            let store = FileDocumentStore::open(&path).unwrap();
            store.put(Document::empty("a")).await.unwrap();
            let results = store
                .bulk_write(vec![Document::empty("b"), Document::empty("c")])
                .await
                .unwrap();
            assert!(results.iter().all(WriteResult::is_ok));
            store.get("a").await.unwrap().revision.unwrap()
        };

        let store = FileDocumentStore::open(&path).unwrap();
        assert_eq!(store.inner().len(), 3);
        let doc = store.get("a").await.unwrap();
        assert_eq!(doc.revision, Some(rev.clone()));

        let stale = store
            .put(Document::empty("a").with_revision(Some(Revision::initial())))
            .await;
        assert!(matches!(stale, Err(StoreError::Conflict { .. })));
        store.put(Document::tombstone("a", rev)).await.unwrap();

        let store = FileDocumentStore::open(&path).unwrap();
        assert_eq!(store.inner().keys(), vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn open_with_create_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("db.json");
        let store = FileDocumentStore::open_with_create_dirs(&path).unwrap();
        store.put(Document::empty("a")).await.unwrap();
        assert!(path.exists());
    }

    #[test]
    fn invalid_snapshot_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, b"not json").unwrap();
        let result = FileDocumentStore::open(&path);
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
