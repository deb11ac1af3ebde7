//! In-memory document store for testing.

use crate::backend::DocumentStore;
use crate::document::{Attributes, Document, Revision, ScanRange, ScanRow, WriteResult};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::Bound;

/// A store operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// [`DocumentStore::get`].
    Get,
    /// [`DocumentStore::put`].
    Put,
    /// [`DocumentStore::bulk_write`].
    BulkWrite,
    /// [`DocumentStore::range_scan`].
    RangeScan,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOperation::Get => "get",
            StoreOperation::Put => "put",
            StoreOperation::BulkWrite => "bulk_write",
            StoreOperation::RangeScan => "range_scan",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    revision: Revision,
    deleted: bool,
    body: Attributes,
}

#[derive(Debug, Default)]
struct Faults {
    operations: HashSet<StoreOperation>,
    keys: HashSet<String>,
}

/// An in-memory document store.
///
/// This store keeps every document in a `BTreeMap` and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral data that doesn't need persistence
///
/// Failures can be injected per operation or per key to exercise the
/// error paths of callers.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across tasks.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<BTreeMap<String, Slot>>,
    faults: RwLock<Faults>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding previously exported documents.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if a document carries no revision.
    pub fn from_documents(documents: Vec<Document>) -> StoreResult<Self> {
        let mut docs = BTreeMap::new();
        for doc in documents {
            let revision = doc
                .revision
                .ok_or_else(|| StoreError::Corrupted(format!("{} has no revision", doc.key)))?;
            docs.insert(
                doc.key,
                Slot {
                    revision,
                    deleted: doc.deleted,
                    body: doc.body,
                },
            );
        }
        Ok(Self {
            docs: RwLock::new(docs),
            faults: RwLock::default(),
        })
    }

    /// Returns every stored document, tombstones included, in key order.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.docs
            .read()
            .iter()
            .map(|(key, slot)| to_document(key, slot))
            .collect()
    }

    /// Returns the keys of all live documents in key order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.docs
            .read()
            .iter()
            .filter(|(_, slot)| !slot.deleted)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns the number of live documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().values().filter(|slot| !slot.deleted).count()
    }

    /// Returns true if there are no live documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes every call of `operation` fail with `Unavailable`.
    pub fn fail_operation(&self, operation: StoreOperation) {
        self.faults.write().operations.insert(operation);
    }

    /// Makes every write of `key` fail with `Unavailable`.
    ///
    /// Inside a bulk write only the document at `key` is rejected.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.faults.write().keys.insert(key.into());
    }

    /// Removes all injected failures.
    pub fn clear_faults(&self) {
        let mut faults = self.faults.write();
        faults.operations.clear();
        faults.keys.clear();
    }

    fn check(&self, operation: StoreOperation) -> StoreResult<()> {
        if self.faults.read().operations.contains(&operation) {
            return Err(StoreError::unavailable(operation.to_string()));
        }
        Ok(())
    }

    fn write(&self, docs: &mut BTreeMap<String, Slot>, doc: Document) -> StoreResult<Revision> {
        if self.faults.read().keys.contains(&doc.key) {
            return Err(StoreError::unavailable(format!("write {}", doc.key)));
        }

        let current = docs.get(&doc.key);
        let revision = match (current, &doc.revision) {
            (None, None) if doc.deleted => return Err(StoreError::not_found(doc.key)),
            (None, None) => Revision::initial(),
            (None, Some(_)) => return Err(StoreError::conflict(doc.key)),
            (Some(slot), None) if slot.deleted => {
                if doc.deleted {
                    return Err(StoreError::not_found(doc.key));
                }
                slot.revision.next()
            }
            (Some(_), None) => return Err(StoreError::conflict(doc.key)),
            (Some(slot), Some(expected)) if slot.revision == *expected => slot.revision.next(),
            (Some(_), Some(_)) => return Err(StoreError::conflict(doc.key)),
        };

        let body = if doc.deleted {
            Attributes::new()
        } else {
            doc.body
        };
        docs.insert(
            doc.key,
            Slot {
                revision: revision.clone(),
                deleted: doc.deleted,
                body,
            },
        );
        Ok(revision)
    }
}

fn to_document(key: &str, slot: &Slot) -> Document {
    Document {
        key: key.to_string(),
        revision: Some(slot.revision.clone()),
        deleted: slot.deleted,
        body: slot.body.clone(),
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, key: &str) -> StoreResult<Document> {
        self.check(StoreOperation::Get)?;
        match self.docs.read().get(key) {
            Some(slot) if !slot.deleted => Ok(to_document(key, slot)),
            _ => Err(StoreError::not_found(key)),
        }
    }

    async fn put(&self, doc: Document) -> StoreResult<Revision> {
        self.check(StoreOperation::Put)?;
        let mut docs = self.docs.write();
        self.write(&mut docs, doc)
    }

    async fn bulk_write(&self, batch: Vec<Document>) -> StoreResult<Vec<WriteResult>> {
        self.check(StoreOperation::BulkWrite)?;
        let mut docs = self.docs.write();
        Ok(batch
            .into_iter()
            .map(|doc| {
                let key = doc.key.clone();
                let outcome = self.write(&mut docs, doc);
                WriteResult { key, outcome }
            })
            .collect())
    }

    async fn range_scan(&self, range: ScanRange) -> StoreResult<Vec<ScanRow>> {
        self.check(StoreOperation::RangeScan)?;
        if let Some(end) = &range.end {
            // BTreeMap::range panics on inverted bounds.
            if *end < range.start {
                return Ok(Vec::new());
            }
        }

        let docs = self.docs.read();
        let upper = match &range.end {
            Some(end) => Bound::Included(end.as_str()),
            None => Bound::Unbounded,
        };
        let matched = docs
            .range::<str, _>((Bound::Included(range.start.as_str()), upper))
            .filter(|(_, slot)| !slot.deleted);

        let to_row = |(key, slot): (&String, &Slot)| ScanRow {
            key: key.clone(),
            revision: slot.revision.clone(),
            doc: range.include_docs.then(|| to_document(key, slot)),
        };
        let limit = range.limit.unwrap_or(usize::MAX);
        let rows = if range.descending {
            matched.rev().take(limit).map(to_row).collect()
        } else {
            matched.take(limit).map(to_row).collect()
        };
        Ok(rows)
    }
}
