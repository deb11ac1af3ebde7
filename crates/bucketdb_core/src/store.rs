//! Entity persistence over a document store.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::id::{now_millis, IdGenerator};
use crate::keys::{self, KeyKind};
use crate::reconcile::RevisionReconciler;
use crate::record::{
    Bucket, CoreRecord, EntityRecord, IndexEntry, Staging, CREATED_AT_FIELD, ID_FIELD,
};
use bucketdb_storage::{Attributes, Document, DocumentStore, ScanRange, StoreError};
use futures::future::try_join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// One `(index name, value)` pair to index a new entity under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// The index name.
    pub name: String,
    /// The indexed value.
    pub value: String,
}

impl IndexSpec {
    /// Creates a new index spec.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Options of an index lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Match every value that starts with the given one.
    pub starts_with: bool,
    /// Match every value greater than or equal to the given one. The scan
    /// stays inside the namespace of the looked-up index name.
    pub gte: bool,
    /// Return matches in descending value order.
    pub descending: bool,
    /// Maximum number of index rows to scan.
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Creates options for an exact-match lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets prefix matching.
    #[must_use]
    pub fn starts_with(mut self, value: bool) -> Self {
        self.starts_with = value;
        self
    }

    /// Sets range matching, bounded to one index namespace.
    #[must_use]
    pub fn gte(mut self, value: bool) -> Self {
        self.gte = value;
        self
    }

    /// Sets descending order.
    #[must_use]
    pub fn descending(mut self, value: bool) -> Self {
        self.descending = value;
        self
    }

    /// Caps the number of scanned index rows.
    #[must_use]
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// An index marker found by [`EntityStore::find_ids_by_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMatch {
    /// The indexed value.
    pub value: String,
    /// The entity id.
    pub id: String,
}

/// Stores the entities of one collection.
///
/// Every entity is spread over several documents (see [`keys`]): the core
/// record, one document per bucket, and an index entry plus an index marker
/// per `(index name, value)` pair. `EntityStore` writes these in bulk and
/// reassembles them with a single prefix scan.
///
/// # Example
///
/// ```rust
/// use bucketdb_core::{EntityStore, IndexSpec, InMemoryDocumentStore};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), bucketdb_core::CoreError> {
/// let store = EntityStore::with_defaults(Arc::new(InMemoryDocumentStore::new()), "post")?;
///
/// let core = json!({"title": "Hello"}).as_object().cloned().unwrap_or_default();
/// let record = store
///     .insert(core, Vec::new(), vec![IndexSpec::new("tag", "rust")])
///     .await?;
///
/// let found = store.find_by_key("tag", "rust", Default::default()).await?;
/// assert_eq!(found[0].id(), record.id());
/// # Ok(())
/// # }
/// ```
pub struct EntityStore {
    store: Arc<dyn DocumentStore>,
    prefix: String,
    ids: Arc<dyn IdGenerator>,
    config: StoreConfig,
}

impl EntityStore {
    /// Creates a store for collection `prefix`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `prefix` is empty or contains a separator.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        prefix: impl Into<String>,
        ids: Arc<dyn IdGenerator>,
        config: StoreConfig,
    ) -> CoreResult<Self> {
        let prefix = prefix.into();
        keys::validate_segment("collection prefix", &prefix)?;
        Ok(Self {
            store,
            prefix,
            ids,
            config,
        })
    }

    /// Creates a store with date-based ids and the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `prefix` is empty or contains a separator.
    pub fn with_defaults(store: Arc<dyn DocumentStore>, prefix: impl Into<String>) -> CoreResult<Self> {
        Self::new(
            store,
            prefix,
            Arc::new(crate::id::DateIdGenerator::new()),
            StoreConfig::default(),
        )
    }

    /// Returns the collection prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the underlying document store.
    #[must_use]
    pub fn document_store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Creates a new entity and writes all of its documents in one bulk write.
    ///
    /// A `created_at` core attribute holding milliseconds since the epoch is
    /// used as the creation time; otherwise the current time is.
    ///
    /// # Errors
    ///
    /// - `Validation` if an index spec has an empty name or value, or one
    ///   containing a separator, a bucket name is unusable, or `core` uses the
    ///   reserved `id` attribute
    /// - `DuplicateBucket` if a group name appears twice
    /// - `PartialWrite` if the store rejected any document; no record is
    ///   returned and the caller should retry or clean up
    pub async fn insert(
        &self,
        mut core: Attributes,
        buckets: Vec<(String, Attributes)>,
        index_specs: Vec<IndexSpec>,
    ) -> CoreResult<EntityRecord> {
        if core.contains_key(ID_FIELD) {
            return Err(CoreError::validation(format!(
                "attribute name `{ID_FIELD}` is reserved"
            )));
        }
        for spec in &index_specs {
            if spec.name.is_empty() || spec.value.is_empty() {
                return Err(CoreError::validation(format!(
                    "index spec `{}={}` is undefined",
                    spec.name, spec.value
                )));
            }
            keys::validate_segment("index name", &spec.name)?;
            keys::validate_segment("index value", &spec.value)?;
        }

        let id = self.ids.next_id().await?;
        keys::validate_segment("entity id", &id)?;
        let created_at = match core.remove(CREATED_AT_FIELD) {
            Some(value) => value
                .as_u64()
                .ok_or_else(|| CoreError::validation("`created_at` must be milliseconds since the epoch"))?,
            None => now_millis(),
        };

        let core_key = keys::core_key(&self.prefix, &id);
        let mut record = EntityRecord::new(
            self.prefix.clone(),
            CoreRecord::new(core_key, id, created_at, core),
        );
        for (name, attributes) in buckets {
            record.add_bucket(&name, attributes)?;
        }
        for spec in &index_specs {
            record.add_search_key(&spec.name, &spec.value)?;
        }

        let mut docs = vec![record.core.to_document()];
        docs.extend(Self::pending_writes(&record));
        debug!(prefix = %self.prefix, id = %record.id(), documents = docs.len(), "inserting entity");

        let results = self.store.bulk_write(docs).await?;
        let mut reconciler = RevisionReconciler::new(results);
        reconciler.apply(&mut record);
        reconciler.finish()?;
        Ok(record)
    }

    /// Loads an entity with one prefix scan over its core key.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no core record exists for `id`, or
    /// `MalformedDocument` if one of its documents cannot be decoded.
    pub async fn get_by_id(&self, id: &str) -> CoreResult<EntityRecord> {
        keys::validate_segment("entity id", id)?;
        let core_key = keys::core_key(&self.prefix, id);
        let range = ScanRange::new(core_key.clone(), Some(keys::scan_upper_bound(&core_key)))
            .include_docs(true);
        let rows = self.store.range_scan(range).await?;

        let mut core = None;
        let mut buckets = Vec::new();
        let mut entries = Vec::new();
        for row in rows {
            let Some(doc) = row.doc else {
                return Err(CoreError::malformed(row.key, "scan row has no document"));
            };
            match KeyKind::classify(&core_key, &doc.key) {
                KeyKind::Core => core = Some(CoreRecord::from_document(doc)?),
                KeyKind::IndexEntry => entries.push(IndexEntry::from_document(doc)?),
                KeyKind::Bucket => buckets.push(Bucket::from_document(doc)?),
            }
        }

        let core = core.ok_or_else(|| CoreError::not_found(&core_key))?;
        let mut record = EntityRecord::new(self.prefix.clone(), core);
        for bucket in buckets {
            record.buckets.insert(bucket.store.clone(), bucket);
        }
        for entry in entries {
            record
                .index_entries
                .insert(keys::index_slot(&entry.name, &entry.value), entry);
        }
        Ok(record)
    }

    fn index_range(&self, name: &str, value: &str, options: &FindOptions) -> CoreResult<ScanRange> {
        keys::validate_segment("index name", name)?;
        let open_ended = options.starts_with || options.gte;
        if !open_ended {
            keys::validate_segment("index value", value)?;
        }

        // A range lookup starts at the bare value so longer values sort after it.
        let start = keys::index_search_prefix(&self.prefix, name, value, open_ended);
        let end = if options.gte {
            keys::scan_upper_bound(&keys::index_namespace(&self.prefix, name))
        } else {
            keys::scan_upper_bound(&start)
        };
        Ok(ScanRange::new(start, Some(end))
            .descending(options.descending)
            .limit(options.limit.or(self.config.scan_limit)))
    }

    /// Returns the `(value, id)` pairs indexed under `name` without loading
    /// the entities. Each id appears once, at its first match.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an unusable index name or an exact lookup of
    /// an empty value or one containing a separator, and store errors from
    /// the scan.
    pub async fn find_ids_by_key(
        &self,
        name: &str,
        value: &str,
        options: FindOptions,
    ) -> CoreResult<Vec<IndexMatch>> {
        let range = self.index_range(name, value, &options)?;
        let exact = !(options.starts_with || options.gte);
        let rows = self.store.range_scan(range).await?;

        let mut seen = HashSet::new();
        let mut matches = Vec::new();
        for row in &rows {
            let Some((found, id)) = keys::split_marker(&self.prefix, name, &row.key) else {
                warn!(key = %row.key, "skipping unparseable index marker");
                continue;
            };
            if exact && found != value {
                warn!(key = %row.key, "skipping index marker of another value");
                continue;
            }
            if seen.insert(id.to_string()) {
                matches.push(IndexMatch {
                    value: found.to_string(),
                    id: id.to_string(),
                });
            }
        }
        Ok(matches)
    }

    /// Loads every entity indexed under `(name, value)`.
    ///
    /// Entities are fetched concurrently, up to
    /// [`StoreConfig::find_concurrency`] at a time, and returned in index
    /// order. An empty result is not an error.
    ///
    /// # Errors
    ///
    /// Returns the first error of the scan or of any entity fetch; a marker
    /// whose entity no longer exists yields `NotFound`.
    pub async fn find_by_key(
        &self,
        name: &str,
        value: &str,
        options: FindOptions,
    ) -> CoreResult<Vec<EntityRecord>> {
        let matches = self.find_ids_by_key(name, value, options).await?;
        debug!(prefix = %self.prefix, index = name, matches = matches.len(), "index lookup");

        stream::iter(matches)
            .map(|found| async move { self.get_by_id(&found.id).await })
            .buffered(self.config.find_concurrency.max(1))
            .try_collect()
            .await
    }

    /// Deletes every persisted document of `record` in one bulk write.
    ///
    /// Staged but unsaved changes are ignored.
    ///
    /// # Errors
    ///
    /// - `Validation` if the record was never persisted
    /// - `PartialWrite` if the store rejected any tombstone
    pub async fn remove(&self, record: &EntityRecord) -> CoreResult<()> {
        let core_revision = record.core.revision.clone().ok_or_else(|| {
            CoreError::validation(format!("entity {} was never persisted", record.id()))
        })?;

        let persisted_entries: Vec<&IndexEntry> = record
            .index_entries
            .values()
            .filter(|entry| entry.revision.is_some())
            .collect();
        let markers = try_join_all(
            persisted_entries
                .iter()
                .map(|entry| self.fetch_marker(&entry.reference)),
        )
        .await?;

        let mut docs = vec![Document::tombstone(record.core.key.clone(), core_revision)];
        for bucket in record.buckets.values() {
            if let Some(revision) = &bucket.revision {
                docs.push(Document::tombstone(bucket.key.clone(), revision.clone()));
            }
        }
        for entry in persisted_entries {
            if let Some(revision) = &entry.revision {
                docs.push(Document::tombstone(entry.key.clone(), revision.clone()));
            }
        }
        docs.extend(markers.into_iter().flatten());
        debug!(prefix = %self.prefix, id = %record.id(), documents = docs.len(), "removing entity");

        let results = self.store.bulk_write(docs).await?;
        RevisionReconciler::new(results).finish()
    }

    /// Returns a tombstone for the marker at `key`, or `None` if it is gone.
    async fn fetch_marker(&self, key: &str) -> CoreResult<Option<Document>> {
        match self.store.get(key).await {
            Ok(doc) => Ok(doc
                .revision
                .map(|revision| Document::tombstone(doc.key, revision))),
            Err(StoreError::NotFound { .. }) => {
                warn!(key, "index marker already removed");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Documents the next save has to write for buckets and index entries,
    /// excluding marker tombstones.
    fn pending_writes(record: &EntityRecord) -> Vec<Document> {
        let mut docs = Vec::new();
        for bucket in record.buckets.values() {
            match (bucket.staging, &bucket.revision) {
                (Staging::Added | Staging::Updated, _) => docs.push(bucket.to_document()),
                (Staging::Deleted, Some(revision)) => {
                    docs.push(Document::tombstone(bucket.key.clone(), revision.clone()));
                }
                _ => {}
            }
        }
        for entry in record.index_entries.values() {
            match (entry.staging, &entry.revision) {
                (Staging::Added | Staging::Updated, _) => {
                    docs.push(entry.marker_document());
                    docs.push(entry.to_document());
                }
                (Staging::Deleted, Some(revision)) => {
                    docs.push(Document::tombstone(entry.key.clone(), revision.clone()));
                }
                _ => {}
            }
        }
        docs
    }

    /// Writes every staged change of `record` in one bulk write.
    ///
    /// Sub-records whose writes landed get their new revisions and are marked
    /// persisted; removed ones are dropped from the record. Sub-records with a
    /// rejected write keep their staging state, so calling `save` again
    /// resends exactly what failed.
    ///
    /// # Errors
    ///
    /// - `PartialWrite` if the store rejected some documents
    /// - store errors if the bulk write or a marker lookup failed as a whole;
    ///   the record is unchanged in that case
    pub async fn save(&self, record: &mut EntityRecord) -> CoreResult<()> {
        let mut docs = Self::pending_writes(record);

        let removed_markers: Vec<&str> = record
            .index_entries
            .values()
            .filter(|entry| entry.staging == Staging::Deleted)
            .map(|entry| entry.reference.as_str())
            .collect();
        let markers = try_join_all(removed_markers.iter().map(|key| self.fetch_marker(key))).await?;
        docs.extend(markers.into_iter().flatten());

        if docs.is_empty() {
            return Ok(());
        }
        debug!(prefix = %self.prefix, id = %record.id(), documents = docs.len(), "saving entity");

        let results = self.store.bulk_write(docs).await?;
        let mut reconciler = RevisionReconciler::new(results);
        reconciler.apply(record);
        if !reconciler.is_complete() {
            warn!(prefix = %self.prefix, id = %record.id(), "save partially failed");
        }
        reconciler.finish()
    }

    /// Discards staged changes and re-reads modified buckets from the store.
    ///
    /// Sub-records that were never persisted are dropped, index entries staged
    /// for removal are reinstated, and buckets staged as updated or removed
    /// are replaced by their stored version.
    ///
    /// # Errors
    ///
    /// Returns the first fetch error. Buckets fetched before the failure may
    /// already be replaced; calling `rollback` again finishes the job.
    pub async fn rollback(&self, record: &mut EntityRecord) -> CoreResult<()> {
        record.buckets.retain(|_, bucket| bucket.revision.is_some());
        record.index_entries.retain(|_, entry| entry.revision.is_some());
        for entry in record.index_entries.values_mut() {
            if entry.staging == Staging::Deleted {
                entry.staging = Staging::Persisted;
            }
        }

        let stale: Vec<String> = record
            .buckets
            .values()
            .filter(|bucket| matches!(bucket.staging, Staging::Updated | Staging::Deleted))
            .map(|bucket| bucket.key.clone())
            .collect();
        if stale.is_empty() {
            return Ok(());
        }
        debug!(prefix = %self.prefix, id = %record.id(), buckets = stale.len(), "rolling back entity");

        let fetched = try_join_all(stale.iter().map(|key| self.store.get(key))).await?;
        for doc in fetched {
            let bucket = Bucket::from_document(doc)?;
            record.buckets.insert(bucket.store.clone(), bucket);
        }
        Ok(())
    }

    /// Merges `attributes` onto the core record and writes it.
    ///
    /// Null values remove attributes. The record is updated only if the
    /// write succeeds.
    ///
    /// # Errors
    ///
    /// - `Validation` for the reserved `id` and `created_at` attributes or a
    ///   record that was never persisted
    /// - `Conflict` if the stored core record changed since it was read
    pub async fn update_core(&self, record: &mut EntityRecord, attributes: Attributes) -> CoreResult<()> {
        if attributes.contains_key(ID_FIELD) || attributes.contains_key(CREATED_AT_FIELD) {
            return Err(CoreError::validation(format!(
                "attribute names `{ID_FIELD}` and `{CREATED_AT_FIELD}` are reserved"
            )));
        }
        if record.core.revision.is_none() {
            return Err(CoreError::validation(format!(
                "entity {} was never persisted",
                record.id()
            )));
        }

        let mut core = record.core.clone();
        for (name, value) in attributes {
            match value {
                Value::Null => {
                    core.attributes.remove(&name);
                }
                value => {
                    core.attributes.insert(name, value);
                }
            }
        }
        let revision = self.store.put(core.to_document()).await?;
        core.revision = Some(revision);
        record.core = core;
        Ok(())
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("prefix", &self.prefix)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
