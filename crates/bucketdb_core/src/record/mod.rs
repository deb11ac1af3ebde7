//! The staged, in-memory unit of work for one entity.
//!
//! An [`EntityRecord`] owns one core record, the entity's buckets keyed by
//! group name, and its index entries keyed by `name/value`. Buckets and index
//! entries are changed only through the staging methods below; the changes
//! become durable when the record is handed to
//! [`EntityStore::save`](crate::EntityStore::save), or are discarded by
//! [`EntityStore::rollback`](crate::EntityStore::rollback).
//!
//! Staging methods are synchronous and take `&mut self`: a record has a single
//! owner, and concurrent mutation is ruled out by the borrow checker rather
//! than by locking.

mod bucket;
mod core_record;
mod index_entry;

pub use bucket::{Bucket, STORE_FIELD};
pub use core_record::{CoreRecord, CREATED_AT_FIELD, ID_FIELD};
pub use index_entry::IndexEntry;

use crate::error::{CoreError, CoreResult};
use crate::keys;
use bucketdb_storage::Attributes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pending state of a bucket or index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Staging {
    /// Never persisted; has no revision.
    Added,
    /// Persisted and unchanged.
    Persisted,
    /// Persisted and locally modified.
    Updated,
    /// Persisted and staged for removal.
    Deleted,
}

impl Staging {
    /// Returns true if the next save has to write this sub-record.
    #[must_use]
    pub fn is_pending(self) -> bool {
        self != Staging::Persisted
    }
}

/// One entity: its core record, buckets and index entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub(crate) prefix: String,
    pub(crate) core: CoreRecord,
    pub(crate) buckets: BTreeMap<String, Bucket>,
    pub(crate) index_entries: BTreeMap<String, IndexEntry>,
}

impl EntityRecord {
    pub(crate) fn new(prefix: String, core: CoreRecord) -> Self {
        Self {
            prefix,
            core,
            buckets: BTreeMap::new(),
            index_entries: BTreeMap::new(),
        }
    }

    /// Returns the entity id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.core.id
    }

    /// Returns the collection prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the core record.
    #[must_use]
    pub fn core(&self) -> &CoreRecord {
        &self.core
    }

    /// Returns the bucket for `name`, including one staged for removal.
    #[must_use]
    pub fn bucket(&self, name: &str) -> Option<&Bucket> {
        self.buckets.get(name)
    }

    /// Returns all buckets in group-name order.
    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.values()
    }

    /// Returns the index entry for `(name, value)`.
    #[must_use]
    pub fn index_entry(&self, name: &str, value: &str) -> Option<&IndexEntry> {
        self.index_entries.get(&keys::index_slot(name, value))
    }

    /// Returns all index entries in `name/value` order.
    pub fn index_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.index_entries.values()
    }

    /// Returns the index entries named `name`, including ones staged for removal.
    pub fn index_entries_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a IndexEntry> + 'a {
        self.index_entries.values().filter(move |entry| entry.name == name)
    }

    /// Returns the values indexed under `name` that are not staged for removal.
    #[must_use]
    pub fn index_values(&self, name: &str) -> Vec<&str> {
        self.index_entries
            .values()
            .filter(|entry| entry.name == name && entry.staging != Staging::Deleted)
            .map(|entry| entry.value.as_str())
            .collect()
    }

    /// Returns true if any bucket or index entry has an unsaved change.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.buckets.values().any(|b| b.staging.is_pending())
            || self.index_entries.values().any(|e| e.staging.is_pending())
    }

    /// Adds a new bucket.
    ///
    /// A bucket staged for removal is reinstated with `attributes` instead.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateBucket` if a live bucket for `name` exists, or
    /// `Validation` if `name` or the attributes are unusable.
    pub fn add_bucket(&mut self, name: &str, attributes: Attributes) -> CoreResult<()> {
        keys::validate_segment("bucket name", name)?;
        bucket::check_attributes(&attributes)?;

        if let Some(existing) = self.buckets.get_mut(name) {
            if existing.staging != Staging::Deleted {
                return Err(CoreError::DuplicateBucket {
                    name: name.to_string(),
                });
            }
            existing.attributes = Attributes::new();
            existing.merge(attributes);
            existing.staging = Staging::Updated;
            return Ok(());
        }

        let key = keys::bucket_key(&self.core.key, name);
        self.buckets
            .insert(name.to_string(), Bucket::added(key, name.to_string(), attributes));
        Ok(())
    }

    /// Merges `partial` onto the bucket for `name`, creating it if absent.
    ///
    /// Attributes whose new value is null are removed. A bucket staged for
    /// removal counts as absent: its old attributes are discarded.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `name` or the attributes are unusable.
    pub fn update_bucket(&mut self, name: &str, partial: Attributes) -> CoreResult<()> {
        keys::validate_segment("bucket name", name)?;
        bucket::check_attributes(&partial)?;

        match self.buckets.get_mut(name) {
            Some(existing) if existing.staging == Staging::Deleted => {
                existing.attributes = Attributes::new();
                existing.merge(partial);
                existing.staging = Staging::Updated;
            }
            Some(existing) => {
                existing.merge(partial);
                existing.mark_updated();
            }
            None => {
                let key = keys::bucket_key(&self.core.key, name);
                self.buckets
                    .insert(name.to_string(), Bucket::added(key, name.to_string(), partial));
            }
        }
        Ok(())
    }

    /// Like [`update_bucket`](Self::update_bucket) but never creates a bucket.
    ///
    /// # Errors
    ///
    /// Returns `MissingBucket` if there is no live bucket for `name`.
    pub fn update_existing_bucket(&mut self, name: &str, partial: Attributes) -> CoreResult<()> {
        let live = self
            .buckets
            .get(name)
            .is_some_and(|existing| existing.staging != Staging::Deleted);
        if !live {
            return Err(CoreError::MissingBucket {
                name: name.to_string(),
            });
        }
        self.update_bucket(name, partial)
    }

    /// Stages the bucket for `name` for removal.
    ///
    /// A bucket that was never persisted is dropped outright.
    ///
    /// # Errors
    ///
    /// Returns `MissingBucket` if there is no live bucket for `name`.
    pub fn remove_bucket(&mut self, name: &str) -> CoreResult<()> {
        let missing = || CoreError::MissingBucket {
            name: name.to_string(),
        };
        let staging = self.buckets.get(name).map(|b| b.staging).ok_or_else(missing)?;
        match staging {
            Staging::Added => {
                self.buckets.remove(name);
            }
            Staging::Deleted => return Err(missing()),
            Staging::Persisted | Staging::Updated => {
                if let Some(existing) = self.buckets.get_mut(name) {
                    existing.staging = Staging::Deleted;
                }
            }
        }
        Ok(())
    }

    /// Indexes the entity under `(name, value)`.
    ///
    /// Does nothing if either is empty or the entry already exists; an entry
    /// staged for removal is reinstated.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `name` or `value` contains a separator.
    pub fn add_search_key(&mut self, name: &str, value: &str) -> CoreResult<()> {
        if name.is_empty() || value.is_empty() {
            return Ok(());
        }
        keys::validate_segment("index name", name)?;
        keys::validate_segment("index value", value)?;

        let slot = keys::index_slot(name, value);
        if let Some(existing) = self.index_entries.get_mut(&slot) {
            if existing.staging == Staging::Deleted {
                existing.staging = Staging::Persisted;
            }
            return Ok(());
        }

        let entry = IndexEntry::added(
            keys::index_entry_key(&self.core.key, name, value),
            name.to_string(),
            value.to_string(),
            keys::index_marker_key(&self.prefix, name, value, &self.core.id),
        );
        self.index_entries.insert(slot, entry);
        Ok(())
    }

    /// Removes every index entry named `name`.
    ///
    /// Entries that were never persisted are dropped; the others are staged
    /// for removal.
    pub fn remove_search_key(&mut self, name: &str) {
        self.index_entries.retain(|_, entry| {
            if entry.name != name {
                return true;
            }
            if entry.staging == Staging::Added {
                return false;
            }
            entry.staging = Staging::Deleted;
            true
        });
    }
}
