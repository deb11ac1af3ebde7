//! Schema-driven access to one collection.

use crate::error::{CoreError, CoreResult};
use crate::record::{EntityRecord, Staging};
use crate::schema::Schema;
use crate::store::{EntityStore, FindOptions};
use bucketdb_storage::Attributes;
use serde_json::Value;
use std::collections::BTreeMap;

/// An [`EntityStore`] paired with the [`Schema`] of its entities.
///
/// Callers hand in flat field/value maps; the schema decides which fields go
/// to the core record, which to buckets, and which index values to keep.
#[derive(Debug)]
pub struct Collection {
    store: EntityStore,
    schema: Schema,
}

impl Collection {
    /// Creates a collection.
    pub fn new(store: EntityStore, schema: Schema) -> Self {
        Self { store, schema }
    }

    /// Returns the entity store.
    #[must_use]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Creates an entity from `data`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `data` doesn't fit the schema, and any error
    /// of [`EntityStore::insert`].
    pub async fn insert(&self, data: Attributes) -> CoreResult<EntityRecord> {
        let resolved = self.schema.resolve(&data)?;
        self.store
            .insert(resolved.core, resolved.buckets, resolved.index_specs)
            .await
    }

    /// Loads the entity `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such entity.
    pub async fn get(&self, id: &str) -> CoreResult<EntityRecord> {
        self.store.get_by_id(id).await
    }

    /// Loads the entities whose indexed `field` matches `value`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `field` isn't an indexed field, and any error
    /// of [`EntityStore::find_by_key`].
    pub async fn find(
        &self,
        field: &str,
        value: &str,
        options: FindOptions,
    ) -> CoreResult<Vec<EntityRecord>> {
        match self.schema.field(field) {
            Some(def) if def.is_indexed() => self.store.find_by_key(field, value, options).await,
            _ => Err(CoreError::validation(format!("field `{field}` is not indexed"))),
        }
    }

    /// Applies `data` to `record` and saves it.
    ///
    /// Mandatory fields are written to the core record, optional ones merged
    /// into their buckets, and the index values of every touched indexed
    /// field are derived again. A null value clears an optional field.
    /// `record` is left unchanged if validation or the core write fails.
    ///
    /// # Errors
    ///
    /// - `Validation` for unknown fields, rejected values, or null mandatory
    ///   fields
    /// - `MissingBucket` with [`StoreConfig::strict_update`](crate::StoreConfig::strict_update)
    ///   when a field's bucket doesn't exist
    /// - `Conflict` if the core record changed since it was loaded
    /// - any error of [`EntityStore::save`]
    pub async fn update(&self, record: &mut EntityRecord, data: Attributes) -> CoreResult<()> {
        let mut core = Attributes::new();
        let mut groups: BTreeMap<String, Attributes> = BTreeMap::new();
        let mut reindex: Vec<(String, Vec<String>)> = Vec::new();

        for (name, value) in data {
            let field = self
                .schema
                .field(&name)
                .ok_or_else(|| CoreError::validation(format!("unknown field `{name}`")))?;
            if value.is_null() {
                if field.is_mandatory() {
                    return Err(CoreError::validation(format!(
                        "mandatory field `{name}` cannot be cleared"
                    )));
                }
            } else {
                field.check(&value)?;
            }
            if field.is_indexed() {
                reindex.push((name.clone(), field.index_values(&value)));
            }
            if field.is_mandatory() {
                core.insert(name, value);
            } else {
                groups
                    .entry(field.group_name().to_string())
                    .or_default()
                    .insert(name, value);
            }
        }

        let mut staged = record.clone();
        for (group, partial) in groups {
            if self.store.config().strict_update {
                staged.update_existing_bucket(&group, partial)?;
            } else {
                staged.update_bucket(&group, partial)?;
            }
        }
        for (name, values) in reindex {
            staged.remove_search_key(&name);
            for value in values {
                staged.add_search_key(&name, &value)?;
            }
        }

        if !core.is_empty() {
            self.store.update_core(&mut staged, core).await?;
        }
        let saved = self.store.save(&mut staged).await;
        *record = staged;
        saved
    }

    /// Deletes `record`.
    ///
    /// # Errors
    ///
    /// Any error of [`EntityStore::remove`].
    pub async fn remove(&self, record: &EntityRecord) -> CoreResult<()> {
        self.store.remove(record).await
    }

    /// Returns the current value of `field` on `record`.
    #[must_use]
    pub fn value<'a>(&self, record: &'a EntityRecord, field: &str) -> Option<&'a Value> {
        let def = self.schema.field(field)?;
        if def.is_mandatory() {
            return record.core().attributes().get(field);
        }
        record
            .bucket(def.group_name())
            .filter(|bucket| bucket.staging() != Staging::Deleted)
            .and_then(|bucket| bucket.get(field))
    }
}
