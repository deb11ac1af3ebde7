//! Named attribute partitions.

use super::Staging;
use crate::error::{CoreError, CoreResult};
use bucketdb_storage::{Attributes, Document, Revision};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body field holding a bucket's group name.
pub const STORE_FIELD: &str = "store";

/// A named, optional partition of an entity's attributes.
///
/// # Invariants
///
/// - A bucket staged [`Staging::Added`] has no revision
/// - Every other staging state has a revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub(crate) key: String,
    pub(crate) store: String,
    pub(crate) attributes: Attributes,
    pub(crate) revision: Option<Revision>,
    pub(crate) staging: Staging,
}

impl Bucket {
    pub(crate) fn added(key: String, store: String, attributes: Attributes) -> Self {
        Self {
            key,
            store,
            attributes: without_nulls(attributes),
            revision: None,
            staging: Staging::Added,
        }
    }

    /// Returns the storage key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the group name.
    #[must_use]
    pub fn store(&self) -> &str {
        &self.store
    }

    /// Returns the attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Returns one attribute.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    /// Returns the last persisted revision.
    #[must_use]
    pub fn revision(&self) -> Option<&Revision> {
        self.revision.as_ref()
    }

    /// Returns the staging state.
    #[must_use]
    pub fn staging(&self) -> Staging {
        self.staging
    }

    /// Merges `partial` onto the attributes; null values remove attributes.
    pub(crate) fn merge(&mut self, partial: Attributes) {
        for (name, value) in partial {
            if value.is_null() {
                self.attributes.remove(&name);
            } else {
                self.attributes.insert(name, value);
            }
        }
    }

    /// Marks the bucket locally modified unless it has never been persisted.
    pub(crate) fn mark_updated(&mut self) {
        if self.staging != Staging::Added {
            self.staging = Staging::Updated;
        }
    }

    pub(crate) fn to_document(&self) -> Document {
        let mut body = self.attributes.clone();
        body.insert(STORE_FIELD.to_string(), Value::from(self.store.clone()));
        Document::new(self.key.clone(), body).with_revision(self.revision.clone())
    }

    pub(crate) fn from_document(doc: Document) -> CoreResult<Self> {
        let mut attributes = doc.body;
        let store = match attributes.remove(STORE_FIELD) {
            Some(Value::String(store)) => store,
            _ => return Err(CoreError::malformed(&doc.key, "bucket has no store name")),
        };
        Ok(Self {
            key: doc.key,
            store,
            attributes,
            revision: doc.revision,
            staging: Staging::Persisted,
        })
    }
}

fn without_nulls(mut attributes: Attributes) -> Attributes {
    attributes.retain(|_, value| !value.is_null());
    attributes
}

/// Rejects attribute maps that use the reserved `store` field.
pub(crate) fn check_attributes(attributes: &Attributes) -> CoreResult<()> {
    if attributes.contains_key(STORE_FIELD) {
        return Err(CoreError::validation(format!(
            "attribute name `{STORE_FIELD}` is reserved"
        )));
    }
    Ok(())
}
