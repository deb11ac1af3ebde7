//! Secondary-index pointers.

use super::Staging;
use crate::error::{CoreError, CoreResult};
use bucketdb_storage::{Attributes, Document, Revision};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const NAME_FIELD: &str = "key";
const VALUE_FIELD: &str = "value";
const REF_FIELD: &str = "ref";

/// A pointer from one `(index name, value)` pair to its entity.
///
/// The entry itself lives under the entity's core key. Its companion index
/// marker, an empty document at [`IndexEntry::reference`], lives in the
/// collection's index namespace where lookups scan for it.
///
/// An entry staged [`Staging::Updated`] is stored but its marker is not; the
/// next save writes the marker again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub(crate) key: String,
    pub(crate) name: String,
    pub(crate) value: String,
    pub(crate) reference: String,
    pub(crate) revision: Option<Revision>,
    pub(crate) staging: Staging,
}

impl IndexEntry {
    pub(crate) fn added(key: String, name: String, value: String, reference: String) -> Self {
        Self {
            key,
            name,
            value,
            reference,
            revision: None,
            staging: Staging::Added,
        }
    }

    /// Returns the storage key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the indexed value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the key of the index marker.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
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

    pub(crate) fn to_document(&self) -> Document {
        let mut body = Attributes::new();
        body.insert(NAME_FIELD.to_string(), Value::from(self.name.clone()));
        body.insert(VALUE_FIELD.to_string(), Value::from(self.value.clone()));
        body.insert(REF_FIELD.to_string(), Value::from(self.reference.clone()));
        Document::new(self.key.clone(), body).with_revision(self.revision.clone())
    }

    pub(crate) fn marker_document(&self) -> Document {
        Document::empty(self.reference.clone())
    }

    pub(crate) fn from_document(doc: Document) -> CoreResult<Self> {
        let field = |name: &str| match doc.body.get(name) {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(CoreError::malformed(
                &doc.key,
                format!("index entry has no `{name}`"),
            )),
        };
        let name = field(NAME_FIELD)?;
        let value = field(VALUE_FIELD)?;
        let reference = field(REF_FIELD)?;
        Ok(Self {
            key: doc.key,
            name,
            value,
            reference,
            revision: doc.revision,
            staging: Staging::Persisted,
        })
    }
}
