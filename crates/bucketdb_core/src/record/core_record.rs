//! The core record of an entity.

use crate::error::{CoreError, CoreResult};
use bucketdb_storage::{Attributes, Document, Revision};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body field holding the entity id.
pub const ID_FIELD: &str = "id";

/// Body field holding the creation time in milliseconds since the epoch.
pub const CREATED_AT_FIELD: &str = "created_at";

/// The mandatory root document of an entity.
///
/// Exactly one core record exists per live entity. It is written at insert
/// time and never recreated; mandatory attributes are inlined in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreRecord {
    pub(crate) key: String,
    pub(crate) id: String,
    pub(crate) created_at: u64,
    pub(crate) attributes: Attributes,
    pub(crate) revision: Option<Revision>,
}

impl CoreRecord {
    pub(crate) fn new(key: String, id: String, created_at: u64, attributes: Attributes) -> Self {
        Self {
            key,
            id,
            created_at,
            attributes,
            revision: None,
        }
    }

    /// Returns the storage key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the entity id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the creation time in milliseconds since the epoch.
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Returns the mandatory attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Returns the last persisted revision.
    #[must_use]
    pub fn revision(&self) -> Option<&Revision> {
        self.revision.as_ref()
    }

    pub(crate) fn to_document(&self) -> Document {
        let mut body = self.attributes.clone();
        body.insert(ID_FIELD.to_string(), Value::from(self.id.clone()));
        body.insert(CREATED_AT_FIELD.to_string(), Value::from(self.created_at));
        Document::new(self.key.clone(), body).with_revision(self.revision.clone())
    }

    pub(crate) fn from_document(doc: Document) -> CoreResult<Self> {
        let mut attributes = doc.body;
        let id = match attributes.remove(ID_FIELD) {
            Some(Value::String(id)) => id,
            _ => return Err(CoreError::malformed(&doc.key, "core record has no id")),
        };
        let created_at = attributes
            .remove(CREATED_AT_FIELD)
            .and_then(|value| value.as_u64())
            .ok_or_else(|| CoreError::malformed(&doc.key, "core record has no creation time"))?;
        Ok(Self {
            key: doc.key,
            id,
            created_at,
            attributes,
            revision: doc.revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_roundtrip_strips_reserved_fields() {
        let attrs = json!({"name": "A"}).as_object().cloned().unwrap();
        let core = CoreRecord::new("post/1/".into(), "1".into(), 1_700_000_000_000, attrs.clone());

        let mut doc = core.to_document();
        assert_eq!(doc.body["id"], json!("1"));
        assert_eq!(doc.body["created_at"], json!(1_700_000_000_000u64));

        doc.revision = Some(Revision::initial());
        let decoded = CoreRecord::from_document(doc).unwrap();
        assert_eq!(decoded.attributes(), &attrs);
        assert_eq!(decoded.id(), "1");
        assert!(decoded.revision().is_some());
    }

    #[test]
    fn document_without_id_is_malformed() {
        let doc = Document::new("post/1/", json!({"created_at": 1}).as_object().cloned().unwrap());
        assert!(matches!(
            CoreRecord::from_document(doc),
            Err(CoreError::MalformedDocument { .. })
        ));
    }
}
