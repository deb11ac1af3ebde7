//! Device-local key/value settings.
//!
//! Settings live in the same document store as entities, under the `_local/`
//! prefix, one document per key holding a single `value` field. Writes are
//! read-modify-write against the current revision, so two writers racing on
//! the same key see a `Conflict` instead of silently overwriting each other.

use crate::error::{CoreError, CoreResult};
use bucketdb_storage::{Attributes, Document, DocumentStore, StoreError};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Key prefix of settings documents.
pub const SETTINGS_PREFIX: &str = "_local/";

const VALUE_FIELD: &str = "value";

/// Key/value settings backed by a document store.
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn DocumentStore>,
}

impl Settings {
    /// Creates a settings view over `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn key(name: &str) -> String {
        format!("{SETTINGS_PREFIX}{name}")
    }

    /// Returns true if a value is stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails for any reason other than a missing key.
    pub async fn exists(&self, name: &str) -> CoreResult<bool> {
        match self.store.get(&Self::key(name)).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns the value stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing is stored under `name`.
    pub async fn get(&self, name: &str) -> CoreResult<Value> {
        let key = Self::key(name);
        let mut doc = self.store.get(&key).await?;
        doc.body
            .remove(VALUE_FIELD)
            .ok_or_else(|| CoreError::malformed(key, "setting has no value"))
    }

    /// Returns the value stored under `name`, or `default` if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails for any reason other than a missing key.
    pub async fn get_or(&self, name: &str, default: Value) -> CoreResult<Value> {
        match self.get(name).await {
            Err(CoreError::NotFound { .. }) => Ok(default),
            other => other,
        }
    }

    /// Stores `value` under `name`, creating or replacing it.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if another writer changed the key between the read
    /// and the write.
    pub async fn set(&self, name: &str, value: Value) -> CoreResult<Value> {
        let key = Self::key(name);
        let revision = match self.store.get(&key).await {
            Ok(current) => current.revision,
            Err(StoreError::NotFound { .. }) => None,
            Err(err) => return Err(err.into()),
        };

        let mut body = Attributes::new();
        body.insert(VALUE_FIELD.to_string(), value.clone());
        self.store
            .put(Document::new(key.as_str(), body).with_revision(revision))
            .await?;
        debug!(setting = %name, "stored setting");
        Ok(value)
    }

    /// Removes the value stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing is stored under `name`.
    pub async fn remove(&self, name: &str) -> CoreResult<()> {
        let key = Self::key(name);
        let current = self.store.get(&key).await?;
        let revision = current
            .revision
            .ok_or_else(|| CoreError::malformed(&key, "setting has no revision"))?;
        self.store.put(Document::tombstone(key, revision)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings").finish_non_exhaustive()
    }
}
