//! Mapping bulk-write outcomes back onto an entity record.

use crate::error::{CoreError, CoreResult, WriteFailure};
use crate::record::{EntityRecord, Staging};
use bucketdb_storage::{Revision, StoreError, WriteResult};
use std::collections::HashMap;

/// Matches bulk-write results to the sub-records that produced them.
///
/// Results are indexed once by key; [`apply`](Self::apply) then walks the
/// record and moves every sub-record whose writes all landed to its next
/// staging state. Sub-records with a rejected write keep their staging state,
/// so saving the record again resends only what is missing.
#[derive(Debug)]
pub struct RevisionReconciler {
    revisions: HashMap<String, Revision>,
    failures: HashMap<String, StoreError>,
    total: usize,
}

impl RevisionReconciler {
    /// Indexes the outcomes of one bulk write.
    pub fn new(results: Vec<WriteResult>) -> Self {
        let total = results.len();
        let mut revisions = HashMap::with_capacity(total);
        let mut failures = HashMap::new();
        for result in results {
            match result.outcome {
                Ok(revision) => {
                    revisions.insert(result.key, revision);
                }
                Err(error) => {
                    failures.insert(result.key, error);
                }
            }
        }
        Self {
            revisions,
            failures,
            total,
        }
    }

    /// Returns the new revision of `key`, if it was written.
    #[must_use]
    pub fn revision(&self, key: &str) -> Option<&Revision> {
        self.revisions.get(key)
    }

    /// Returns true if no write was rejected.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn was_written(&self, key: &str) -> bool {
        self.revisions.contains_key(key) || self.failures.contains_key(key)
    }

    /// An index marker has an empty payload, so a marker that already exists
    /// is as good as one just written.
    fn marker_exists(&self, key: &str) -> bool {
        self.revisions.contains_key(key)
            || matches!(self.failures.get(key), Some(StoreError::Conflict { .. }))
    }

    /// Assigns revisions and advances staging states on `record`.
    pub fn apply(&mut self, record: &mut EntityRecord) {
        if let Some(revision) = self.revisions.get(&record.core.key) {
            record.core.revision = Some(revision.clone());
        }

        record.buckets.retain(|_, bucket| {
            let Some(revision) = self.revisions.get(&bucket.key) else {
                return true;
            };
            if bucket.staging == Staging::Deleted {
                return false;
            }
            bucket.revision = Some(revision.clone());
            bucket.staging = Staging::Persisted;
            true
        });

        let mut existing_markers = Vec::new();
        record.index_entries.retain(|_, entry| match entry.staging {
            Staging::Added | Staging::Updated => {
                let marker_exists = self.marker_exists(&entry.reference);
                if marker_exists && self.failures.contains_key(&entry.reference) {
                    existing_markers.push(entry.reference.clone());
                }
                if let Some(revision) = self.revisions.get(&entry.key) {
                    entry.revision = Some(revision.clone());
                    entry.staging = if marker_exists {
                        Staging::Persisted
                    } else {
                        Staging::Updated
                    };
                }
                true
            }
            Staging::Deleted => {
                let marker_done = !self.was_written(&entry.reference)
                    || self.revisions.contains_key(&entry.reference);
                match self.revisions.get(&entry.key) {
                    Some(_) if marker_done => false,
                    Some(revision) => {
                        entry.revision = Some(revision.clone());
                        true
                    }
                    None => true,
                }
            }
            Staging::Persisted => true,
        });

        for key in existing_markers {
            self.failures.remove(&key);
        }
    }

    /// Converts the remaining rejections into an error.
    ///
    /// # Errors
    ///
    /// Returns `PartialWrite` listing every rejected document.
    pub fn finish(self) -> CoreResult<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        let mut failures: Vec<WriteFailure> = self
            .failures
            .into_iter()
            .map(|(key, error)| WriteFailure { key, error })
            .collect();
        failures.sort_by(|a, b| a.key.cmp(&b.key));
        Err(CoreError::PartialWrite {
            failures,
            total: self.total,
        })
    }
}
