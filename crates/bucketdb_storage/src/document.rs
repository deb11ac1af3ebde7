//! Document, revision and scan types shared by every store.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// An attribute map, the payload of every document.
pub type Attributes = Map<String, Value>;

/// Opaque revision token assigned by the store on every write.
///
/// Revisions have the form `<generation>-<tag>`. The generation grows by one
/// per write to the same key; the tag makes tokens unique across keys and
/// store instances. Callers must treat revisions as opaque and only compare
/// them for equality.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Wraps a revision string previously handed out by a store.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the first revision of a freshly written key.
    #[must_use]
    pub fn initial() -> Self {
        Self::with_generation(1)
    }

    /// Returns the revision that follows this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self::with_generation(self.generation() + 1)
    }

    /// Returns the write generation encoded in the token.
    ///
    /// Tokens that were not produced by this crate report generation 0.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.0
            .split_once('-')
            .and_then(|(generation, _)| generation.parse().ok())
            .unwrap_or(0)
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn with_generation(generation: u64) -> Self {
        let tag = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{generation}-{}", &tag[..16]))
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({})", self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document as written to or read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The document key.
    pub key: String,
    /// The revision this write is based on (writes) or the current revision (reads).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
    /// Whether this document is a tombstone.
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    /// The document payload.
    #[serde(default)]
    pub body: Attributes,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Document {
    /// Creates a new document with no revision.
    #[must_use]
    pub fn new(key: impl Into<String>, body: Attributes) -> Self {
        Self {
            key: key.into(),
            revision: None,
            deleted: false,
            body,
        }
    }

    /// Creates a document with an empty payload.
    #[must_use]
    pub fn empty(key: impl Into<String>) -> Self {
        Self::new(key, Attributes::new())
    }

    /// Creates a tombstone that deletes the document at `revision`.
    #[must_use]
    pub fn tombstone(key: impl Into<String>, revision: Revision) -> Self {
        Self {
            key: key.into(),
            revision: Some(revision),
            deleted: true,
            body: Attributes::new(),
        }
    }

    /// Sets the revision this write is based on.
    #[must_use]
    pub fn with_revision(mut self, revision: Option<Revision>) -> Self {
        self.revision = revision;
        self
    }
}

/// Bounds and options of a range scan.
///
/// Both bounds are inclusive. A descending scan walks down from `end`, so a
/// `limit` keeps the greatest keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    /// First key of the range.
    pub start: String,
    /// Last key of the range, or `None` for an open upper bound.
    pub end: Option<String>,
    /// Whether rows carry their documents.
    pub include_docs: bool,
    /// Whether rows are returned in descending key order.
    pub descending: bool,
    /// Maximum number of rows to return.
    pub limit: Option<usize>,
}

impl ScanRange {
    /// Creates a scan over `[start, end]`.
    #[must_use]
    pub fn new(start: impl Into<String>, end: Option<String>) -> Self {
        Self {
            start: start.into(),
            end,
            include_docs: false,
            descending: false,
            limit: None,
        }
    }

    /// Sets whether rows carry their documents.
    #[must_use]
    pub fn include_docs(mut self, value: bool) -> Self {
        self.include_docs = value;
        self
    }

    /// Sets whether rows are returned in descending key order.
    #[must_use]
    pub fn descending(mut self, value: bool) -> Self {
        self.descending = value;
        self
    }

    /// Caps the number of returned rows.
    #[must_use]
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Returns true if `key` falls inside the bounds.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        key >= self.start.as_str() && self.end.as_deref().map_or(true, |end| key <= end)
    }
}

/// One row of a range scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRow {
    /// The document key.
    pub key: String,
    /// The current revision.
    pub revision: Revision,
    /// The document, when the scan asked for it.
    pub doc: Option<Document>,
}

/// Outcome of one document in a bulk write.
#[derive(Debug)]
pub struct WriteResult {
    /// The key that was written.
    pub key: String,
    /// The new revision, or why this document was rejected.
    pub outcome: Result<Revision, StoreError>,
}

impl WriteResult {
    /// Returns true if the document was written.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}
