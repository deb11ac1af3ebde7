//! Document store trait definition.

use crate::document::{Document, Revision, ScanRange, ScanRow, WriteResult};
use crate::error::StoreResult;
use async_trait::async_trait;

/// An ordered document store with per-document optimistic concurrency.
///
/// # Invariants
///
/// - Keys are ordered byte-wise; range scans return keys in that order
/// - Every successful write returns a fresh [`Revision`]
/// - A write based on a stale revision fails with `Conflict`
/// - Tombstones are invisible to `get` and `range_scan`
/// - `bulk_write` is not atomic: each document succeeds or fails on its own
///
/// # Implementors
///
/// - [`super::InMemoryDocumentStore`] - For testing
/// - [`super::FileDocumentStore`] - For persistent storage
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads the live document at `key`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no live document exists at `key`.
    async fn get(&self, key: &str) -> StoreResult<Document>;

    /// Writes one document.
    ///
    /// A document without a revision creates the key (or revives a
    /// tombstone); a document with a revision replaces the document at exactly
    /// that revision. Setting `deleted` turns the write into a delete.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the supplied revision is not the current one.
    async fn put(&self, doc: Document) -> StoreResult<Revision>;

    /// Writes many documents, reporting one outcome per document in input order.
    ///
    /// # Errors
    ///
    /// Returns an error only if the call as a whole could not be serviced;
    /// per-document rejections are reported inside the results.
    async fn bulk_write(&self, docs: Vec<Document>) -> StoreResult<Vec<WriteResult>>;

    /// Returns the live documents whose keys fall inside `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan could not be serviced.
    async fn range_scan(&self, range: ScanRange) -> StoreResult<Vec<ScanRow>>;
}
