//! # bucketdb Storage
//!
//! The ordered document store that bucketdb builds on.
//!
//! A document store keeps JSON documents under string keys, in key order, and
//! hands out an opaque [`Revision`] on every write. Writes that name a stale
//! revision are rejected with [`StoreError::Conflict`], which is the only
//! concurrency control the store offers. There are no multi-document
//! transactions: a bulk write reports one outcome per document and may land
//! partially.
//!
//! ## Design Principles
//!
//! - Documents are opaque attribute maps; the store never interprets them
//! - Keys are ordered byte-wise so prefix scans group related documents
//! - Deletes are writes of a tombstone carrying the current revision
//! - Stores must be `Send + Sync` and are shared behind an `Arc`
//!
//! ## Available Stores
//!
//! - [`InMemoryDocumentStore`] - For testing and ephemeral data
//! - [`FileDocumentStore`] - Persists a JSON snapshot after every write
//!
//! ## Example
//!
//! ```rust
//! use bucketdb_storage::{Document, DocumentStore, InMemoryDocumentStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = InMemoryDocumentStore::new();
//! let rev = store.put(Document::empty("post/1/")).await.unwrap();
//! let doc = store.get("post/1/").await.unwrap();
//! assert_eq!(doc.revision, Some(rev));
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod document;
mod error;
mod file;
mod memory;

pub use backend::DocumentStore;
pub use document::{Attributes, Document, Revision, ScanRange, ScanRow, WriteResult};
pub use error::{StoreError, StoreResult};
pub use file::FileDocumentStore;
pub use memory::{InMemoryDocumentStore, StoreOperation};
