//! # bucketdb Core
//!
//! Entity storage on top of an ordered document store.
//!
//! An entity is split into several documents that share a key prefix:
//! - a core record holding the id, creation time and mandatory attributes
//! - buckets, named partitions of optional attributes
//! - index entries and index markers, the secondary index
//!
//! Callers load an entity into an [`EntityRecord`], stage changes on it in
//! memory, and then [`save`](EntityStore::save) or
//! [`rollback`](EntityStore::rollback) it. Saving writes only what changed, in
//! a single bulk write, and reports the documents the store rejected.
//!
//! This crate provides:
//! - Key derivation ([`keys`])
//! - The staging model ([`EntityRecord`], [`Bucket`], [`IndexEntry`])
//! - Persistence and index lookups ([`EntityStore`])
//! - Id strategies ([`IdGenerator`])
//! - Device-local settings ([`Settings`])
//! - A schema-driven mapping layer ([`Schema`], [`Collection`])

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod error;
mod id;
pub mod keys;
mod reconcile;
mod record;
mod schema;
mod settings;
mod store;

pub use collection::Collection;
pub use config::StoreConfig;
pub use error::{CoreError, CoreResult, WriteFailure};
pub use id::{AutoIncrementGenerator, DateIdGenerator, IdGenerator, UuidIdGenerator};
pub use reconcile::RevisionReconciler;
pub use record::{
    Bucket, CoreRecord, EntityRecord, IndexEntry, Staging, CREATED_AT_FIELD, ID_FIELD, STORE_FIELD,
};
pub use schema::{Derivation, FieldDef, Resolved, Schema, SchemaBuilder, Validator, DEFAULT_GROUP};
pub use settings::{Settings, SETTINGS_PREFIX};
pub use store::{EntityStore, FindOptions, IndexMatch, IndexSpec};

pub use bucketdb_storage::{
    Attributes, Document, DocumentStore, FileDocumentStore, InMemoryDocumentStore, Revision,
    StoreError, StoreOperation,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
