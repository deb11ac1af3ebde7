//! CLI command implementations.

pub mod find;
pub mod get;
pub mod insert;
pub mod inspect;
pub mod remove;

use crate::IdStrategy;
use bucketdb_core::{
    Attributes, AutoIncrementGenerator, DateIdGenerator, DocumentStore, EntityRecord, EntityStore,
    FileDocumentStore, IdGenerator, Settings, Staging, StoreConfig, UuidIdGenerator,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors in command-line input.
#[derive(Debug, Error)]
pub enum CliError {
    /// The command needs `--path`.
    #[error("store path required for {0}")]
    MissingPath(&'static str),

    /// An argument is not `key=value`.
    #[error("invalid assignment `{0}`, expected key=value")]
    Assignment(String),

    /// A bucket argument is not `group.key=value`.
    #[error("invalid bucket assignment `{0}`, expected group.key=value")]
    BucketAssignment(String),
}

/// Opens the store file at `path` as collection `prefix`.
pub fn open_store(
    path: &Path,
    prefix: &str,
    ids: IdStrategy,
) -> Result<EntityStore, Box<dyn std::error::Error>> {
    let docs: Arc<dyn DocumentStore> = Arc::new(FileDocumentStore::open_with_create_dirs(path)?);
    let ids: Arc<dyn IdGenerator> = match ids {
        IdStrategy::Date => Arc::new(DateIdGenerator::new()),
        IdStrategy::Uuid => Arc::new(UuidIdGenerator),
        IdStrategy::Auto => Arc::new(AutoIncrementGenerator::new(prefix, Settings::new(docs.clone()))),
    };
    Ok(EntityStore::new(docs, prefix, ids, StoreConfig::default())?)
}

/// Splits `key=value`; the value is read as JSON and falls back to a string.
pub fn parse_assignment(arg: &str) -> Result<(String, Value), CliError> {
    let (key, raw) = arg
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| CliError::Assignment(arg.to_string()))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
    Ok((key.to_string(), value))
}

/// Splits `group.key=value` into the group and the assignment.
pub fn parse_bucket_assignment(arg: &str) -> Result<(String, String, Value), CliError> {
    let (target, _) = arg
        .split_once('=')
        .ok_or_else(|| CliError::BucketAssignment(arg.to_string()))?;
    let (group, _) = target
        .split_once('.')
        .filter(|(group, key)| !group.is_empty() && !key.is_empty())
        .ok_or_else(|| CliError::BucketAssignment(arg.to_string()))?;
    let (key, value) = parse_assignment(&arg[group.len() + 1..])?;
    Ok((group.to_string(), key, value))
}

/// JSON shape of an entity printed by the CLI.
#[derive(Debug, Serialize)]
pub struct EntityView {
    /// Entity id.
    pub id: String,
    /// Creation time in milliseconds since the epoch.
    pub created_at: u64,
    /// Core attributes.
    pub core: Attributes,
    /// Bucket attributes by group.
    pub buckets: BTreeMap<String, Attributes>,
    /// Indexed values by index name.
    pub index: BTreeMap<String, Vec<String>>,
}

impl From<&EntityRecord> for EntityView {
    fn from(record: &EntityRecord) -> Self {
        let buckets = record
            .buckets()
            .filter(|bucket| bucket.staging() != Staging::Deleted)
            .map(|bucket| (bucket.store().to_string(), bucket.attributes().clone()))
            .collect();
        let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in record.index_entries() {
            if entry.staging() != Staging::Deleted {
                index
                    .entry(entry.name().to_string())
                    .or_default()
                    .push(entry.value().to_string());
            }
        }
        Self {
            id: record.id().to_string(),
            created_at: record.core().created_at(),
            core: record.core().attributes().clone(),
            buckets,
            index,
        }
    }
}

/// Prints `value` as pretty JSON on stdout.
pub fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketdb_core::IndexSpec;
    use serde_json::json;

    #[test]
    fn assignments_parse_json_values() {
        assert_eq!(parse_assignment("n=5").unwrap(), ("n".into(), json!(5)));
        assert_eq!(parse_assignment("ok=true").unwrap(), ("ok".into(), json!(true)));
        assert_eq!(
            parse_assignment("name=New One").unwrap(),
            ("name".into(), json!("New One"))
        );
        assert_eq!(parse_assignment("eq=a=b").unwrap(), ("eq".into(), json!("a=b")));
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn bucket_assignments_need_a_group() {
        assert_eq!(
            parse_bucket_assignment("address.street=Orchard St.").unwrap(),
            ("address".into(), "street".into(), json!("Orchard St."))
        );
        assert!(parse_bucket_assignment("street=x").is_err());
        assert!(parse_bucket_assignment(".street=x").is_err());
        assert!(parse_bucket_assignment("address.=x").is_err());
    }

    #[tokio::test]
    async fn view_hides_nothing_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir.path().join("s.json"), "users", IdStrategy::Auto).unwrap();
        let record = store
            .insert(
                json!({"name": "A"}).as_object().cloned().unwrap(),
                vec![("address".into(), json!({"street": "x"}).as_object().cloned().unwrap())],
                vec![IndexSpec::new("tag", "a"), IndexSpec::new("tag", "b")],
            )
            .await
            .unwrap();

        let view = EntityView::from(&record);
        assert_eq!(view.id, "000000001000");
        assert_eq!(view.core["name"], json!("A"));
        assert_eq!(view.buckets["address"]["street"], json!("x"));
        assert_eq!(view.index["tag"], vec!["a", "b"]);
    }
}
