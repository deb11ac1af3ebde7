//! Insert command implementation.

use super::{parse_assignment, parse_bucket_assignment, print_json, CliError, EntityView};
use bucketdb_core::{Attributes, EntityStore, IndexSpec};
use std::collections::BTreeMap;
use tracing::info;

/// Parsed `insert` arguments.
#[derive(Debug, Default, PartialEq)]
pub struct InsertArgs {
    /// Core attributes.
    pub core: Attributes,
    /// Bucket attributes by group, in group order.
    pub buckets: Vec<(String, Attributes)>,
    /// Index values.
    pub index_specs: Vec<IndexSpec>,
}

impl InsertArgs {
    /// Parses the repeated `--core`, `--bucket` and `--index` arguments.
    pub fn parse(core: &[String], bucket: &[String], index: &[String]) -> Result<Self, CliError> {
        let mut args = Self::default();
        for arg in core {
            let (key, value) = parse_assignment(arg)?;
            args.core.insert(key, value);
        }

        let mut groups: BTreeMap<String, Attributes> = BTreeMap::new();
        for arg in bucket {
            let (group, key, value) = parse_bucket_assignment(arg)?;
            groups.entry(group).or_default().insert(key, value);
        }
        args.buckets = groups.into_iter().collect();

        for arg in index {
            let (name, value) = arg
                .split_once('=')
                .ok_or_else(|| CliError::Assignment(arg.clone()))?;
            args.index_specs.push(IndexSpec::new(name, value));
        }
        Ok(args)
    }
}

/// Runs the insert command.
pub async fn run(
    store: &EntityStore,
    core: &[String],
    bucket: &[String],
    index: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let args = InsertArgs::parse(core, bucket, index)?;
    let record = store
        .insert(args.core, args.buckets, args.index_specs)
        .await?;
    info!(id = %record.id(), "inserted entity");
    print_json(&EntityView::from(&record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn groups_bucket_assignments() {
        let args = InsertArgs::parse(
            &strings(&["name=A"]),
            &strings(&["address.street=x", "profile.age=3", "address.num=5"]),
            &strings(&["tag=rust", "tag=db"]),
        )
        .unwrap();

        assert_eq!(args.core["name"], json!("A"));
        let groups: Vec<_> = args.buckets.iter().map(|(g, _)| g.as_str()).collect();
        assert_eq!(groups, vec!["address", "profile"]);
        assert_eq!(args.buckets[0].1["num"], json!(5));
        assert_eq!(
            args.index_specs,
            vec![IndexSpec::new("tag", "rust"), IndexSpec::new("tag", "db")]
        );
    }

    #[test]
    fn rejects_malformed_index() {
        assert!(InsertArgs::parse(&[], &[], &strings(&["tag"])).is_err());
    }
}
