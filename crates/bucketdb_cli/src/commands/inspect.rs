//! Inspect command implementation.

use bucketdb_core::keys::{self, KeyKind};
use bucketdb_core::{Document, FileDocumentStore, SETTINGS_PREFIX};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Document counts of one collection.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct InspectResult {
    /// Store file path.
    pub path: String,
    /// Collection prefix.
    pub prefix: String,
    /// Number of core records.
    pub entities: usize,
    /// Number of buckets.
    pub buckets: usize,
    /// Number of index entries.
    pub index_entries: usize,
    /// Number of index markers.
    pub index_markers: usize,
    /// Number of settings.
    pub settings: usize,
    /// Number of deleted documents still in the file.
    pub tombstones: usize,
    /// Live documents outside the collection.
    pub other: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, prefix: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No store found at {}", path.display()).into());
    }
    let store = FileDocumentStore::open(path)?;
    let mut result = analyze(&store.inner().documents(), prefix);
    result.path = path.display().to_string();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }
    Ok(())
}

/// Classifies every document of a store snapshot.
pub fn analyze(documents: &[Document], prefix: &str) -> InspectResult {
    let mut result = InspectResult {
        prefix: prefix.to_string(),
        ..InspectResult::default()
    };
    let namespace = format!("{prefix}{}", keys::SEPARATOR);

    let cores: BTreeSet<&str> = documents
        .iter()
        .filter(|doc| !doc.deleted)
        .map(|doc| doc.key.as_str())
        .filter(|key| {
            key.strip_prefix(namespace.as_str())
                .and_then(|id| id.strip_suffix(keys::SEPARATOR))
                .is_some_and(|id| !id.is_empty() && !id.contains(keys::SEPARATOR))
        })
        .collect();

    for doc in documents {
        if doc.deleted {
            result.tombstones += 1;
            continue;
        }
        let key = doc.key.as_str();
        if key.starts_with(SETTINGS_PREFIX) {
            result.settings += 1;
            continue;
        }
        let owner = cores
            .range(..=key)
            .next_back()
            .filter(|core| key.starts_with(**core));
        match owner {
            Some(core) => match KeyKind::classify(core, key) {
                KeyKind::Core => result.entities += 1,
                KeyKind::Bucket => result.buckets += 1,
                KeyKind::IndexEntry => result.index_entries += 1,
            },
            None if key.starts_with(namespace.as_str()) => result.index_markers += 1,
            None => result.other += 1,
        }
    }
    result
}

fn print_text_output(result: &InspectResult) {
    println!("bucketdb Store Inspection");
    println!("=========================");
    println!();
    println!("Path:   {}", result.path);
    println!("Prefix: {}", result.prefix);
    println!();
    println!("Collection:");
    println!("  Entities:      {}", result.entities);
    println!("  Buckets:       {}", result.buckets);
    println!("  Index entries: {}", result.index_entries);
    println!("  Index markers: {}", result.index_markers);
    println!();
    println!("Store:");
    println!("  Settings:      {}", result.settings);
    println!("  Tombstones:    {}", result.tombstones);
    println!("  Other:         {}", result.other);
}
