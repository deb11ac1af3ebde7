//! Find command implementation.

use super::{print_json, EntityView};
use bucketdb_core::{EntityStore, FindOptions};
use tracing::debug;

/// Runs the find command.
pub async fn run(
    store: &EntityStore,
    name: &str,
    value: &str,
    options: FindOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    debug!(?options, "finding entities");
    let records = store.find_by_key(name, value, options).await?;
    let views: Vec<EntityView> = records.iter().map(EntityView::from).collect();
    print_json(&views)
}
