//! Get command implementation.

use super::{print_json, EntityView};
use bucketdb_core::EntityStore;

/// Runs the get command.
pub async fn run(store: &EntityStore, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let record = store.get_by_id(id).await?;
    print_json(&EntityView::from(&record))
}
