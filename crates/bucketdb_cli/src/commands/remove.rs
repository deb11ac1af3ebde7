//! Remove command implementation.

use super::print_json;
use bucketdb_core::EntityStore;
use serde_json::json;
use tracing::info;

/// Runs the remove command.
pub async fn run(store: &EntityStore, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let record = store.get_by_id(id).await?;
    store.remove(&record).await?;
    info!(id, "removed entity");
    print_json(&json!({ "removed": id }))
}
