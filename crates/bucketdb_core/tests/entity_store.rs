//! Integration tests for entity persistence, staging and index lookups.

use bucketdb_core::{
    Attributes, AutoIncrementGenerator, CoreError, Document, DocumentStore, EntityRecord,
    EntityStore, FileDocumentStore, FindOptions, InMemoryDocumentStore, IndexSpec, Settings,
    Staging, StoreConfig, StoreOperation,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().unwrap()
}

fn setup() -> (Arc<InMemoryDocumentStore>, EntityStore) {
    setup_with(StoreConfig::default())
}

fn setup_with(config: StoreConfig) -> (Arc<InMemoryDocumentStore>, EntityStore) {
    let docs = Arc::new(InMemoryDocumentStore::new());
    let ids = AutoIncrementGenerator::new("p", Settings::new(docs.clone()));
    let store = EntityStore::new(docs.clone(), "p", Arc::new(ids), config).unwrap();
    (docs, store)
}

async fn insert_sample(store: &EntityStore) -> EntityRecord {
    store
        .insert(
            attrs(json!({"name": "A"})),
            vec![("g".into(), attrs(json!({"addr": "x"})))],
            vec![IndexSpec::new("k", "v1")],
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn get_by_id_returns_what_was_inserted() {
    let (_, store) = setup();
    let inserted = insert_sample(&store).await;
    assert_eq!(inserted.id(), "000000001000");

    let loaded = store.get_by_id(inserted.id()).await.unwrap();
    assert_eq!(loaded.core().attributes(), &attrs(json!({"name": "A"})));
    let buckets: Vec<_> = loaded.buckets().map(|b| b.store()).collect();
    assert_eq!(buckets, vec!["g"]);
    assert_eq!(loaded.bucket("g").unwrap().attributes(), &attrs(json!({"addr": "x"})));
    assert_eq!(loaded.index_values("k"), vec!["v1"]);
    assert_eq!(loaded, inserted);
}

#[tokio::test]
async fn save_reflects_every_staged_change() {
    let (docs, store) = setup();
    let mut record = store
        .insert(
            Attributes::new(),
            vec![
                ("keep".into(), attrs(json!({"a": 1}))),
                ("drop".into(), attrs(json!({"b": 2}))),
            ],
            Vec::new(),
        )
        .await
        .unwrap();

    record.update_bucket("keep", attrs(json!({"a": 10, "c": 3}))).unwrap();
    record.add_bucket("new", attrs(json!({"d": 4}))).unwrap();
    record.remove_bucket("drop").unwrap();
    record.add_search_key("tag", "x").unwrap();
    store.save(&mut record).await.unwrap();

    assert!(!record.has_pending_changes());
    assert!(record.bucket("drop").is_none());

    let loaded = store.get_by_id(record.id()).await.unwrap();
    assert_eq!(loaded, record);
    assert_eq!(loaded.bucket("keep").unwrap().attributes(), &attrs(json!({"a": 10, "c": 3})));
    assert_eq!(
        loaded.bucket("keep").unwrap().revision().unwrap().generation(),
        2
    );

    // A second save has nothing to write.
    docs.fail_operation(StoreOperation::BulkWrite);
    store.save(&mut record).await.unwrap();
}

#[tokio::test]
async fn rollback_restores_last_saved_bucket() {
    let (_, store) = setup();
    let mut record = store
        .insert(Attributes::new(), Vec::new(), Vec::new())
        .await
        .unwrap();

    record.add_bucket("g", attrs(json!({"v": 1}))).unwrap();
    store.save(&mut record).await.unwrap();

    record.update_bucket("g", attrs(json!({"v": 2}))).unwrap();
    record.add_bucket("fresh", Attributes::new()).unwrap();
    record.add_search_key("tag", "x").unwrap();
    store.rollback(&mut record).await.unwrap();

    let g = record.bucket("g").unwrap();
    assert_eq!(g.get("v"), Some(&json!(1)));
    assert_eq!(g.staging(), Staging::Persisted);
    assert!(record.bucket("fresh").is_none());
    assert_eq!(record.index_entries().count(), 0);
    assert!(!record.has_pending_changes());
}

#[tokio::test]
async fn rollback_reinstates_removed_bucket_and_index_entry() {
    let (_, store) = setup();
    let mut record = insert_sample(&store).await;

    record.update_bucket("g", attrs(json!({"addr": "edited"}))).unwrap();
    record.remove_bucket("g").unwrap();
    record.remove_search_key("k");
    store.rollback(&mut record).await.unwrap();

    assert_eq!(record.bucket("g").unwrap().get("addr"), Some(&json!("x")));
    assert_eq!(record.bucket("g").unwrap().staging(), Staging::Persisted);
    assert_eq!(
        record.index_entry("k", "v1").unwrap().staging(),
        Staging::Persisted
    );
}

#[tokio::test]
async fn failed_rollback_fetch_surfaces_error() {
    let (docs, store) = setup();
    let mut record = insert_sample(&store).await;
    record.update_bucket("g", attrs(json!({"addr": "y"}))).unwrap();

    docs.fail_operation(StoreOperation::Get);
    let result = store.rollback(&mut record).await;
    assert!(matches!(result, Err(CoreError::Store(_))));

    docs.clear_faults();
    store.rollback(&mut record).await.unwrap();
    assert_eq!(record.bucket("g").unwrap().get("addr"), Some(&json!("x")));
}

#[tokio::test]
async fn search_key_pairs_cancel_before_save() {
    let (_, store) = setup();
    let mut record = insert_sample(&store).await;

    record.add_search_key("other", "z").unwrap();
    record.remove_search_key("other");
    assert!(record.index_entries_named("other").next().is_none());

    record.remove_search_key("k");
    record.add_search_key("k", "v1").unwrap();
    let active: Vec<_> = record
        .index_entries_named("k")
        .filter(|e| e.staging() != Staging::Deleted)
        .collect();
    assert_eq!(active.len(), 1);
    assert!(!record.has_pending_changes());
}

#[tokio::test]
async fn find_by_key_follows_index_updates() {
    let (_, store) = setup();
    let mut record = insert_sample(&store).await;

    let found = store.find_by_key("k", "v1", FindOptions::new()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), record.id());

    record.remove_search_key("k");
    record.add_search_key("k", "v2").unwrap();
    store.save(&mut record).await.unwrap();

    assert!(store
        .find_by_key("k", "v1", FindOptions::new())
        .await
        .unwrap()
        .is_empty());
    let found = store.find_by_key("k", "v2", FindOptions::new()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].index_values("k"), vec!["v2"]);
}

#[tokio::test]
async fn find_by_key_range_options() {
    let (_, store) = setup_with(StoreConfig::new().find_concurrency(2));
    for mobile in ["6465490401", "6465490402", "6465490500", "6465490403"] {
        store
            .insert(Attributes::new(), Vec::new(), vec![IndexSpec::new("mobile", mobile)])
            .await
            .unwrap();
    }
    store
        .insert(Attributes::new(), Vec::new(), vec![IndexSpec::new("nickname", "a")])
        .await
        .unwrap();

    let prefix = FindOptions::new().starts_with(true);
    let found = store.find_by_key("mobile", "64654904", prefix.clone()).await.unwrap();
    let values: Vec<_> = found.iter().map(|r| r.index_values("mobile")[0].to_string()).collect();
    assert_eq!(values, vec!["6465490401", "6465490402", "6465490403"]);

    let found = store
        .find_by_key("mobile", "64654904", prefix.descending(true).limit(Some(2)))
        .await
        .unwrap();
    let values: Vec<_> = found.iter().map(|r| r.index_values("mobile")[0].to_string()).collect();
    assert_eq!(values, vec!["6465490403", "6465490402"]);

    let found = store
        .find_by_key("mobile", "6465490403", FindOptions::new().gte(true))
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|r| r.index_values("nickname").is_empty()));

    assert!(store
        .find_by_key("mobile", "7", FindOptions::new().starts_with(true))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn stale_marker_fails_lookup() {
    let (docs, store) = setup();
    let record = insert_sample(&store).await;

    // Delete the core record behind the engine's back.
    let core = Document::tombstone(
        record.core().key(),
        record.core().revision().cloned().unwrap(),
    );
    docs.put(core).await.unwrap();

    let result = store.find_by_key("k", "v1", FindOptions::new()).await;
    assert!(matches!(result, Err(CoreError::NotFound { .. })));
}

#[tokio::test]
async fn remove_then_get_is_not_found() {
    let (docs, store) = setup();
    let record = insert_sample(&store).await;

    store.remove(&record).await.unwrap();
    assert!(matches!(
        store.get_by_id(record.id()).await,
        Err(CoreError::NotFound { .. })
    ));
    assert!(store
        .find_by_key("k", "v1", FindOptions::new())
        .await
        .unwrap()
        .is_empty());
    // Only the auto-increment counter is left.
    assert_eq!(docs.keys(), vec!["_local/auto-increment/p"]);
}

#[tokio::test]
async fn remove_skips_missing_marker() {
    let (docs, store) = setup();
    let record = insert_sample(&store).await;
    let entry = record.index_entry("k", "v1").unwrap();
    let marker = docs.get(entry.reference()).await.unwrap();
    docs.put(Document::tombstone(marker.key, marker.revision.unwrap()))
        .await
        .unwrap();

    store.remove(&record).await.unwrap();
    assert!(store.get_by_id(record.id()).await.is_err());
}

#[tokio::test]
async fn duplicate_add_bucket_on_unsaved_record() {
    let (_, store) = setup();
    let mut record = store
        .insert(Attributes::new(), Vec::new(), Vec::new())
        .await
        .unwrap();
    record.add_bucket("g", Attributes::new()).unwrap();
    let result = record.add_bucket("g", attrs(json!({"a": 1})));
    assert!(matches!(result, Err(CoreError::DuplicateBucket { ref name }) if name == "g"));
}

#[tokio::test]
async fn partial_save_keeps_failed_parts_staged() {
    let (docs, store) = setup();
    let mut record = insert_sample(&store).await;

    record.update_bucket("g", attrs(json!({"addr": "y"}))).unwrap();
    record.add_bucket("h", attrs(json!({"b": 1}))).unwrap();
    record.add_search_key("tag", "t").unwrap();
    let h_key = record.bucket("h").unwrap().key().to_string();
    let marker_key = record.index_entry("tag", "t").unwrap().reference().to_string();
    docs.fail_key(h_key.clone());
    docs.fail_key(marker_key.clone());

    let err = store.save(&mut record).await.unwrap_err();
    assert!(err.is_retryable());
    let mut failed = err.failed_keys();
    failed.sort_unstable();
    let mut expected = vec![h_key.as_str(), marker_key.as_str()];
    expected.sort_unstable();
    assert_eq!(failed, expected);

    assert_eq!(record.bucket("g").unwrap().staging(), Staging::Persisted);
    assert_eq!(record.bucket("h").unwrap().staging(), Staging::Added);
    assert_eq!(record.index_entry("tag", "t").unwrap().staging(), Staging::Updated);
    assert!(store
        .find_by_key("tag", "t", FindOptions::new())
        .await
        .unwrap()
        .is_empty());

    docs.clear_faults();
    store.save(&mut record).await.unwrap();
    assert!(!record.has_pending_changes());

    let loaded = store.get_by_id(record.id()).await.unwrap();
    assert_eq!(loaded, record);
    assert_eq!(store.find_by_key("tag", "t", FindOptions::new()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_bulk_write_leaves_record_unchanged() {
    let (docs, store) = setup();
    let mut record = insert_sample(&store).await;
    record.update_bucket("g", attrs(json!({"addr": "y"}))).unwrap();
    let before = record.clone();

    docs.fail_operation(StoreOperation::BulkWrite);
    let result = store.save(&mut record).await;
    assert!(matches!(result, Err(CoreError::Store(_))));
    assert_eq!(record, before);
}

#[tokio::test]
async fn partial_insert_returns_no_record() {
    let (docs, store) = setup();
    docs.fail_key("p/000000001000/g");
    let result = store
        .insert(
            Attributes::new(),
            vec![("g".into(), Attributes::new())],
            Vec::new(),
        )
        .await;
    assert!(matches!(result, Err(CoreError::PartialWrite { total: 2, .. })));
}

#[tokio::test]
async fn update_core_with_stale_revision_conflicts() {
    let (_, store) = setup();
    let mut first = insert_sample(&store).await;
    let mut second = store.get_by_id(first.id()).await.unwrap();

    store
        .update_core(&mut first, attrs(json!({"name": "B"})))
        .await
        .unwrap();
    let before = second.clone();
    let result = store
        .update_core(&mut second, attrs(json!({"name": "C"})))
        .await;
    assert!(matches!(result, Err(CoreError::Conflict { .. })));
    assert_eq!(second, before);

    let loaded = store.get_by_id(first.id()).await.unwrap();
    assert_eq!(loaded.core().attributes()["name"], json!("B"));
}

#[tokio::test]
async fn entities_survive_file_store_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let id = {
        let docs = Arc::new(FileDocumentStore::open(&path).unwrap());
        let store = EntityStore::with_defaults(docs, "p").unwrap();
        let mut record = insert_sample(&store).await;
        record.add_bucket("h", attrs(json!({"b": 1}))).unwrap();
        store.save(&mut record).await.unwrap();
        record.id().to_string()
    };

    let docs = Arc::new(FileDocumentStore::open(&path).unwrap());
    let store = EntityStore::with_defaults(docs, "p").unwrap();
    let loaded = store.get_by_id(&id).await.unwrap();
    assert_eq!(loaded.bucket("h").unwrap().get("b"), Some(&json!(1)));
    assert_eq!(store.find_by_key("k", "v1", FindOptions::new()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn exact_lookup_matches_only_the_whole_value() {
    let (docs, store) = setup();
    let rejected = store
        .insert(Attributes::new(), Vec::new(), vec![IndexSpec::new("date", "2020/01")])
        .await;
    assert!(matches!(rejected, Err(CoreError::Validation { .. })));
    assert!(docs.keys().is_empty());

    let mut record = store
        .insert(Attributes::new(), Vec::new(), vec![IndexSpec::new("date", "2020-01")])
        .await
        .unwrap();
    assert!(store.find_by_key("date", "2020", FindOptions::new()).await.unwrap().is_empty());
    assert!(matches!(
        record.add_search_key("date", "2020/02"),
        Err(CoreError::Validation { .. })
    ));

    let found = store
        .find_by_key("date", "2020", FindOptions::new().starts_with(true))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn non_ascii_index_values_round_trip() {
    let (_, store) = setup();
    let record = store
        .insert(
            Attributes::new(),
            Vec::new(),
            vec![IndexSpec::new("city", "São Paulo"), IndexSpec::new("city", "東京")],
        )
        .await
        .unwrap();

    for value in ["São Paulo", "東京"] {
        let found = store.find_by_key("city", value, FindOptions::new()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), record.id());
    }
    assert!(store.find_by_key("city", "São", FindOptions::new()).await.unwrap().is_empty());

    let ranged = store
        .find_ids_by_key("city", "T", FindOptions::new().gte(true))
        .await
        .unwrap();
    let values: Vec<_> = ranged.iter().map(|m| m.value.as_str()).collect();
    assert_eq!(values, vec!["東京"]);
}

#[tokio::test]
async fn update_after_remove_replaces_bucket() {
    let (_, store) = setup();
    let mut record = insert_sample(&store).await;

    record.remove_bucket("g").unwrap();
    record.update_bucket("g", attrs(json!({"b": 2}))).unwrap();
    store.save(&mut record).await.unwrap();

    let loaded = store.get_by_id(record.id()).await.unwrap();
    let bucket = loaded.bucket("g").unwrap();
    assert_eq!(bucket.attributes(), &attrs(json!({"b": 2})));
    assert_eq!(bucket.staging(), Staging::Persisted);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn saved_index_values_are_found(values in prop::collection::btree_set("[a-z é中/]{1,6}", 1..5)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let (docs, store) = setup();
            let specs = values.iter().map(|v| IndexSpec::new("tag", v.clone())).collect();
            let inserted = store.insert(Attributes::new(), Vec::new(), specs).await;

            if values.iter().any(|v| v.contains('/')) {
                let is_validation_err = matches!(inserted, Err(CoreError::Validation { .. }));
                prop_assert!(is_validation_err);
                prop_assert!(docs.keys().is_empty());
                return Ok(());
            }
            let record = inserted.unwrap();

            for value in &values {
                let found = store.find_by_key("tag", value, FindOptions::new()).await.unwrap();
                prop_assert_eq!(found.len(), 1);
                prop_assert_eq!(found[0].id(), record.id());
            }
            let mut loaded = store.get_by_id(record.id()).await.unwrap();
            let indexed: Vec<_> = loaded.index_values("tag").into_iter().map(String::from).collect();
            prop_assert_eq!(indexed, values.iter().cloned().collect::<Vec<_>>());

            loaded.remove_search_key("tag");
            store.save(&mut loaded).await.unwrap();
            for value in &values {
                let found = store.find_by_key("tag", value, FindOptions::new()).await.unwrap();
                prop_assert!(found.is_empty());
            }
            Ok(())
        })?;
    }
}
