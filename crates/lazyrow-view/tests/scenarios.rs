//! End-to-end paging scenarios against the in-memory backend.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{FlakyPort, ItemAccessor, SENTINEL_BASE, config, item, items, view};
use lazyrow_memory::Filter;
use lazyrow_view::{
    CachedView, RetryConfig, RowLookup, SharedPredicates, SortSpec, ViewConfig, ViewError,
    VirtualCollection,
};

#[tokio::test]
async fn test_range_failure_degrades_per_row() {
    let mut view = view(20, 20, 200);
    view.port().fail_ranges(true);
    view.port().fail_offset(12);

    let ids = view.item_ids(10, 5).await.unwrap();
    assert_eq!(ids, vec![10, 11, SENTINEL_BASE + 12, 13, 14]);
    assert_eq!(view.port().ranges(), 1);
    assert_eq!(view.port().ones(), 5);

    // Once the backend recovers, the failed position is loaded normally
    view.port().fail_ranges(false);
    assert_eq!(view.item_ids(10, 5).await.unwrap(), vec![10, 11, 12, 13, 14]);
}

#[tokio::test]
async fn test_mapped_index_survives_small_cache() {
    let mut view = view(5, 20, 2);
    assert_eq!(view.item_ids(0, 1).await.unwrap(), vec![0]);
    assert_eq!(view.item_ids(3, 1).await.unwrap(), vec![3]);
    assert_eq!(view.item_ids(0, 1).await.unwrap(), vec![0]);
    assert_eq!(view.port().ranges(), 2);
}

#[tokio::test]
async fn test_evicted_row_reloaded_by_identity() {
    let mut view = view(50, 20, 10);
    view.item_ids(0, 5).await.unwrap();
    view.item_ids(5, 10).await.unwrap();
    // 15 > 10, so rows 0..5 were evicted but stay mapped
    assert_eq!(view.cached_len(), 10);
    assert_eq!(view.mapped_len(), 15);

    let row = view.object_by_index(2).await.unwrap();
    assert_eq!(row, RowLookup::Found(item(2)));
    assert_eq!(view.port().identity_loads(), 1);
    assert_eq!(view.port().ranges(), 2);
}

#[tokio::test]
async fn test_sort_clear_forces_fresh_range() {
    let mut view = view(10, 20, 200);
    view.sort(&["score".to_string()], &[false]).unwrap();
    let sorted = view.item_ids(0, 3).await.unwrap();
    assert_eq!(view.sort_spec(), Some(&SortSpec::descending("score")));
    // Scores are id * 7 % 10, so ids 7, 4 and 1 score 9, 8 and 7
    assert_eq!(sorted, vec![7, 4, 1]);

    let ranges = view.port().ranges();
    view.sort(&[], &[]).unwrap();
    assert_eq!(view.item_ids(0, 1).await.unwrap(), vec![0]);
    assert_eq!(view.port().ranges(), ranges + 1);
}

#[tokio::test]
async fn test_size_after_invalidate_counts_once() {
    let mut view = view(37, 20, 200);
    assert_eq!(view.size().await.unwrap(), 37);
    view.invalidate();
    let counts = view.port().counts();

    let size = view.size().await.unwrap();
    assert_eq!(view.size().await.unwrap(), size);
    assert_eq!(view.port().counts(), counts + 1);

    let all = view.item_ids(0, 1_000).await.unwrap();
    assert_eq!(all.len(), size);
}

#[tokio::test]
async fn test_count_failure_is_not_zero() {
    let mut view = view(10, 20, 200);
    view.port().fail_counts(true);
    let err = view.size().await.unwrap_err();
    assert!(err.is_backend());
    assert!(err.to_string().contains("size"));
}

#[tokio::test]
async fn test_add_then_remove_filter_restores_view() {
    let mut view = view(30, 20, 200);
    let before_size = view.size().await.unwrap();
    let before_ids = view.item_ids(4, 8).await.unwrap();

    let filter = Filter::greater("score", 5);
    view.add_filter(filter.clone()).unwrap();
    assert!(view.size().await.unwrap() < before_size);
    view.remove_filter(&filter);

    assert_eq!(view.size().await.unwrap(), before_size);
    assert_eq!(view.item_ids(4, 8).await.unwrap(), before_ids);
    assert!(view.filters().is_empty());
}

#[tokio::test]
async fn test_filter_on_unknown_property_is_misconfigured() {
    let mut view = view(10, 20, 200);
    let err = view.add_filter(Filter::equal("colour", "red")).unwrap_err();
    assert!(matches!(err, ViewError::Misconfigured(_)));
    assert_eq!(view.size().await.unwrap(), 10);
}

#[tokio::test]
async fn test_sort_on_unsortable_property_is_misconfigured() {
    let mut view = view(10, 20, 200);
    let err = view.sort(&["id".to_string()], &[true]).unwrap_err();
    assert!(matches!(err, ViewError::Misconfigured(_)));
}

#[tokio::test]
async fn test_object_outside_filters_not_found() {
    let mut view = view(10, 20, 200);
    view.add_filter(Filter::like("name", "item-00%")).unwrap();
    assert_eq!(view.size().await.unwrap(), 10);

    view.remove_all_filters();
    view.add_filter(Filter::between("score", 0, 3)).unwrap();
    // Score of 1 is 7
    assert!(!view.contains_id(&1).await.unwrap());
    assert!(matches!(view.object(&1).await, Err(ViewError::NotFound(_))));
    assert!(view.contains_id(&3).await.unwrap());
}

#[tokio::test]
async fn test_core_predicates_scope_the_view() {
    let core = SharedPredicates::new(vec![Filter::less("score", 5)]);
    let mut view = view(20, 20, 200).with_core_predicates(core.clone());

    let scoped = view.size().await.unwrap();
    assert_eq!(scoped, 10);
    assert_eq!(view.core_filters().len(), 1);

    view.add_filter(Filter::greater("score", 2)).unwrap();
    assert_eq!(view.size().await.unwrap(), 4);

    core.replace(vec![]).await;
    assert_eq!(view.size().await.unwrap(), 14);
    assert!(view.core_filters().is_empty());
    assert_eq!(view.filters().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_guarded_view_retries_transient_failures() {
    let port = Arc::new(FlakyPort::new(items(12)));
    let config = ViewConfig {
        fetch_timeout_ms: Some(500),
        retry: RetryConfig {
            max_retries: 2,
            initial_interval_ms: 10,
            max_interval_ms: 50,
        },
        ..config(5, 50)
    };
    let mut view = CachedView::guarded(port.clone(), Arc::new(ItemAccessor), &config).unwrap();

    port.fail_next(2);
    assert_eq!(view.size().await.unwrap(), 12);
    assert_eq!(port.counts(), 3);

    port.fail_next(3);
    let err = view.object(&4).await.unwrap_err();
    assert!(matches!(
        err,
        ViewError::BackendUnavailable {
            operation: "object",
            ..
        }
    ));
}

#[tokio::test]
async fn test_facade_over_cached_view() {
    let collection = Arc::new(VirtualCollection::new(view(25, 10, 200)));
    let mut events = collection.subscribe();

    assert_eq!(collection.size().await.unwrap(), 25);
    assert_eq!(
        collection.columns(),
        vec![
            ("name".to_string(), "Name".to_string()),
            ("score".to_string(), "Score".to_string())
        ]
    );

    collection
        .sort(&["name".to_string()], &[false])
        .await
        .unwrap();
    assert_eq!(
        collection.property_value_at(0, "name").await.unwrap(),
        Some(json!("item-024"))
    );

    collection
        .add_filter(Filter::contains("name", "ITEM-01"))
        .await
        .unwrap();
    assert_eq!(collection.all_item_ids().await.unwrap().len(), 10);

    let score = collection.property(13, "score").unwrap();
    assert_eq!(score.value().await.unwrap(), Some(json!(1)));

    assert!(events.try_recv().is_ok());
    assert!(events.try_recv().is_ok());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_facade_degraded_row_renders_placeholder() {
    let view = view(10, 5, 200);
    view.port().fail_ranges(true);
    view.port().fail_offset(2);
    let collection = VirtualCollection::new(view);

    let lookup = collection.object_by_index(2).await.unwrap();
    assert!(lookup.is_degraded());
    assert_eq!(
        collection.property_value_at(2, "name").await.unwrap(),
        Some(json!("unavailable"))
    );
    assert_eq!(
        collection.property_value_at(3, "name").await.unwrap(),
        Some(json!("item-003"))
    );
}
