//! End-to-end scenarios over the in-memory engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tabula_cache::QueryFacade;
use tabula_core::{
    AggregateFn, AggregateSpec, ColumnInfo, ColumnOrder, ColumnType, Condition,
    QueryDescriptor, RegistryError, Row, StoreError, TableDescription, TabulaError,
};
use tabula_engine::{MemoryTableStore, TableStore};

/// Delegating wrapper that counts materialize calls.
struct CountingStore {
    inner: MemoryTableStore,
    materialize_calls: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: MemoryTableStore::new(),
            materialize_calls: AtomicUsize::new(0),
        }
    }

    fn materialize_calls(&self) -> usize {
        self.materialize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TableStore for CountingStore {
    async fn create_table(&self, table: &str, columns: Vec<ColumnInfo>) -> Result<(), StoreError> {
        self.inner.create_table(table, columns).await
    }

    async fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        self.inner.drop_table(table).await
    }

    async fn materialize(
        &self,
        descriptor: &QueryDescriptor,
        dest_table: &str,
    ) -> Result<TableDescription, StoreError> {
        self.materialize_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.materialize(descriptor, dest_table).await
    }

    async fn read_rows(&self, table: &str, from: u64, count: u64) -> Result<Vec<Row>, StoreError> {
        self.inner.read_rows(table, from, count).await
    }

    async fn aggregate(
        &self,
        table: &str,
        specs: &[AggregateSpec],
    ) -> Result<Vec<Value>, StoreError> {
        self.inner.aggregate(table, specs).await
    }

    async fn push_rows(&self, table: &str, rows: Vec<Row>) -> Result<u64, StoreError> {
        self.inner.push_rows(table, rows).await
    }

    async fn update_rows(
        &self,
        table: &str,
        filter: Option<&Condition>,
        assignments: &Row,
    ) -> Result<u64, StoreError> {
        self.inner.update_rows(table, filter, assignments).await
    }

    async fn delete_rows(
        &self,
        table: &str,
        filter: Option<&Condition>,
    ) -> Result<u64, StoreError> {
        self.inner.delete_rows(table, filter).await
    }
}

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

async fn people_facade() -> (Arc<CountingStore>, QueryFacade) {
    let store = Arc::new(CountingStore::new());
    let facade = QueryFacade::new(Arc::clone(&store) as Arc<dyn TableStore>);
    facade
        .create_table(
            "t",
            vec![
                ColumnInfo::new("name", ColumnType::Text),
                ColumnInfo::new("age", ColumnType::Number),
            ],
        )
        .await
        .unwrap();
    facade
        .push_rows(
            "t",
            vec![
                row(&[("name", json!("Ann")), ("age", json!(30))]),
                row(&[("name", json!("Bob")), ("age", json!(25))]),
                row(&[("name", json!("Cara")), ("age", json!(30))]),
            ],
        )
        .await
        .unwrap();
    (store, facade)
}

#[tokio::test]
async fn back_to_back_resolve_hits_the_cache() {
    let (store, facade) = people_facade().await;
    let descriptor = QueryDescriptor::table("t")
        .with_filter(Condition::and(vec![Condition::eq("age", json!(30))]))
        .with_columns(vec!["name".into()]);

    let first = facade.resolve(&descriptor).await.unwrap();
    let second = facade.resolve(&descriptor).await.unwrap();

    assert_eq!(first.guid, second.guid);
    assert_eq!(first.description, second.description);
    assert_eq!(first.description.row_count, 2);
    assert_eq!(store.materialize_calls(), 1);
}

#[tokio::test]
async fn push_invalidates_and_one_rebuild_serves_new_rows() {
    let (store, facade) = people_facade().await;
    let descriptor = QueryDescriptor::table("t").with_order(vec![ColumnOrder::asc("name")]);
    let resolved = facade.resolve(&descriptor).await.unwrap();
    assert_eq!(resolved.description.row_count, 3);
    assert_eq!(store.materialize_calls(), 1);

    let fresh: Vec<Row> = (0..10)
        .map(|i| row(&[("name", json!(format!("p{i:02}"))), ("age", json!(40))]))
        .collect();
    facade.push_rows("t", fresh).await.unwrap();
    assert!(facade.registry().get(&resolved.guid).unwrap().invalid);

    let page = facade.load_page(&resolved.guid, 0, 100).await.unwrap();
    assert_eq!(page.len(), 13);
    assert_eq!(store.materialize_calls(), 2);
    assert_eq!(facade.row_count(&resolved.guid).await.unwrap(), 13);
    // The rebuild already happened; the count came from the cache.
    assert_eq!(store.materialize_calls(), 2);
}

#[tokio::test]
async fn update_and_delete_invalidate_too() {
    let (store, facade) = people_facade().await;
    let descriptor = QueryDescriptor::table("t").with_filter(Condition::eq("age", json!(30)));
    let resolved = facade.resolve(&descriptor).await.unwrap();
    assert_eq!(resolved.description.row_count, 2);

    facade
        .update_rows(
            "t",
            Some(&Condition::eq("name", json!("Bob"))),
            &row(&[("age", json!(30))]),
        )
        .await
        .unwrap();
    assert_eq!(facade.row_count(&resolved.guid).await.unwrap(), 3);

    facade
        .delete_rows("t", Some(&Condition::eq("age", json!(30))))
        .await
        .unwrap();
    assert_eq!(facade.row_count(&resolved.guid).await.unwrap(), 0);
    assert_eq!(store.materialize_calls(), 3);
}

#[tokio::test]
async fn drop_removes_entries_and_temp_tables_for_that_table_only() {
    let (store, facade) = people_facade().await;
    facade
        .create_table("u", vec![ColumnInfo::new("x", ColumnType::Number)])
        .await
        .unwrap();

    let t_view = facade.resolve(&QueryDescriptor::table("t")).await.unwrap();
    let u_view = facade.resolve(&QueryDescriptor::table("u")).await.unwrap();
    let t_temp = facade
        .registry()
        .get(&t_view.guid)
        .unwrap()
        .materialized_table;
    assert!(store.inner.contains_table(&t_temp).await);

    facade.drop_table("t").await.unwrap();

    let err = facade.row_count(&t_view.guid).await.unwrap_err();
    assert!(matches!(
        err,
        TabulaError::Registry(RegistryError::GuidNotFound { .. })
    ));
    assert!(!store.inner.contains_table("t").await);
    assert!(!store.inner.contains_table(&t_temp).await);
    // The unrelated view is untouched.
    assert_eq!(facade.row_count(&u_view.guid).await.unwrap(), 0);
}

#[tokio::test]
async fn filtered_sorted_distinct_projection_end_to_end() {
    let (_store, facade) = people_facade().await;
    let descriptor = QueryDescriptor::table("t")
        .with_filter(Condition::or(vec![
            Condition::like("name", "%a%"),
            Condition::range("age", 0.0, 26.0),
        ]))
        .with_columns(vec!["name".into(), "age".into()])
        .with_order(vec![ColumnOrder::desc("age"), ColumnOrder::asc("name")])
        .with_distinct("age");

    let resolved = facade.resolve(&descriptor).await.unwrap();
    let rows = facade.load_page(&resolved.guid, 0, 10).await.unwrap();
    // Ann and Cara share age 30; Ann wins the tie, Bob follows at 25.
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], json!("Ann"));
    assert_eq!(rows[1]["name"], json!("Bob"));
}

#[tokio::test]
async fn aggregates_over_the_materialized_view() {
    let (_store, facade) = people_facade().await;
    let descriptor = QueryDescriptor::table("t").with_filter(Condition::eq("age", json!(30)));
    let resolved = facade.resolve(&descriptor).await.unwrap();

    let values = facade
        .load_aggregate(
            &resolved.guid,
            &[
                AggregateSpec::new("age", AggregateFn::Count),
                AggregateSpec::new("age", AggregateFn::Sum),
                AggregateSpec::new("name", AggregateFn::Min),
            ],
        )
        .await
        .unwrap();
    assert_eq!(values[0], json!(2));
    assert_eq!(values[1], json!(60.0));
    assert_eq!(values[2], json!("Ann"));
}

#[tokio::test]
async fn pagination_pages_through_a_stable_snapshot() {
    let (_store, facade) = people_facade().await;
    let descriptor = QueryDescriptor::table("t").with_order(vec![ColumnOrder::asc("name")]);
    let resolved = facade.resolve(&descriptor).await.unwrap();

    let first = facade.load_page(&resolved.guid, 0, 2).await.unwrap();
    let rest = facade.load_page(&resolved.guid, 2, 2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(rest.len(), 1);
    assert_eq!(first[0]["name"], json!("Ann"));
    assert_eq!(rest[0]["name"], json!("Cara"));
}

#[tokio::test]
async fn equivalent_descriptor_spellings_share_one_view() {
    let (store, facade) = people_facade().await;
    let spelled_out = QueryDescriptor::table("t")
        .with_filter(Condition::and(vec![]))
        .with_distinct("");
    let bare = QueryDescriptor::table("t");

    let a = facade.resolve(&spelled_out).await.unwrap();
    let b = facade.resolve(&bare).await.unwrap();
    assert_eq!(a.guid, b.guid);
    assert_eq!(store.materialize_calls(), 1);
}
