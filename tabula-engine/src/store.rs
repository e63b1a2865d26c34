//! The backend contract consumed by the query-materialization cache.

use async_trait::async_trait;
use serde_json::Value;
use tabula_core::{
    AggregateSpec, ColumnInfo, Condition, QueryDescriptor, Row, StoreError, TableDescription,
};

/// Relational backend trait.
///
/// Implementations must be thread-safe. The cache treats every method as
/// potentially slow I/O and never calls into the store while holding its
/// own locks.
///
/// # Materialization contract
///
/// `materialize` computes the filtered/projected/sorted/distinct rows of
/// `descriptor` against the current base-table data and writes them to
/// `dest_table`. It must be safely re-callable for the same destination:
/// dropping and recreating `dest_table` is acceptable. The returned
/// description reports the destination's columns and row count.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Create an empty base table.
    async fn create_table(&self, table: &str, columns: Vec<ColumnInfo>)
        -> Result<(), StoreError>;

    /// Drop a table (base or materialized).
    async fn drop_table(&self, table: &str) -> Result<(), StoreError>;

    /// (Re)build `dest_table` from `descriptor` and describe the result.
    async fn materialize(
        &self,
        descriptor: &QueryDescriptor,
        dest_table: &str,
    ) -> Result<TableDescription, StoreError>;

    /// Read a page of rows from a table, clamped to its end.
    async fn read_rows(&self, table: &str, from: u64, count: u64)
        -> Result<Vec<Row>, StoreError>;

    /// Compute aggregates over a table, one value per spec.
    async fn aggregate(
        &self,
        table: &str,
        specs: &[AggregateSpec],
    ) -> Result<Vec<Value>, StoreError>;

    /// Append rows to a base table. Returns the number of rows pushed.
    async fn push_rows(&self, table: &str, rows: Vec<Row>) -> Result<u64, StoreError>;

    /// Assign `assignments` to every row matching `filter` (all rows when
    /// `None`). Returns the number of rows updated.
    async fn update_rows(
        &self,
        table: &str,
        filter: Option<&Condition>,
        assignments: &Row,
    ) -> Result<u64, StoreError>;

    /// Delete every row matching `filter` (all rows when `None`).
    /// Returns the number of rows deleted.
    async fn delete_rows(
        &self,
        table: &str,
        filter: Option<&Condition>,
    ) -> Result<u64, StoreError>;
}
