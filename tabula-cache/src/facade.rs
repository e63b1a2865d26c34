//! Public query and write surface over the materialization cache.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tabula_core::{
    AggregateSpec, CacheError, ColumnInfo, Condition, QueryDescriptor, Row, StoreError,
    TableDescription, TabulaResult,
};
use tabula_engine::TableStore;

use crate::build::BuildCoordinator;
use crate::config::CacheConfig;
use crate::invalidation::InvalidationTracker;
use crate::registry::{Guid, GuidRegistry};

/// Result of resolving a descriptor: the cache handle plus the built
/// view's shape and size.
#[derive(Debug, Clone)]
pub struct ResolvedQuery {
    pub guid: Guid,
    pub description: TableDescription,
}

/// The public operations: resolve a descriptor to a guid, page and
/// aggregate over the materialized view, and feed base-table writes back
/// into invalidation.
#[derive(Clone)]
pub struct QueryFacade {
    registry: Arc<GuidRegistry>,
    coordinator: BuildCoordinator,
    tracker: InvalidationTracker,
    store: Arc<dyn TableStore>,
    config: CacheConfig,
}

impl QueryFacade {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self::with_config(store, CacheConfig::default())
    }

    pub fn with_config(store: Arc<dyn TableStore>, config: CacheConfig) -> Self {
        let registry = Arc::new(GuidRegistry::new(config.clone()));
        let coordinator = BuildCoordinator::new(Arc::clone(&registry), Arc::clone(&store));
        let tracker = InvalidationTracker::new(Arc::clone(&registry));
        Self {
            registry,
            coordinator,
            tracker,
            store,
            config,
        }
    }

    /// The underlying registry, mainly for inspection in tests.
    pub fn registry(&self) -> &GuidRegistry {
        &self.registry
    }

    /// Resolve a descriptor to its guid, building the materialized view
    /// if this is a new or stale entry.
    pub async fn resolve(&self, descriptor: &QueryDescriptor) -> TabulaResult<ResolvedQuery> {
        let (guid, _is_new) = self.registry.resolve(descriptor)?;
        let description = self.coordinator.ensure_built(&guid).await?;
        Ok(ResolvedQuery { guid, description })
    }

    /// Row count of the materialized view.
    pub async fn row_count(&self, guid: &Guid) -> TabulaResult<u64> {
        Ok(self.coordinator.ensure_built(guid).await?.row_count)
    }

    /// Columns of the materialized view.
    pub async fn columns(&self, guid: &Guid) -> TabulaResult<Vec<ColumnInfo>> {
        Ok(self.coordinator.ensure_built(guid).await?.columns)
    }

    /// Load one page of rows from the materialized view.
    ///
    /// A failed read forces exactly one rebuild-and-retry (when enabled)
    /// to heal from external interference with the temp table; a second
    /// failure surfaces as `ReadFailed`.
    pub async fn load_page(
        &self,
        guid: &Guid,
        from: u64,
        count: u64,
    ) -> TabulaResult<Vec<Row>> {
        let table = self.registry.get(guid)?.materialized_table;
        self.with_read_retry(guid, || self.store.read_rows(&table, from, count))
            .await
    }

    /// Compute aggregates over the materialized view, one value per spec.
    /// Same one-shot rebuild-and-retry policy as [`load_page`].
    ///
    /// [`load_page`]: Self::load_page
    pub async fn load_aggregate(
        &self,
        guid: &Guid,
        specs: &[AggregateSpec],
    ) -> TabulaResult<Vec<Value>> {
        let table = self.registry.get(guid)?.materialized_table;
        self.with_read_retry(guid, || self.store.aggregate(&table, specs))
            .await
    }

    async fn with_read_retry<T, F, Fut>(&self, guid: &Guid, op: F) -> TabulaResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.coordinator.ensure_built(guid).await?;
        match op().await {
            Ok(value) => Ok(value),
            Err(first) => {
                if !self.config.rebuild_on_read_failure {
                    return Err(CacheError::ReadFailed(first).into());
                }
                tracing::warn!(guid = %guid, error = %first, "read failed; forcing one rebuild");
                self.registry.force_invalid(guid)?;
                self.coordinator.ensure_built(guid).await?;
                op().await.map_err(|e| CacheError::ReadFailed(e).into())
            }
        }
    }

    /// Notify the cache that `table` was mutated. Call after the write
    /// has been applied to the base table, never before.
    pub fn on_table_mutated(&self, table: &str) -> TabulaResult<usize> {
        self.tracker.mark_invalid(table)
    }

    /// Notify the cache that `table` was dropped: every entry referencing
    /// it is removed and its materialized tables are cleaned up best
    /// effort.
    pub async fn on_table_dropped(&self, table: &str) -> TabulaResult<()> {
        let removed = self.tracker.drop_table(table)?;
        for (guid, temp_table) in removed {
            if let Err(e) = self.store.drop_table(&temp_table).await {
                tracing::warn!(
                    guid = %guid,
                    table = %temp_table,
                    error = %e,
                    "failed to drop materialized table"
                );
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Write path: apply to the store, then signal the cache.
    // ------------------------------------------------------------------

    pub async fn create_table(
        &self,
        table: &str,
        columns: Vec<ColumnInfo>,
    ) -> TabulaResult<()> {
        self.store.create_table(table, columns).await?;
        Ok(())
    }

    pub async fn push_rows(&self, table: &str, rows: Vec<Row>) -> TabulaResult<u64> {
        let pushed = self.store.push_rows(table, rows).await?;
        self.on_table_mutated(table)?;
        Ok(pushed)
    }

    pub async fn update_rows(
        &self,
        table: &str,
        filter: Option<&Condition>,
        assignments: &Row,
    ) -> TabulaResult<u64> {
        let updated = self.store.update_rows(table, filter, assignments).await?;
        self.on_table_mutated(table)?;
        Ok(updated)
    }

    pub async fn delete_rows(
        &self,
        table: &str,
        filter: Option<&Condition>,
    ) -> TabulaResult<u64> {
        let deleted = self.store.delete_rows(table, filter).await?;
        self.on_table_mutated(table)?;
        Ok(deleted)
    }

    pub async fn drop_table(&self, table: &str) -> TabulaResult<()> {
        self.store.drop_table(table).await?;
        self.on_table_dropped(table).await
    }
}
