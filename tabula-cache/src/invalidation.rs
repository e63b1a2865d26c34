//! Table-scoped invalidation of cached entries.
//!
//! Writes to a base table do not evict cache entries; they mark every
//! entry referencing the table stale so the next lookup rebuilds in
//! place. The write path must apply the mutation to the base table
//! before calling in here: a reader that still observes `invalid =
//! false` is then guaranteed a pre-mutation snapshot, and the first
//! reader after invalidation sees post-mutation data once rebuilt.

use std::sync::Arc;

use tabula_core::TabulaResult;

use crate::registry::{Guid, GuidRegistry};

/// Marks cache entries stale on base-table mutation and removes them on
/// base-table drop.
#[derive(Clone)]
pub struct InvalidationTracker {
    registry: Arc<GuidRegistry>,
}

impl InvalidationTracker {
    pub fn new(registry: Arc<GuidRegistry>) -> Self {
        Self { registry }
    }

    /// Mark every idle, valid entry for `table` stale.
    ///
    /// Idempotent; entries already stale or mid-build are left alone.
    /// Returns the number of entries flipped.
    pub fn mark_invalid(&self, table: &str) -> TabulaResult<usize> {
        let flipped = self.registry.mark_invalid_for_table(table)?;
        if flipped > 0 {
            tracing::debug!(table, flipped, "invalidated cache entries");
        }
        Ok(flipped)
    }

    /// Remove every entry for a dropped base table. Returns the removed
    /// guids and their materialized table names.
    pub fn drop_table(&self, table: &str) -> TabulaResult<Vec<(Guid, String)>> {
        self.registry.drop_table(table)
    }
}
