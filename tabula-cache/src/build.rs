//! Build coordination: at most one in-flight materialization per guid.
//!
//! The coordinator turns the registry's atomic build decision into work:
//! a ready entry is served from the cached description, an in-flight
//! build is joined, and a start ticket spawns the single build task for
//! that guid. The build runs detached, so a caller going away does not
//! cancel the materialization other waiters depend on; cancellation only
//! drops that caller's subscription.

use std::sync::Arc;

use tabula_core::{CacheError, StoreError, TableDescription, TabulaError, TabulaResult};
use tabula_engine::TableStore;
use tokio::sync::watch;

use crate::registry::{BuildDecision, Guid, GuidRegistry};

pub(crate) type BuildState = Option<TabulaResult<TableDescription>>;

/// Subscription to one shared in-flight build.
///
/// Every concurrent `ensure_built` caller for a guid holds a clone of the
/// same handle and observes the same outcome, success or failure.
#[derive(Debug, Clone)]
pub struct BuildHandle {
    rx: watch::Receiver<BuildState>,
}

impl BuildHandle {
    pub(crate) fn new(rx: watch::Receiver<BuildState>) -> Self {
        Self { rx }
    }

    /// Wait for the build to finish and return its outcome.
    pub async fn wait(mut self) -> TabulaResult<TableDescription> {
        loop {
            let state = self.rx.borrow_and_update().clone();
            if let Some(result) = state {
                return result;
            }
            if self.rx.changed().await.is_err() {
                // The build task dropped its sender without publishing a
                // result; treat it as a failed build so waiters can retry.
                return Err(CacheError::BuildFailed(StoreError::Backend {
                    reason: "build task dropped without a result".to_string(),
                })
                .into());
            }
        }
    }
}

/// Ensures at most one concurrent (re)build per guid and shares the
/// outcome with every waiter.
#[derive(Clone)]
pub struct BuildCoordinator {
    registry: Arc<GuidRegistry>,
    store: Arc<dyn TableStore>,
}

impl BuildCoordinator {
    pub fn new(registry: Arc<GuidRegistry>, store: Arc<dyn TableStore>) -> Self {
        Self { registry, store }
    }

    /// Return the entry's description, (re)building it first if needed.
    ///
    /// The registry lock is only held for the begin/commit bookkeeping;
    /// the materialize call itself runs in a detached task so unrelated
    /// guids never stall behind a slow build and caller cancellation
    /// cannot abandon other waiters.
    pub async fn ensure_built(&self, guid: &Guid) -> TabulaResult<TableDescription> {
        match self.registry.begin_build(guid)? {
            BuildDecision::Ready(description) => Ok(description),
            BuildDecision::InFlight(handle) => handle.wait().await,
            BuildDecision::Start(ticket) => {
                let registry = Arc::clone(&self.registry);
                let store = Arc::clone(&self.store);
                let handle = ticket.handle.clone();
                tokio::spawn(async move {
                    tracing::debug!(
                        guid = %ticket.guid,
                        dest = %ticket.materialized_table,
                        "materializing"
                    );
                    let result = store
                        .materialize(&ticket.descriptor, &ticket.materialized_table)
                        .await
                        .map_err(|e| TabulaError::from(CacheError::BuildFailed(e)));
                    match &result {
                        Ok(d) => tracing::debug!(
                            guid = %ticket.guid,
                            rows = d.row_count,
                            "build complete"
                        ),
                        Err(e) => tracing::warn!(guid = %ticket.guid, error = %e, "build failed"),
                    }
                    // Commit before notifying, so a woken waiter that
                    // re-reads the entry sees the committed state.
                    if registry.complete_build(&ticket.guid, &result).is_err() {
                        tracing::warn!(guid = %ticket.guid, "registry lock poisoned at build commit");
                    }
                    let _ = ticket.tx.send(Some(result));
                });
                handle.wait().await
            }
        }
    }
}
