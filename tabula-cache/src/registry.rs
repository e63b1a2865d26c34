//! Guid registry: the single owner of all mutable cache state.
//!
//! Two maps, guid to cache entry and canonical key to guid, live behind
//! one mutex with a small set of transition methods. No other component
//! mutates entry fields directly; the build coordinator and invalidation
//! tracker go through the transitions defined here, and the mutex is never
//! held across a store call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use tabula_core::{
    ConditionKey, QueryDescriptor, RegistryError, TableDescription, TabulaResult,
};
use tokio::sync::watch;

use crate::build::BuildHandle;
use crate::config::CacheConfig;

/// Opaque cache handle identifying one materialized query result.
///
/// Guids are process-local: the registry is in-memory only and starts
/// empty on restart, so callers must never persist or parse them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Guid(String);

impl Guid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One cached materialized view, keyed by guid.
///
/// `materialized_table` is stable for the lifetime of the guid: an
/// invalidated entry rebuilds in place, it never moves to a new table.
/// `description` is only trustworthy while `invalid` is false and no
/// build is pending.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub descriptor: QueryDescriptor,
    pub materialized_table: String,
    pub description: Option<TableDescription>,
    pub invalid: bool,
    pub build: Option<BuildHandle>,
}

impl CacheEntry {
    /// Whether the entry can serve its description without a rebuild.
    pub fn is_fresh(&self) -> bool {
        !self.invalid && self.build.is_none() && self.description.is_some()
    }
}

/// What the build coordinator should do for a guid, decided atomically
/// under the registry lock.
pub(crate) enum BuildDecision {
    /// Entry is valid with a cached description; no store call needed.
    Ready(TableDescription),
    /// A build is already in flight; attach to it.
    InFlight(BuildHandle),
    /// No build in flight and the entry is stale or empty; the caller
    /// holding this ticket is the one that starts the build.
    Start(BuildTicket),
}

/// Permission to run the single build for a guid.
///
/// Created under the registry lock, which also records the shared handle
/// on the entry, so every later caller observes the in-flight build.
pub(crate) struct BuildTicket {
    pub guid: Guid,
    pub descriptor: QueryDescriptor,
    pub materialized_table: String,
    pub tx: watch::Sender<Option<TabulaResult<TableDescription>>>,
    pub handle: BuildHandle,
}

#[derive(Default)]
struct Inner {
    guid_to_entry: HashMap<Guid, CacheEntry>,
    key_to_guid: HashMap<ConditionKey, Guid>,
    next_id: u64,
}

/// The guid ↔ entry registry.
pub struct GuidRegistry {
    inner: Mutex<Inner>,
    config: CacheConfig,
}

impl GuidRegistry {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, RegistryError> {
        self.inner.lock().map_err(|_| RegistryError::LockPoisoned)
    }

    /// Resolve a descriptor to its guid, allocating on first sight.
    ///
    /// Returns `(guid, is_new)`. Allocation happens under the registry
    /// lock, so concurrent resolves of the same novel descriptor yield
    /// one guid: the first writer wins and the rest observe `is_new =
    /// false`.
    pub fn resolve(&self, descriptor: &QueryDescriptor) -> TabulaResult<(Guid, bool)> {
        let key = ConditionKey::derive(descriptor)?;
        let mut inner = self.lock()?;
        if let Some(guid) = inner.key_to_guid.get(&key) {
            return Ok((guid.clone(), false));
        }
        inner.next_id += 1;
        let id = inner.next_id;
        let guid = Guid(format!("{}{}", self.config.guid_prefix, id));
        let materialized_table = format!("{}{}", self.config.table_prefix, id);
        let entry = CacheEntry {
            descriptor: descriptor.clone(),
            materialized_table,
            description: None,
            invalid: true,
            build: None,
        };
        inner.guid_to_entry.insert(guid.clone(), entry);
        inner.key_to_guid.insert(key, guid.clone());
        tracing::debug!(guid = %guid, table = %descriptor.table, "allocated cache entry");
        Ok((guid, true))
    }

    /// Snapshot the entry for a guid.
    pub fn get(&self, guid: &Guid) -> TabulaResult<CacheEntry> {
        let inner = self.lock()?;
        inner
            .guid_to_entry
            .get(guid)
            .cloned()
            .ok_or_else(|| {
                RegistryError::GuidNotFound {
                    guid: guid.to_string(),
                }
                .into()
            })
    }

    /// Remove every entry whose descriptor references `table`.
    ///
    /// This is the drop path, distinct from invalidation: the entries and
    /// their guids are gone for good. Returns the removed guids with
    /// their materialized table names so the caller can clean up the
    /// backing store.
    pub fn drop_table(&self, table: &str) -> TabulaResult<Vec<(Guid, String)>> {
        let mut inner = self.lock()?;
        let inner = &mut *inner;
        let doomed: Vec<Guid> = inner
            .guid_to_entry
            .iter()
            .filter(|(_, e)| e.descriptor.table == table)
            .map(|(g, _)| g.clone())
            .collect();
        let mut removed = Vec::with_capacity(doomed.len());
        for guid in doomed {
            if let Some(entry) = inner.guid_to_entry.remove(&guid) {
                removed.push((guid, entry.materialized_table));
            }
        }
        let guid_to_entry = &inner.guid_to_entry;
        inner
            .key_to_guid
            .retain(|_, guid| guid_to_entry.contains_key(guid));
        Ok(removed)
    }

    /// Number of live entries.
    pub fn entry_count(&self) -> TabulaResult<usize> {
        Ok(self.lock()?.guid_to_entry.len())
    }

    /// Decide atomically whether a build is needed for `guid`.
    pub(crate) fn begin_build(&self, guid: &Guid) -> TabulaResult<BuildDecision> {
        let mut inner = self.lock()?;
        let entry = inner.guid_to_entry.get_mut(guid).ok_or_else(|| {
            RegistryError::GuidNotFound {
                guid: guid.to_string(),
            }
        })?;

        if let Some(handle) = &entry.build {
            return Ok(BuildDecision::InFlight(handle.clone()));
        }
        if !entry.invalid {
            if let Some(description) = &entry.description {
                return Ok(BuildDecision::Ready(description.clone()));
            }
        }

        let (tx, rx) = watch::channel(None);
        let handle = BuildHandle::new(rx);
        entry.build = Some(handle.clone());
        Ok(BuildDecision::Start(BuildTicket {
            guid: guid.clone(),
            descriptor: entry.descriptor.clone(),
            materialized_table: entry.materialized_table.clone(),
            tx,
            handle,
        }))
    }

    /// Commit a build outcome.
    ///
    /// Success stores the description and clears the invalid flag;
    /// failure only clears the in-flight handle so a later call retries.
    /// A guid removed mid-build (base table dropped) is a no-op: the
    /// waiters still receive the result through the build handle.
    pub(crate) fn complete_build(
        &self,
        guid: &Guid,
        result: &TabulaResult<TableDescription>,
    ) -> TabulaResult<()> {
        let mut inner = self.lock()?;
        if let Some(entry) = inner.guid_to_entry.get_mut(guid) {
            entry.build = None;
            if let Ok(description) = result {
                entry.description = Some(description.clone());
                entry.invalid = false;
            }
        }
        Ok(())
    }

    /// Mark every idle, valid entry for `table` as stale.
    ///
    /// Entries already invalid are left untouched, and so are entries
    /// with a build in flight: that build's result is accepted as-is.
    /// Returns the number of entries flipped.
    pub(crate) fn mark_invalid_for_table(&self, table: &str) -> TabulaResult<usize> {
        let mut inner = self.lock()?;
        let mut flipped = 0;
        for entry in inner.guid_to_entry.values_mut() {
            if entry.descriptor.table == table && !entry.invalid && entry.build.is_none() {
                entry.invalid = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    /// Force one entry stale, e.g. after a read against its materialized
    /// table failed. Skipped when a build is already in flight.
    pub(crate) fn force_invalid(&self, guid: &Guid) -> TabulaResult<()> {
        let mut inner = self.lock()?;
        let entry = inner.guid_to_entry.get_mut(guid).ok_or_else(|| {
            RegistryError::GuidNotFound {
                guid: guid.to_string(),
            }
        })?;
        if entry.build.is_none() {
            entry.invalid = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tabula_core::TabulaError;

    fn registry() -> GuidRegistry {
        GuidRegistry::new(CacheConfig::default())
    }

    #[test]
    fn test_resolve_allocates_once_per_key() {
        let registry = registry();
        let descriptor = QueryDescriptor::table("t");
        let (guid1, new1) = registry.resolve(&descriptor).unwrap();
        let (guid2, new2) = registry.resolve(&descriptor).unwrap();
        assert!(new1);
        assert!(!new2);
        assert_eq!(guid1, guid2);
        assert_eq!(registry.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_fresh_entry_starts_invalid() {
        let registry = registry();
        let (guid, _) = registry.resolve(&QueryDescriptor::table("t")).unwrap();
        let entry = registry.get(&guid).unwrap();
        assert!(entry.invalid);
        assert!(entry.description.is_none());
        assert!(entry.build.is_none());
        assert!(!entry.is_fresh());
        assert!(entry.materialized_table.starts_with("tmpt_"));
    }

    #[test]
    fn test_get_unknown_guid_fails() {
        let registry = registry();
        let (guid, _) = registry.resolve(&QueryDescriptor::table("t")).unwrap();
        registry.drop_table("t").unwrap();
        let err = registry.get(&guid).unwrap_err();
        assert!(matches!(
            err,
            TabulaError::Registry(RegistryError::GuidNotFound { .. })
        ));
    }

    #[test]
    fn test_drop_table_scoped_to_one_table() {
        let registry = registry();
        let (t_guid, _) = registry.resolve(&QueryDescriptor::table("t")).unwrap();
        let (u_guid, _) = registry.resolve(&QueryDescriptor::table("u")).unwrap();

        let removed = registry.drop_table("t").unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0, t_guid);

        assert!(registry.get(&t_guid).is_err());
        assert!(registry.get(&u_guid).is_ok());

        // The key mapping is gone too: re-resolving allocates fresh.
        let (t_guid2, new) = registry.resolve(&QueryDescriptor::table("t")).unwrap();
        assert!(new);
        assert_ne!(t_guid2, t_guid);
    }

    #[test]
    fn test_concurrent_resolve_single_allocation() {
        let registry = Arc::new(registry());
        let descriptor = QueryDescriptor::table("t");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let descriptor = descriptor.clone();
                std::thread::spawn(move || registry.resolve(&descriptor).unwrap())
            })
            .collect();
        let results: Vec<(Guid, bool)> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let first = &results[0].0;
        assert!(results.iter().all(|(g, _)| g == first));
        assert_eq!(results.iter().filter(|(_, new)| *new).count(), 1);
        assert_eq!(registry.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_begin_build_transitions() {
        let registry = registry();
        let (guid, _) = registry.resolve(&QueryDescriptor::table("t")).unwrap();

        // Stale entry: first caller gets the ticket, second attaches.
        let ticket = match registry.begin_build(&guid).unwrap() {
            BuildDecision::Start(ticket) => ticket,
            _ => panic!("expected start"),
        };
        assert!(matches!(
            registry.begin_build(&guid).unwrap(),
            BuildDecision::InFlight(_)
        ));

        // Commit: entry becomes fresh and further calls are ready hits.
        let description = TableDescription {
            columns: vec![],
            row_count: 7,
        };
        registry
            .complete_build(&guid, &Ok(description.clone()))
            .unwrap();
        drop(ticket);
        match registry.begin_build(&guid).unwrap() {
            BuildDecision::Ready(d) => assert_eq!(d, description),
            _ => panic!("expected ready"),
        }
    }

    #[test]
    fn test_failed_build_leaves_entry_stale() {
        let registry = registry();
        let (guid, _) = registry.resolve(&QueryDescriptor::table("t")).unwrap();
        let _ticket = match registry.begin_build(&guid).unwrap() {
            BuildDecision::Start(ticket) => ticket,
            _ => panic!("expected start"),
        };
        registry
            .complete_build(
                &guid,
                &Err(tabula_core::StoreError::Backend {
                    reason: "boom".to_string(),
                }
                .into()),
            )
            .unwrap();
        let entry = registry.get(&guid).unwrap();
        assert!(entry.invalid);
        assert!(entry.build.is_none());
        assert!(entry.description.is_none());
    }

    #[test]
    fn test_mark_invalid_skips_building_and_stale_entries() {
        let registry = registry();
        let (idle, _) = registry.resolve(&QueryDescriptor::table("t")).unwrap();
        let (building, _) = registry
            .resolve(&QueryDescriptor::table("t").with_distinct("c"))
            .unwrap();
        let (other, _) = registry.resolve(&QueryDescriptor::table("u")).unwrap();
        let description = TableDescription {
            columns: vec![],
            row_count: 0,
        };

        // idle and the unrelated entry: built fresh.
        match registry.begin_build(&idle).unwrap() {
            BuildDecision::Start(_) => {}
            _ => panic!("expected start"),
        }
        registry.complete_build(&idle, &Ok(description.clone())).unwrap();
        match registry.begin_build(&other).unwrap() {
            BuildDecision::Start(_) => {}
            _ => panic!("expected start"),
        }
        registry.complete_build(&other, &Ok(description.clone())).unwrap();
        // building: leave its build in flight.
        let _ticket = match registry.begin_build(&building).unwrap() {
            BuildDecision::Start(ticket) => ticket,
            _ => panic!("expected start"),
        };

        assert_eq!(registry.mark_invalid_for_table("t").unwrap(), 1);
        assert!(registry.get(&idle).unwrap().invalid);
        assert!(!registry.get(&other).unwrap().invalid);

        // Idempotent: nothing left to flip.
        assert_eq!(registry.mark_invalid_for_table("t").unwrap(), 0);

        // The mid-build invalidation is swallowed: once the in-flight
        // build commits, its entry comes out fresh.
        registry.complete_build(&building, &Ok(description)).unwrap();
        assert!(registry.get(&building).unwrap().is_fresh());
    }
}
