//! Tabula Cache - Query Materialization
//!
//! Maps logical query descriptors to materialized temp tables and serves
//! repeated requests from the cache. The moving parts:
//!
//! - [`GuidRegistry`] owns the guid ↔ entry and key ↔ guid maps and is the
//!   single mutation entry point for cache-entry state.
//! - [`BuildCoordinator`] guarantees at most one in-flight materialization
//!   per guid and fans its outcome out to every concurrent waiter.
//! - [`InvalidationTracker`] marks entries stale after base-table writes
//!   without evicting them; the next lookup rebuilds in place.
//! - [`QueryFacade`] composes the above into the public resolve / read /
//!   write surface.
//!
//! # Consistency contract
//!
//! Invalidation arriving while a build is already in flight is swallowed
//! by that build: its result is accepted as-is. Callers needing stronger
//! freshness re-check and resolve again after the build completes. A read
//! in flight when an invalidation fires may return pre- or post-mutation
//! data.

pub mod build;
pub mod config;
pub mod facade;
pub mod invalidation;
pub mod registry;

pub use build::{BuildCoordinator, BuildHandle};
pub use config::CacheConfig;
pub use facade::{QueryFacade, ResolvedQuery};
pub use invalidation::InvalidationTracker;
pub use registry::{CacheEntry, Guid, GuidRegistry};
