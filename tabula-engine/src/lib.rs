//! Tabula Engine - Relational Backend
//!
//! The [`TableStore`] trait is the narrow contract the cache consumes:
//! table lifecycle, row mutation, idempotent materialization of one query
//! descriptor into a destination table, and reads over materialized
//! tables. [`MemoryTableStore`] is a complete in-memory implementation
//! used as the reference backend and in tests.

pub mod eval;
pub mod memory;
pub mod store;

pub use memory::MemoryTableStore;
pub use store::TableStore;
