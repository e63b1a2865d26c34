//! Tabula Core - Descriptor Types
//!
//! Pure data structures shared by the engine and the cache: query
//! descriptors, condition trees, table metadata, the error taxonomy and
//! canonical cache-key derivation. No business logic beyond validation
//! and canonicalization lives here.

pub mod condition;
pub mod descriptor;
pub mod error;
pub mod key;
pub mod table;

pub use condition::{BoolOp, CompoundCondition, Condition, RangeCondition, ValueCondition};
pub use descriptor::{ColumnOrder, QueryDescriptor, SortDirection};
pub use error::{
    CacheError, DescriptorError, RegistryError, StoreError, TabulaError, TabulaResult,
};
pub use key::ConditionKey;
pub use table::{
    AggregateFn, AggregateSpec, ColumnInfo, ColumnType, Row, TableDescription,
};
