//! Table metadata and row types shared by the engine and the cache.

use serde::{Deserialize, Serialize};

/// Column value type as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Number,
    Boolean,
    Json,
}

/// Name and type of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Shape and size of one materialized table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescription {
    pub columns: Vec<ColumnInfo>,
    pub row_count: u64,
}

/// One row, keyed by column name. Insertion order follows column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Aggregate function over one column of a materialized table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Min,
    Max,
    Sum,
    Count,
    Avg,
}

/// One requested aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub column: String,
    pub func: AggregateFn,
}

impl AggregateSpec {
    pub fn new(column: impl Into<String>, func: AggregateFn) -> Self {
        Self {
            column: column.into(),
            func,
        }
    }
}
