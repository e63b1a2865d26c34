//! Query descriptors: the logical identity of one virtual view.

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::error::DescriptorError;

/// Sort direction for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One entry in a descriptor's sort order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnOrder {
    pub column: String,
    pub direction: SortDirection,
}

impl ColumnOrder {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Immutable description of a logical query over one base table.
///
/// Two descriptors identify the same cached view iff their canonical
/// serialization (see [`crate::key::ConditionKey`]) is byte-equal.
///
/// `columns: None` means "all columns" and is distinct from an explicit
/// empty projection. `filter: None` is equivalent to an empty AND
/// compound. `distinct: Some("")` is normalized to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub table: String,
    #[serde(default)]
    pub filter: Option<Condition>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub order: Vec<ColumnOrder>,
    #[serde(default)]
    pub distinct: Option<String>,
}

impl QueryDescriptor {
    /// Unfiltered, unprojected view of a whole table.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            columns: None,
            order: Vec::new(),
            distinct: None,
        }
    }

    pub fn with_filter(mut self, filter: Condition) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with_order(mut self, order: Vec<ColumnOrder>) -> Self {
        self.order = order;
        self
    }

    pub fn with_distinct(mut self, column: impl Into<String>) -> Self {
        self.distinct = Some(column.into());
        self
    }

    /// The distinct column with the empty-string spelling normalized away.
    pub fn distinct_column(&self) -> Option<&str> {
        self.distinct.as_deref().filter(|c| !c.is_empty())
    }

    /// Validate the descriptor shape, including the filter tree.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.table.is_empty() {
            return Err(DescriptorError::invalid("descriptor has empty table name"));
        }
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        if let Some(columns) = &self.columns {
            if columns.iter().any(|c| c.is_empty()) {
                return Err(DescriptorError::invalid(
                    "projection contains an empty column name",
                ));
            }
        }
        if self.order.iter().any(|o| o.column.is_empty()) {
            return Err(DescriptorError::invalid(
                "sort order contains an empty column name",
            ));
        }
        if let (Some(distinct), Some(columns)) = (self.distinct_column(), &self.columns) {
            if !columns.iter().any(|c| c == distinct) {
                return Err(DescriptorError::invalid(format!(
                    "distinct column {} is not in the projection",
                    distinct
                )));
            }
        }
        Ok(())
    }
}
