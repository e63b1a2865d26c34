//! In-memory reference implementation of [`TableStore`].
//!
//! Tables live behind a `tokio::sync::RwLock`. Materialization applies the
//! descriptor pipeline (filter, sort, distinct, project) and replaces the
//! destination table wholesale, which makes it idempotent by construction.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tabula_core::{
    AggregateFn, AggregateSpec, ColumnInfo, Condition, QueryDescriptor, Row, SortDirection,
    StoreError, TableDescription,
};
use tokio::sync::RwLock;

use crate::eval::{compare_values, matches, values_equal};
use crate::store::TableStore;

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
}

/// In-memory relational backend.
#[derive(Debug, Default)]
pub struct MemoryTableStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tables currently held, base and materialized alike.
    pub async fn table_count(&self) -> usize {
        self.tables.read().await.len()
    }

    pub async fn contains_table(&self, table: &str) -> bool {
        self.tables.read().await.contains_key(table)
    }
}

fn column_not_found(table: &str, column: &str) -> StoreError {
    StoreError::ColumnNotFound {
        table: table.to_string(),
        column: column.to_string(),
    }
}

fn require_column(table: &Table, name: &str, column: &str) -> Result<(), StoreError> {
    if table.columns.iter().any(|c| c.name == column) {
        Ok(())
    } else {
        Err(column_not_found(name, column))
    }
}

/// Multi-key row comparison following the descriptor's sort order.
fn compare_rows(a: &Row, b: &Row, order: &[(String, SortDirection)]) -> Ordering {
    for (column, direction) in order {
        let va = a.get(column).unwrap_or(&Value::Null);
        let vb = b.get(column).unwrap_or(&Value::Null);
        let ord = match direction {
            SortDirection::Asc => compare_values(va, vb),
            SortDirection::Desc => compare_values(vb, va),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn create_table(
        &self,
        table: &str,
        columns: Vec<ColumnInfo>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(table) {
            return Err(StoreError::TableExists {
                table: table.to_string(),
            });
        }
        tables.insert(
            table.to_string(),
            Table {
                columns,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| StoreError::TableNotFound {
                table: table.to_string(),
            })
    }

    async fn materialize(
        &self,
        descriptor: &QueryDescriptor,
        dest_table: &str,
    ) -> Result<TableDescription, StoreError> {
        let (projected, mut rows, order) = {
            let tables = self.tables.read().await;
            let base =
                tables
                    .get(&descriptor.table)
                    .ok_or_else(|| StoreError::TableNotFound {
                        table: descriptor.table.clone(),
                    })?;

            let projected: Vec<ColumnInfo> = match &descriptor.columns {
                None => base.columns.clone(),
                Some(names) => names
                    .iter()
                    .map(|n| {
                        base.columns
                            .iter()
                            .find(|c| &c.name == n)
                            .cloned()
                            .ok_or_else(|| column_not_found(&descriptor.table, n))
                    })
                    .collect::<Result<_, _>>()?,
            };
            for o in &descriptor.order {
                require_column(base, &descriptor.table, &o.column)?;
            }
            if let Some(distinct) = descriptor.distinct_column() {
                require_column(base, &descriptor.table, distinct)?;
            }

            let mut rows = Vec::new();
            for row in &base.rows {
                let keep = match &descriptor.filter {
                    Some(filter) => matches(filter, row)?,
                    None => true,
                };
                if keep {
                    rows.push(row.clone());
                }
            }
            let order: Vec<(String, SortDirection)> = descriptor
                .order
                .iter()
                .map(|o| (o.column.clone(), o.direction))
                .collect();
            (projected, rows, order)
        };

        if !order.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, &order));
        }

        if let Some(distinct) = descriptor.distinct_column() {
            let mut seen: Vec<Value> = Vec::new();
            rows.retain(|row| {
                let cell = row.get(distinct).cloned().unwrap_or(Value::Null);
                if seen.iter().any(|s| values_equal(s, &cell)) {
                    false
                } else {
                    seen.push(cell);
                    true
                }
            });
        }

        let rows: Vec<Row> = rows
            .into_iter()
            .map(|row| {
                projected
                    .iter()
                    .map(|c| {
                        (
                            c.name.clone(),
                            row.get(&c.name).cloned().unwrap_or(Value::Null),
                        )
                    })
                    .collect()
            })
            .collect();

        let description = TableDescription {
            columns: projected.clone(),
            row_count: rows.len() as u64,
        };

        let mut tables = self.tables.write().await;
        tables.insert(
            dest_table.to_string(),
            Table {
                columns: projected,
                rows,
            },
        );
        Ok(description)
    }

    async fn read_rows(
        &self,
        table: &str,
        from: u64,
        count: u64,
    ) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables.read().await;
        let table = tables.get(table).ok_or_else(|| StoreError::TableNotFound {
            table: table.to_string(),
        })?;
        let from = from as usize;
        if from >= table.rows.len() {
            return Ok(Vec::new());
        }
        Ok(table.rows[from..]
            .iter()
            .take(count as usize)
            .cloned()
            .collect())
    }

    async fn aggregate(
        &self,
        table: &str,
        specs: &[AggregateSpec],
    ) -> Result<Vec<Value>, StoreError> {
        let tables = self.tables.read().await;
        let name = table;
        let table = tables.get(name).ok_or_else(|| StoreError::TableNotFound {
            table: name.to_string(),
        })?;

        let mut results = Vec::with_capacity(specs.len());
        for spec in specs {
            require_column(table, name, &spec.column)?;
            let cells: Vec<&Value> = table
                .rows
                .iter()
                .map(|r| r.get(&spec.column).unwrap_or(&Value::Null))
                .filter(|v| !v.is_null())
                .collect();

            let value = match spec.func {
                AggregateFn::Count => Value::from(cells.len() as u64),
                AggregateFn::Min => cells
                    .iter()
                    .min_by(|a, b| compare_values(a, b))
                    .map(|v| (*v).clone())
                    .unwrap_or(Value::Null),
                AggregateFn::Max => cells
                    .iter()
                    .max_by(|a, b| compare_values(a, b))
                    .map(|v| (*v).clone())
                    .unwrap_or(Value::Null),
                AggregateFn::Sum | AggregateFn::Avg => {
                    let mut sum = 0.0;
                    let mut n = 0u64;
                    for cell in &cells {
                        let x = cell.as_f64().ok_or_else(|| StoreError::TypeMismatch {
                            column: spec.column.clone(),
                            reason: "aggregate over non-numeric value".to_string(),
                        })?;
                        sum += x;
                        n += 1;
                    }
                    if n == 0 {
                        Value::Null
                    } else if spec.func == AggregateFn::Sum {
                        Value::from(sum)
                    } else {
                        Value::from(sum / n as f64)
                    }
                }
            };
            results.push(value);
        }
        Ok(results)
    }

    async fn push_rows(&self, table: &str, rows: Vec<Row>) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let name = table;
        let table = tables
            .get_mut(name)
            .ok_or_else(|| StoreError::TableNotFound {
                table: name.to_string(),
            })?;
        for row in &rows {
            for column in row.keys() {
                if !table.columns.iter().any(|c| &c.name == column) {
                    return Err(column_not_found(name, column));
                }
            }
        }
        let pushed = rows.len() as u64;
        table.rows.extend(rows);
        Ok(pushed)
    }

    async fn update_rows(
        &self,
        table: &str,
        filter: Option<&Condition>,
        assignments: &Row,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let name = table;
        let table = tables
            .get_mut(name)
            .ok_or_else(|| StoreError::TableNotFound {
                table: name.to_string(),
            })?;
        for column in assignments.keys() {
            if !table.columns.iter().any(|c| &c.name == column) {
                return Err(column_not_found(name, column));
            }
        }
        let mut updated = 0;
        for row in &mut table.rows {
            let hit = match filter {
                Some(f) => matches(f, row)?,
                None => true,
            };
            if hit {
                for (column, value) in assignments {
                    row.insert(column.clone(), value.clone());
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_rows(
        &self,
        table: &str,
        filter: Option<&Condition>,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let name = table;
        let table = tables
            .get_mut(name)
            .ok_or_else(|| StoreError::TableNotFound {
                table: name.to_string(),
            })?;
        let mut kept = Vec::with_capacity(table.rows.len());
        let mut deleted = 0;
        for row in table.rows.drain(..) {
            let hit = match filter {
                Some(f) => matches(f, &row)?,
                None => true,
            };
            if hit {
                deleted += 1;
            } else {
                kept.push(row);
            }
        }
        table.rows = kept;
        Ok(deleted)
    }
}
