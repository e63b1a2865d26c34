//! Canonical cache-key derivation for query descriptors.
//!
//! Two descriptors map to the same materialized table iff they derive the
//! same [`ConditionKey`]. Derivation is deterministic and normalizes the
//! equivalent spellings of "no filter" and "no distinct column", while
//! keeping `columns: None` (all columns) distinct from an explicit empty
//! projection. Child order inside compound conditions is preserved:
//! reordering the children of a commutative operator is a cache miss, not
//! a hit.

use std::fmt;

use crate::condition::{BoolOp, Condition};
use crate::descriptor::{QueryDescriptor, SortDirection};
use crate::error::DescriptorError;

/// Canonical, hashable identity of one query descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionKey(String);

impl ConditionKey {
    /// Derive the canonical key for a descriptor.
    ///
    /// Fails with [`DescriptorError::Invalid`] on malformed descriptors
    /// rather than producing a potentially colliding key; over valid
    /// descriptors derivation is pure and total.
    pub fn derive(descriptor: &QueryDescriptor) -> Result<Self, DescriptorError> {
        descriptor.validate()?;

        let mut out = String::with_capacity(64);
        out.push_str("t=");
        write_str(&mut out, &descriptor.table);

        out.push_str("|f=");
        match &descriptor.filter {
            Some(filter) => write_condition(&mut out, filter),
            // Absent filter is canonically the empty conjunction.
            None => out.push_str("and()"),
        }

        out.push_str("|c=");
        match &descriptor.columns {
            // "All columns" must not collide with an explicit empty list.
            None => out.push('*'),
            Some(columns) => {
                out.push('[');
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_str(&mut out, column);
                }
                out.push(']');
            }
        }

        out.push_str("|o=[");
        for (i, order) in descriptor.order.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write_str(&mut out, &order.column);
            out.push(match order.direction {
                SortDirection::Asc => '+',
                SortDirection::Desc => '-',
            });
        }
        out.push(']');

        out.push_str("|d=");
        match descriptor.distinct_column() {
            Some(column) => write_str(&mut out, column),
            None => out.push('-'),
        }

        Ok(Self(out))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Write a string as a JSON-quoted token so separator characters inside
/// names cannot forge key structure.
fn write_str(out: &mut String, s: &str) {
    // Serializing a &str cannot fail.
    out.push_str(&serde_json::to_string(s).unwrap_or_default());
}

fn write_condition(out: &mut String, condition: &Condition) {
    match condition {
        Condition::Value(v) => {
            out.push_str("v(");
            write_str(out, &v.column);
            out.push(';');
            // Deterministic for the scalar/array values validation admits.
            out.push_str(&serde_json::to_string(&v.value).unwrap_or_default());
            out.push(';');
            out.push(if v.like { 'L' } else { 'l' });
            out.push(if v.inverse { 'N' } else { 'n' });
            out.push(')');
        }
        Condition::Range(r) => {
            out.push_str("r(");
            write_str(out, &r.column);
            out.push(';');
            out.push_str(&r.min.to_string());
            out.push(';');
            out.push_str(&r.max.to_string());
            out.push(')');
        }
        Condition::Compound(c) => {
            out.push_str(match c.op {
                BoolOp::And => "and(",
                BoolOp::Or => "or(",
            });
            for (i, child) in c.values.iter().enumerate() {
                if i > 0 {
                    out.push(';');
                }
                write_condition(out, child);
            }
            out.push(')');
        }
    }
}
