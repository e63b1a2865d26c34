//! Filter condition trees for query descriptors.
//!
//! A condition is a closed tagged union of three shapes: a value test
//! against one column, a numeric range test, or a boolean compound over
//! an ordered list of children. Conditions arrive from loosely-typed
//! client input, so every shape is validated before it participates in
//! cache-key derivation or evaluation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DescriptorError;

/// Boolean operator joining the children of a compound condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolOp {
    And,
    Or,
}

/// Test one column against a scalar or an IN-list.
///
/// An array `value` means set membership. `like` switches string
/// comparison to SQL-LIKE pattern matching (`%` and `_` wildcards);
/// `inverse` negates the whole test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCondition {
    pub column: String,
    pub value: Value,
    #[serde(default)]
    pub like: bool,
    #[serde(default)]
    pub inverse: bool,
}

/// Inclusive numeric range test on one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeCondition {
    pub column: String,
    pub min: f64,
    pub max: f64,
}

/// Boolean combination of child conditions.
///
/// Child order is significant for cache-key purposes: reordering the
/// children of a commutative operator produces a different key and
/// therefore a cache miss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundCondition {
    pub op: BoolOp,
    pub values: Vec<Condition>,
}

/// A filter condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Condition {
    Value(ValueCondition),
    Range(RangeCondition),
    Compound(CompoundCondition),
}

impl Condition {
    /// Equality test: `column == value`.
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self::Value(ValueCondition {
            column: column.into(),
            value,
            like: false,
            inverse: false,
        })
    }

    /// SQL-LIKE pattern test against a string column.
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Value(ValueCondition {
            column: column.into(),
            value: Value::String(pattern.into()),
            like: true,
            inverse: false,
        })
    }

    /// Set-membership test: `column IN values`.
    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::Value(ValueCondition {
            column: column.into(),
            value: Value::Array(values),
            like: false,
            inverse: false,
        })
    }

    /// Inclusive numeric range test: `min <= column <= max`.
    pub fn range(column: impl Into<String>, min: f64, max: f64) -> Self {
        Self::Range(RangeCondition {
            column: column.into(),
            min,
            max,
        })
    }

    /// Conjunction of child conditions. An empty conjunction matches all rows.
    pub fn and(values: Vec<Condition>) -> Self {
        Self::Compound(CompoundCondition {
            op: BoolOp::And,
            values,
        })
    }

    /// Disjunction of child conditions.
    pub fn or(values: Vec<Condition>) -> Self {
        Self::Compound(CompoundCondition {
            op: BoolOp::Or,
            values,
        })
    }

    /// Negate a value condition. Compounds and ranges have no inverse form.
    pub fn negated(self) -> Self {
        match self {
            Self::Value(mut v) => {
                v.inverse = !v.inverse;
                Self::Value(v)
            }
            other => other,
        }
    }

    /// Validate the condition shape, recursively.
    ///
    /// Malformed shapes fail fast here rather than silently producing a
    /// colliding cache key or a nonsense evaluation.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        match self {
            Self::Value(v) => {
                if v.column.is_empty() {
                    return Err(DescriptorError::invalid("value condition has empty column"));
                }
                match &v.value {
                    Value::Null => {
                        return Err(DescriptorError::invalid(format!(
                            "value condition on column {} has null value",
                            v.column
                        )));
                    }
                    Value::Object(_) => {
                        return Err(DescriptorError::invalid(format!(
                            "value condition on column {} has object value",
                            v.column
                        )));
                    }
                    Value::Array(items) => {
                        if items.is_empty() {
                            return Err(DescriptorError::invalid(format!(
                                "value condition on column {} has empty IN-list",
                                v.column
                            )));
                        }
                        if items.iter().any(|i| i.is_object() || i.is_array()) {
                            return Err(DescriptorError::invalid(format!(
                                "IN-list on column {} contains non-scalar values",
                                v.column
                            )));
                        }
                    }
                    _ => {}
                }
                if v.like && !v.value.is_string() {
                    return Err(DescriptorError::invalid(format!(
                        "like condition on column {} requires a string pattern",
                        v.column
                    )));
                }
                Ok(())
            }
            Self::Range(r) => {
                if r.column.is_empty() {
                    return Err(DescriptorError::invalid("range condition has empty column"));
                }
                if !r.min.is_finite() || !r.max.is_finite() {
                    return Err(DescriptorError::invalid(format!(
                        "range condition on column {} has non-finite bound",
                        r.column
                    )));
                }
                if r.min > r.max {
                    return Err(DescriptorError::invalid(format!(
                        "range condition on column {} has min > max",
                        r.column
                    )));
                }
                Ok(())
            }
            Self::Compound(c) => {
                for child in &c.values {
                    child.validate()?;
                }
                Ok(())
            }
        }
    }
}
