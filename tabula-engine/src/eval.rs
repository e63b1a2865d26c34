//! Row-level condition evaluation and value ordering.
//!
//! Semantics are SQL-ish over JSON values: numbers compare numerically
//! regardless of integer/float spelling, LIKE patterns support `%` and
//! `_` wildcards and match case-insensitively, and a missing column reads
//! as null (which matches nothing except via `inverse`).

use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use tabula_core::{BoolOp, Condition, Row, StoreError};

/// Evaluate a condition tree against one row.
pub fn matches(condition: &Condition, row: &Row) -> Result<bool, StoreError> {
    match condition {
        Condition::Value(v) => {
            let cell = row.get(&v.column).unwrap_or(&Value::Null);
            let hit = match &v.value {
                Value::Array(candidates) => {
                    candidates.iter().any(|c| values_equal(cell, c))
                }
                pattern if v.like => like_matches(pattern, cell)?,
                scalar => values_equal(cell, scalar),
            };
            Ok(hit != v.inverse)
        }
        Condition::Range(r) => {
            let cell = row.get(&r.column).unwrap_or(&Value::Null);
            Ok(match as_f64(cell) {
                Some(n) => n >= r.min && n <= r.max,
                None => false,
            })
        }
        Condition::Compound(c) => {
            match c.op {
                BoolOp::And => {
                    for child in &c.values {
                        if !matches(child, row)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                BoolOp::Or => {
                    for child in &c.values {
                        if matches(child, row)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
            }
        }
    }
}

/// Equality with numeric coercion: `1` equals `1.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn like_matches(pattern: &Value, cell: &Value) -> Result<bool, StoreError> {
    let pattern = pattern.as_str().unwrap_or_default();
    let cell = match cell.as_str() {
        Some(s) => s,
        None => return Ok(false),
    };
    let regex = like_to_regex(pattern)?;
    Ok(regex.is_match(cell))
}

/// Translate a SQL-LIKE pattern into an anchored case-insensitive regex.
fn like_to_regex(pattern: &str) -> Result<Regex, StoreError> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| StoreError::Backend {
        reason: format!("bad LIKE pattern {:?}: {}", pattern, e),
    })
}

/// Total ordering over JSON cell values for sorting.
///
/// Null sorts first, then booleans, then numbers, then strings, then
/// everything else (compared by serialization, rare in practice).
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(_), Value::Number(_)) => {
            let x = as_f64(a).unwrap_or(f64::NAN);
            let y = as_f64(b).unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ if rank(a) != rank(b) => rank(a).cmp(&rank(b)),
        _ => a.to_string().cmp(&b.to_string()),
    }
}
