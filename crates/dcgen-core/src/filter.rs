//! Filter evaluation for data stores.
//!
//! This module provides the `FilterEvaluator` that evaluates filter expressions
//! from the query IR against record properties. Stores that cannot push
//! filters down to their backend evaluate them here.

use std::cmp::Ordering;

use dcgen_proto::{CompareOp, FilterExpr, Value};

use crate::record::Record;

/// Evaluates filter expressions against records.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Evaluate a filter expression against a record.
    ///
    /// Returns `true` if the record matches the filter, `false` otherwise.
    pub fn evaluate(filter: &FilterExpr, record: &Record) -> bool {
        match filter {
            FilterExpr::Compare { field, op, value } => match record.get(field) {
                Some(field_value) => Self::compare(&field_value, *op, value),
                None => false, // Missing field doesn't match
            },
            FilterExpr::In { field, values } => match record.get(field) {
                Some(fv) => values.iter().any(|v| fv.loosely_equals(v)),
                None => false,
            },
            FilterExpr::NotIn { field, values } => match record.get(field) {
                Some(fv) => !values.iter().any(|v| fv.loosely_equals(v)),
                None => true, // NULL is not in any set
            },
            FilterExpr::IsNull { field } => {
                matches!(record.get(field).as_deref(), None | Some(Value::Null))
            }
            FilterExpr::IsNotNull { field } => {
                !matches!(record.get(field).as_deref(), None | Some(Value::Null))
            }
            FilterExpr::Like { field, pattern } => match record.get(field).as_deref() {
                Some(Value::String(s)) => Self::like_match(s, pattern),
                _ => false,
            },
            FilterExpr::And(filters) => filters.iter().all(|f| Self::evaluate(f, record)),
            FilterExpr::Or(filters) => filters.iter().any(|f| Self::evaluate(f, record)),
        }
    }

    /// Apply a comparison operator to two values.
    pub fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
        match op {
            CompareOp::Eq => left.loosely_equals(right),
            CompareOp::Ne => !left.loosely_equals(right),
            CompareOp::Lt => left.compare(right) == Some(Ordering::Less),
            CompareOp::Le => matches!(left.compare(right), Some(Ordering::Less | Ordering::Equal)),
            CompareOp::Gt => left.compare(right) == Some(Ordering::Greater),
            CompareOp::Ge => {
                matches!(left.compare(right), Some(Ordering::Greater | Ordering::Equal))
            }
        }
    }

    /// Match a string against a LIKE pattern: `%` is any run of characters,
    /// `_` exactly one.
    pub fn like_match(value: &str, pattern: &str) -> bool {
        let value: Vec<char> = value.chars().collect();
        let pattern: Vec<char> = pattern.chars().collect();

        let (mut v, mut p) = (0, 0);
        // Last `%` seen and the value position it currently absorbs up to.
        let mut wildcard: Option<(usize, usize)> = None;

        while v < value.len() {
            match pattern.get(p).copied() {
                Some('%') => {
                    wildcard = Some((p, v));
                    p += 1;
                }
                Some('_') => {
                    v += 1;
                    p += 1;
                }
                Some(c) if c == value[v] => {
                    v += 1;
                    p += 1;
                }
                _ => match wildcard {
                    Some((star, absorbed)) => {
                        wildcard = Some((star, absorbed + 1));
                        p = star + 1;
                        v = absorbed + 1;
                    }
                    None => return false,
                },
            }
        }

        pattern[p..].iter().all(|c| *c == '%')
    }
}
