//! Query IR handed to data stores.

use serde::{Deserialize, Serialize};

use crate::id::Ident;
use crate::value::Value;

/// Comparison operator for field filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// Field equals value.
    #[serde(rename = "=")]
    Eq,
    /// Field not equals value.
    #[serde(rename = "!=")]
    Ne,
    /// Field less than value.
    #[serde(rename = "<")]
    Lt,
    /// Field less than or equal to value.
    #[serde(rename = "<=")]
    Le,
    /// Field greater than value.
    #[serde(rename = ">")]
    Gt,
    /// Field greater than or equal to value.
    #[serde(rename = ">=")]
    Ge,
}

impl CompareOp {
    /// The operator with both sides swapped (`a < b` becomes `b > a`).
    pub fn flipped(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Ne => CompareOp::Ne,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
        }
    }
}

/// A filter expression evaluated by data stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    /// Compare a field against a value.
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// Field is in a set of values.
    In { field: String, values: Vec<Value> },
    /// Field is not in a set of values.
    NotIn { field: String, values: Vec<Value> },
    /// Field is null or missing.
    IsNull { field: String },
    /// Field is present and not null.
    IsNotNull { field: String },
    /// Field matches a LIKE pattern (`%` and `_` wildcards).
    Like { field: String, pattern: String },
    /// All conditions must be true.
    And(Vec<FilterExpr>),
    /// At least one condition must be true.
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    /// Create a comparison filter.
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        FilterExpr::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    /// Create a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    /// Create a less-than filter.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    /// Create a greater-than filter.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    /// Create an IN filter.
    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::In {
            field: field.into(),
            values,
        }
    }

    /// Create an IS NULL filter.
    pub fn is_null(field: impl Into<String>) -> Self {
        FilterExpr::IsNull {
            field: field.into(),
        }
    }

    /// Create a LIKE filter.
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        FilterExpr::Like {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    /// Create an AND of several expressions.
    pub fn and(exprs: Vec<FilterExpr>) -> Self {
        FilterExpr::And(exprs)
    }

    /// Create an OR of several expressions.
    pub fn or(exprs: Vec<FilterExpr>) -> Self {
        FilterExpr::Or(exprs)
    }

    /// Combine with another expression using AND, flattening nested ANDs.
    pub fn and_also(self, other: FilterExpr) -> Self {
        match (self, other) {
            (FilterExpr::And(mut left), FilterExpr::And(right)) => {
                left.extend(right);
                FilterExpr::And(left)
            }
            (FilterExpr::And(mut left), other) => {
                left.push(other);
                FilterExpr::And(left)
            }
            (this, FilterExpr::And(mut right)) => {
                right.insert(0, this);
                FilterExpr::And(right)
            }
            (this, other) => FilterExpr::And(vec![this, other]),
        }
    }
}

/// Order specification for sorting results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Field to order by.
    pub field: String,
    /// Sort direction.
    #[serde(default)]
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create an ascending order spec.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order spec.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    /// Descending order.
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

/// Pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of results to return.
    pub limit: u32,
    /// Number of results to skip.
    pub offset: u32,
}

impl Pagination {
    /// Create pagination with limit and offset.
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    /// Create pagination with just a limit.
    pub fn limit(limit: u32) -> Self {
        Self { limit, offset: 0 }
    }
}

/// A fetch request against one data store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuery {
    /// Optional filter expression.
    pub filter: Option<FilterExpr>,
    /// Sort order, applied in sequence.
    pub sorting: Vec<OrderSpec>,
    /// Restrict to a single identifier.
    pub id: Option<Ident>,
    /// Only identifiers are needed; stores may omit other properties.
    pub id_only: bool,
    /// Optional pagination.
    pub pagination: Option<Pagination>,
}

impl DataQuery {
    /// Create an empty query matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the filter.
    pub fn set_filter(&mut self, filter: FilterExpr) -> &mut Self {
        self.filter = Some(filter);
        self
    }

    /// AND an additional filter onto the existing one.
    pub fn add_filter(&mut self, filter: FilterExpr) -> &mut Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and_also(filter),
            None => filter,
        });
        self
    }

    /// Replace the sort order.
    pub fn set_sorting(&mut self, sorting: Vec<OrderSpec>) -> &mut Self {
        self.sorting = sorting;
        self
    }

    /// Restrict to one identifier.
    pub fn set_id(&mut self, id: Ident) -> &mut Self {
        self.id = Some(id);
        self
    }

    /// Request identifiers only.
    pub fn set_id_only(&mut self, id_only: bool) -> &mut Self {
        self.id_only = id_only;
        self
    }

    /// Set pagination.
    pub fn set_pagination(&mut self, pagination: Pagination) -> &mut Self {
        self.pagination = Some(pagination);
        self
    }

    /// Builder form of [`DataQuery::add_filter`].
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.add_filter(filter);
        self
    }

    /// Builder form of [`DataQuery::set_sorting`].
    pub fn with_sorting(mut self, sorting: Vec<OrderSpec>) -> Self {
        self.sorting = sorting;
        self
    }

    /// Builder form of [`DataQuery::set_id`].
    pub fn with_id(mut self, id: impl Into<Ident>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder form of [`DataQuery::set_pagination`].
    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}
