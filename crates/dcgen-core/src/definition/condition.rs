//! Root and parent-child conditions between record types.

use dcgen_proto::{CompareOp, FilterExpr, Value};
use serde::{Deserialize, Serialize};

use crate::filter::FilterEvaluator;
use crate::record::Record;

fn default_op() -> CompareOp {
    CompareOp::Eq
}

/// Right-hand side of a relation filter rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// A property read from the related (parent) record.
    Property(String),
    /// A constant.
    Value(Value),
}

/// One rule of a declarative relation filter.
///
/// `local` always names a property of the record being filtered (the child,
/// or the root candidate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationFilter {
    /// `local <op> remote`.
    Compare {
        /// Property on the filtered record.
        local: String,
        /// Comparison operator.
        #[serde(default = "default_op")]
        op: CompareOp,
        /// Property of the parent, or a constant.
        remote: Operand,
    },
    /// All rules must hold.
    And(Vec<RelationFilter>),
    /// At least one rule must hold.
    Or(Vec<RelationFilter>),
}

impl RelationFilter {
    /// `local = parent.remote`.
    pub fn property(local: impl Into<String>, remote: impl Into<String>) -> Self {
        RelationFilter::Compare {
            local: local.into(),
            op: CompareOp::Eq,
            remote: Operand::Property(remote.into()),
        }
    }

    /// `local = value`.
    pub fn constant(local: impl Into<String>, value: impl Into<Value>) -> Self {
        RelationFilter::Compare {
            local: local.into(),
            op: CompareOp::Eq,
            remote: Operand::Value(value.into()),
        }
    }

    /// Resolve against a concrete parent into a store filter.
    ///
    /// Without a parent, property operands resolve to NULL.
    pub fn resolve(&self, parent: Option<&Record>) -> FilterExpr {
        match self {
            RelationFilter::Compare { local, op, remote } => {
                let value = match remote {
                    Operand::Property(name) => parent.map(|p| p.value(name)).unwrap_or(Value::Null),
                    Operand::Value(value) => value.clone(),
                };
                FilterExpr::compare(local.clone(), *op, value)
            }
            RelationFilter::And(rules) => {
                FilterExpr::And(rules.iter().map(|r| r.resolve(parent)).collect())
            }
            RelationFilter::Or(rules) => {
                FilterExpr::Or(rules.iter().map(|r| r.resolve(parent)).collect())
            }
        }
    }

    fn references_parent(&self) -> bool {
        match self {
            RelationFilter::Compare { remote, .. } => matches!(remote, Operand::Property(_)),
            RelationFilter::And(rules) | RelationFilter::Or(rules) => {
                rules.iter().any(RelationFilter::references_parent)
            }
        }
    }
}

/// How a relationship is written onto a child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOn {
    /// `child.to_field = parent.from_field`.
    Copy {
        /// Property written on the child.
        to_field: String,
        /// Property read from the parent.
        from_field: String,
    },
    /// `child.property = value`.
    Constant {
        /// Property written on the child.
        property: String,
        /// Constant value.
        value: Value,
    },
}

/// One rule of an inverse filter: `parent.local <op> child.remote`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverseRule {
    /// Property on the parent.
    pub local: String,
    /// Comparison operator.
    #[serde(default = "default_op")]
    pub op: CompareOp,
    /// Property on the child.
    pub remote: String,
}

fn and_all(parts: Vec<FilterExpr>) -> FilterExpr {
    match parts.len() {
        1 => parts.into_iter().next().unwrap_or(FilterExpr::And(Vec::new())),
        _ => FilterExpr::And(parts),
    }
}

/// Links a parent record type to a child record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentChildCondition {
    /// Parent record type.
    pub parent_type: String,
    /// Child record type.
    pub child_type: String,
    /// Rules a child must satisfy to belong to a parent (ANDed).
    #[serde(default)]
    pub filter: Vec<RelationFilter>,
    /// How the relationship is written onto a child.
    #[serde(default)]
    pub set_on: Vec<SetOn>,
    /// Rules locating the parent of a child (ANDed).
    #[serde(default)]
    pub inverse: Vec<InverseRule>,
}

impl ParentChildCondition {
    /// Create a condition without rules.
    pub fn new(parent_type: impl Into<String>, child_type: impl Into<String>) -> Self {
        Self {
            parent_type: parent_type.into(),
            child_type: child_type.into(),
            filter: Vec::new(),
            set_on: Vec::new(),
            inverse: Vec::new(),
        }
    }

    /// The common foreign-key shape: `child.child_field = parent.parent_field`,
    /// with matching set-on and inverse rules.
    pub fn by_field(
        parent_type: impl Into<String>,
        parent_field: impl Into<String>,
        child_type: impl Into<String>,
        child_field: impl Into<String>,
    ) -> Self {
        let parent_field = parent_field.into();
        let child_field = child_field.into();
        Self::new(parent_type, child_type)
            .with_filter(RelationFilter::property(child_field.clone(), parent_field.clone()))
            .with_set_on(SetOn::Copy {
                to_field: child_field.clone(),
                from_field: parent_field.clone(),
            })
            .with_inverse(InverseRule {
                local: parent_field,
                op: CompareOp::Eq,
                remote: child_field,
            })
    }

    /// Add a filter rule.
    pub fn with_filter(mut self, rule: RelationFilter) -> Self {
        self.filter.push(rule);
        self
    }

    /// Add a set-on rule.
    pub fn with_set_on(mut self, rule: SetOn) -> Self {
        self.set_on.push(rule);
        self
    }

    /// Add an inverse rule.
    pub fn with_inverse(mut self, rule: InverseRule) -> Self {
        self.inverse.push(rule);
        self
    }

    /// Whether parent and child are the same record type.
    pub fn is_self_referencing(&self) -> bool {
        self.parent_type == self.child_type
    }

    /// Filter selecting the children of `parent`.
    pub fn filter_for(&self, parent: &Record) -> FilterExpr {
        and_all(self.filter.iter().map(|r| r.resolve(Some(parent))).collect())
    }

    /// Whether `child` belongs to `parent` under this condition.
    pub fn matches(&self, parent: &Record, child: &Record) -> bool {
        parent.record_type() == self.parent_type
            && child.record_type() == self.child_type
            && FilterEvaluator::evaluate(&self.filter_for(parent), child)
    }

    /// Write the parent-identifying values of `parent` onto `child`.
    pub fn apply_to(&self, parent: &Record, child: &mut Record) {
        for rule in &self.set_on {
            match rule {
                SetOn::Copy {
                    to_field,
                    from_field,
                } => child.set(to_field.clone(), parent.value(from_field)),
                SetOn::Constant { property, value } => child.set(property.clone(), value.clone()),
            }
        }
    }

    /// Copy whatever parent-identifying values `source` carries onto `target`.
    pub fn copy_from(&self, source: &Record, target: &mut Record) {
        for rule in &self.set_on {
            match rule {
                SetOn::Copy { to_field, .. } => target.set(to_field.clone(), source.value(to_field)),
                SetOn::Constant { property, value } => {
                    target.set(property.clone(), value.clone())
                }
            }
        }
    }

    /// Filter locating the parent of `child` in the parent store.
    ///
    /// `None` when no inverse rules are declared or the child lacks one of the
    /// referenced values.
    pub fn inverse_filter_for(&self, child: &Record) -> Option<FilterExpr> {
        if self.inverse.is_empty() {
            return None;
        }

        let mut parts = Vec::with_capacity(self.inverse.len());
        for rule in &self.inverse {
            let value = child.value(&rule.remote);
            if value.is_null() {
                return None;
            }
            parts.push(FilterExpr::compare(rule.local.clone(), rule.op, value));
        }
        Some(and_all(parts))
    }
}

/// Identifies the top-level records of a hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCondition {
    /// Record type the roots belong to.
    pub record_type: String,
    /// Rules a root must satisfy (ANDed); remote operands must be constants.
    #[serde(default)]
    pub filter: Vec<RelationFilter>,
    /// Values written onto a record to make it a root; constants only.
    #[serde(default)]
    pub set_on: Vec<SetOn>,
}

impl RootCondition {
    /// Create a root condition without rules.
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            filter: Vec::new(),
            set_on: Vec::new(),
        }
    }

    /// Roots are records whose `field` equals `value`.
    pub fn by_field(
        record_type: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let field = field.into();
        let value = value.into();
        Self::new(record_type)
            .with_filter(RelationFilter::constant(field.clone(), value.clone()))
            .with_set_on(SetOn::Constant {
                property: field,
                value,
            })
    }

    /// Add a filter rule.
    pub fn with_filter(mut self, rule: RelationFilter) -> Self {
        self.filter.push(rule);
        self
    }

    /// Add a set-on rule.
    pub fn with_set_on(mut self, rule: SetOn) -> Self {
        self.set_on.push(rule);
        self
    }

    /// Store filter selecting all roots.
    pub fn filter(&self) -> FilterExpr {
        and_all(self.filter.iter().map(|r| r.resolve(None)).collect())
    }

    /// Whether `record` is a root.
    pub fn matches(&self, record: &Record) -> bool {
        record.record_type() == self.record_type
            && FilterEvaluator::evaluate(&self.filter(), record)
    }

    /// Write the root defaults onto `record`.
    pub fn apply_to(&self, record: &mut Record) {
        for rule in &self.set_on {
            if let SetOn::Constant { property, value } = rule {
                record.set(property.clone(), value.clone());
            }
        }
    }

    /// Whether any rule reads a parent property (invalid for roots).
    pub(crate) fn references_parent(&self) -> bool {
        self.filter.iter().any(RelationFilter::references_parent)
            || self.set_on.iter().any(|r| matches!(r, SetOn::Copy { .. }))
    }
}
