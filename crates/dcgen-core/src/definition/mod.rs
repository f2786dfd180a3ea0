//! Relationship definitions.
//!
//! A [`Definition`] describes one logical hierarchy: which records are roots,
//! how record types link to each other, which properties a copy must drop and
//! how siblings are ordered. Definitions are validated once when loaded and
//! are read-only afterwards.

mod condition;
mod model;

pub use condition::{InverseRule, Operand, ParentChildCondition, RelationFilter, RootCondition, SetOn};
pub use model::{Definition, Mode, PropertyFlags};
