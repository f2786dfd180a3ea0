//! dcgen protocol types.
//!
//! Plain data shared between the dcgen engine and the data stores it drives.
//!
//! # Modules
//!
//! - [`value`] - Property values held by records
//! - [`id`] - Type-scoped identifiers and composite record ids
//! - [`query`] - Filter expressions and fetch requests
//! - [`error`] - Protocol error types

pub mod error;
pub mod id;
pub mod query;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use id::{Ident, RecordId, ID_SEPARATOR};
pub use query::{CompareOp, DataQuery, FilterExpr, OrderDirection, OrderSpec, Pagination};
pub use value::Value;
