//! Record identifiers.
//!
//! An [`Ident`] is scoped to one record type; a [`RecordId`] pairs it with the
//! type name so a record can be referenced without loading it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::value::Value;

/// Separator between record type and identifier in the serialized form.
pub const ID_SEPARATOR: &str = "::";

/// A type-scoped record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ident {
    /// Numeric identifier (auto-increment style stores).
    Int(i64),
    /// String identifier (uuid style stores).
    Str(String),
}

impl Ident {
    /// Convert a property value into an identifier.
    ///
    /// Returns `None` for nulls, booleans and floats with a fractional part.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(Ident::Int(*i)),
            Value::Float(f) if f.fract() == 0.0 => Some(Ident::Int(*f as i64)),
            Value::String(s) if !s.is_empty() => Some(Ident::Str(s.clone())),
            _ => None,
        }
    }

    /// Encode as JSON, the form used inside a serialized [`RecordId`].
    pub fn to_json(&self) -> String {
        match self {
            Ident::Int(i) => i.to_string(),
            Ident::Str(s) => serde_json::Value::String(s.clone()).to_string(),
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ident::Int(i) => write!(f, "{}", i),
            Ident::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Ident {
    fn from(v: i64) -> Self {
        Ident::Int(v)
    }
}

impl From<i32> for Ident {
    fn from(v: i32) -> Self {
        Ident::Int(v as i64)
    }
}

impl From<&str> for Ident {
    fn from(v: &str) -> Self {
        Ident::Str(v.to_string())
    }
}

impl From<String> for Ident {
    fn from(v: String) -> Self {
        Ident::Str(v)
    }
}

impl From<Ident> for Value {
    fn from(v: Ident) -> Self {
        match v {
            Ident::Int(i) => Value::Int(i),
            Ident::Str(s) => Value::String(s),
        }
    }
}

impl From<&Ident> for Value {
    fn from(v: &Ident) -> Self {
        v.clone().into()
    }
}

/// Composite key of a record: (record type, identifier).
///
/// Serialized as `<record_type>::<json(id)>`, e.g. `tl_page::42` or
/// `tl_page::"a1b2"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId {
    /// Record type (data store name).
    pub record_type: String,
    /// Identifier within the record type.
    pub id: Ident,
}

impl RecordId {
    /// Create a new record id.
    pub fn new(record_type: impl Into<String>, id: impl Into<Ident>) -> Self {
        Self {
            record_type: record_type.into(),
            id: id.into(),
        }
    }

    /// Serialize to the `type::json` form.
    pub fn to_serialized(&self) -> String {
        format!("{}{}{}", self.record_type, ID_SEPARATOR, self.id.to_json())
    }

    /// Parse the `type::json` form.
    pub fn parse(serialized: &str) -> Result<Self, Error> {
        let (record_type, raw_id) = serialized
            .split_once(ID_SEPARATOR)
            .ok_or_else(|| Error::InvalidId(serialized.to_string()))?;

        if record_type.is_empty() || raw_id.is_empty() {
            return Err(Error::InvalidId(serialized.to_string()));
        }

        let id = match serde_json::from_str::<serde_json::Value>(raw_id) {
            Ok(serde_json::Value::Number(n)) => n
                .as_i64()
                .map(Ident::Int)
                .ok_or_else(|| Error::InvalidId(serialized.to_string()))?,
            Ok(serde_json::Value::String(s)) if !s.is_empty() => Ident::Str(s),
            _ => return Err(Error::InvalidId(serialized.to_string())),
        };

        Ok(Self {
            record_type: record_type.to_string(),
            id,
        })
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_serialized())
    }
}

impl TryFrom<String> for RecordId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RecordId::parse(&value)
    }
}

impl From<RecordId> for String {
    fn from(value: RecordId) -> Self {
        value.to_serialized()
    }
}

impl std::str::FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordId::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_form() {
        assert_eq!(RecordId::new("tl_page", 42).to_serialized(), "tl_page::42");
        assert_eq!(RecordId::new("tl_page", "a1").to_serialized(), r#"tl_page::"a1""#);
    }

    #[test]
    fn test_parse() {
        let id = RecordId::parse("tl_page::42").unwrap();
        assert_eq!(id, RecordId::new("tl_page", 42));

        let id = RecordId::parse(r#"tl_news::"x-1""#).unwrap();
        assert_eq!(id.id, Ident::Str("x-1".into()));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["tl_page", "::5", "tl_page::", "tl_page::abc", "tl_page::1.5", "t::null"] {
            assert!(
                matches!(RecordId::parse(raw), Err(Error::InvalidId(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_equality_needs_both_components() {
        assert_ne!(RecordId::new("a", 1), RecordId::new("b", 1));
        assert_ne!(RecordId::new("a", 1), RecordId::new("a", 2));
        assert_ne!(RecordId::new("a", 1), RecordId::new("a", "1"));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&RecordId::new("tl_page", 3)).unwrap();
        assert_eq!(json, r#""tl_page::3""#);
        let back: RecordId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RecordId::new("tl_page", 3));
    }

    #[test]
    fn test_ident_from_value() {
        assert_eq!(Ident::from_value(&Value::Int(4)), Some(Ident::Int(4)));
        assert_eq!(Ident::from_value(&Value::Null), None);
        assert_eq!(Ident::from_value(&Value::String(String::new())), None);
    }
}
