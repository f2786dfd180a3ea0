//! Records: one entity instance of a record type.

use std::borrow::Cow;
use std::collections::BTreeMap;

use dcgen_proto::{Ident, RecordId, Value};

/// Name of the pseudo-property that resolves to the record identifier.
pub const ID_PROPERTY: &str = "id";

/// Transient per-request state of a record. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMeta {
    /// The record has not been saved yet.
    pub is_new: bool,
    /// At least one child record exists (set by the tree walk).
    pub has_children: bool,
    /// Depth in the tree, 0 for roots.
    pub tree_level: usize,
    /// The tree node is expanded.
    pub is_expanded: bool,
}

/// A record held by a data store.
///
/// Identity and properties are kept apart: [`Record::clone_without_id`] is the
/// only way to duplicate a record for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    record_type: String,
    id: Option<Ident>,
    properties: BTreeMap<String, Value>,
    /// Transient metadata.
    pub meta: RecordMeta,
}

impl Record {
    /// Create an empty, unsaved record of the given type.
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            id: None,
            properties: BTreeMap::new(),
            meta: RecordMeta {
                is_new: true,
                ..RecordMeta::default()
            },
        }
    }

    /// Create a record as loaded from a store.
    pub fn stored(
        record_type: impl Into<String>,
        id: Ident,
        properties: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            id: Some(id),
            properties,
            meta: RecordMeta::default(),
        }
    }

    /// Builder: set a property.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder: set the identifier.
    pub fn with_id(mut self, id: impl Into<Ident>) -> Self {
        self.id = Some(id.into());
        self.meta.is_new = false;
        self
    }

    /// Duplicate this record as a new, unsaved record without identifier.
    pub fn clone_without_id(&self) -> Self {
        Self {
            record_type: self.record_type.clone(),
            id: None,
            properties: self.properties.clone(),
            meta: RecordMeta {
                is_new: true,
                ..RecordMeta::default()
            },
        }
    }

    /// Record type (data store name).
    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    /// Identifier, `None` until saved.
    pub fn id(&self) -> Option<&Ident> {
        self.id.as_ref()
    }

    /// Composite id, `None` until saved.
    pub fn record_id(&self) -> Option<RecordId> {
        self.id
            .as_ref()
            .map(|id| RecordId::new(self.record_type.clone(), id.clone()))
    }

    /// Assign the identifier. Called by data stores on save.
    pub fn assign_id(&mut self, id: Ident) {
        self.id = Some(id);
        self.meta.is_new = false;
    }

    /// Whether this record has been saved.
    pub fn is_new(&self) -> bool {
        self.id.is_none() || self.meta.is_new
    }

    /// Read a property. `id` resolves to the identifier.
    pub fn get(&self, name: &str) -> Option<Cow<'_, Value>> {
        if name == ID_PROPERTY {
            return self.id.as_ref().map(|id| Cow::Owned(Value::from(id)));
        }
        self.properties.get(name).map(Cow::Borrowed)
    }

    /// Read a property as an owned value, `Null` when missing.
    pub fn value(&self, name: &str) -> Value {
        self.get(name).map(Cow::into_owned).unwrap_or(Value::Null)
    }

    /// Write a property. Writing `id` re-assigns the identifier.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if name == ID_PROPERTY {
            self.id = Ident::from_value(&value);
            return;
        }
        self.properties.insert(name, value);
    }

    /// Remove a property, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    /// All stored properties (the identifier is not included).
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Integer value of a sorting property, 0 when missing or not numeric.
    pub fn sorting_value(&self, property: &str) -> i64 {
        self.get(property).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    /// Drop everything but the identifier (id-only fetches).
    pub(crate) fn into_id_only(self) -> Self {
        Self {
            properties: BTreeMap::new(),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_pseudo_property() {
        let record = Record::new("tl_page").with_id(7).with("title", "Home");

        assert_eq!(record.value("id"), Value::Int(7));
        assert_eq!(record.value("title"), Value::String("Home".into()));
        assert_eq!(record.value("missing"), Value::Null);
        assert_eq!(record.record_id(), Some(RecordId::new("tl_page", 7)));
        assert!(!record.properties().contains_key("id"));
    }

    #[test]
    fn test_clone_without_id() {
        let mut record = Record::new("tl_page").with_id(7).with("title", "Home");
        record.meta.tree_level = 3;

        let clone = record.clone_without_id();
        assert!(clone.id().is_none());
        assert!(clone.is_new());
        assert_eq!(clone.meta.tree_level, 0);
        assert_eq!(clone.value("title"), Value::String("Home".into()));
    }

    #[test]
    fn test_assign_id_clears_new_flag() {
        let mut record = Record::new("tl_page");
        assert!(record.is_new());
        record.assign_id(Ident::Int(1));
        assert!(!record.is_new());
    }

    #[test]
    fn test_sorting_value() {
        let record = Record::new("t").with("sorting", 256).with("label", "x");
        assert_eq!(record.sorting_value("sorting"), 256);
        assert_eq!(record.sorting_value("label"), 0);
        assert_eq!(record.sorting_value("nothing"), 0);
    }
}
