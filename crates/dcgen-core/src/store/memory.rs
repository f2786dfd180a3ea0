//! In-memory data store.

use std::collections::BTreeMap;

use dcgen_proto::{DataQuery, Ident, Value};
use parking_lot::RwLock;
use tracing::trace;

use super::{apply_query, DataStore};
use crate::error::Error;
use crate::record::Record;

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<Ident, BTreeMap<String, Value>>,
    last_id: i64,
}

/// A data store keeping records in memory with sequential integer ids.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store for a record type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Create a store pre-populated with records, saving each in order.
    pub fn with_records(
        name: impl Into<String>,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<Self, Error> {
        let store = Self::new(name);
        for mut record in records {
            store.save(&mut record)?;
        }
        Ok(store)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().rows.is_empty()
    }
}

impl DataStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_all(&self, query: &DataQuery) -> Result<Vec<Record>, Error> {
        let inner = self.inner.read();
        let records: Vec<Record> = match &query.id {
            Some(id) => inner
                .rows
                .get(id)
                .map(|props| Record::stored(self.name.clone(), id.clone(), props.clone()))
                .into_iter()
                .collect(),
            None => inner
                .rows
                .iter()
                .map(|(id, props)| Record::stored(self.name.clone(), id.clone(), props.clone()))
                .collect(),
        };
        Ok(apply_query(records, query))
    }

    fn save(&self, record: &mut Record) -> Result<(), Error> {
        if record.record_type() != self.name {
            return Err(Error::InvalidArgument(format!(
                "cannot save a '{}' record in store '{}'",
                record.record_type(),
                self.name
            )));
        }

        let mut inner = self.inner.write();
        let id = match record.id() {
            Some(id) => {
                if let Ident::Int(value) = id {
                    inner.last_id = inner.last_id.max(*value);
                }
                id.clone()
            }
            None => {
                inner.last_id += 1;
                Ident::Int(inner.last_id)
            }
        };

        trace!(store = %self.name, id = %id, "saving record");
        inner.rows.insert(id.clone(), record.properties().clone());
        record.assign_id(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcgen_proto::{FilterExpr, OrderSpec};

    #[test]
    fn test_save_assigns_sequential_ids() {
        let store = MemoryStore::new("tl_page");
        let mut first = store.empty_record().with("title", "A");
        let mut second = store.empty_record().with("title", "B");

        store.save(&mut first).unwrap();
        store.save(&mut second).unwrap();

        assert_eq!(first.id(), Some(&Ident::Int(1)));
        assert_eq!(second.id(), Some(&Ident::Int(2)));
        assert!(!first.is_new());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_explicit_ids_advance_counter() {
        let store = MemoryStore::new("tl_page");
        let mut explicit = Record::new("tl_page").with_id(10);
        store.save(&mut explicit).unwrap();

        let mut next = Record::new("tl_page");
        store.save(&mut next).unwrap();
        assert_eq!(next.id(), Some(&Ident::Int(11)));
    }

    #[test]
    fn test_update_in_place() {
        let store = MemoryStore::new("tl_page");
        let mut record = Record::new("tl_page").with("title", "Old");
        store.save(&mut record).unwrap();

        record.set("title", "New");
        store.save(&mut record).unwrap();

        let loaded = store.fetch(&DataQuery::new().with_id(1)).unwrap().unwrap();
        assert_eq!(loaded.value("title"), Value::from("New"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_fetch_missing_is_none() {
        let store = MemoryStore::new("tl_page");
        assert!(store.fetch(&DataQuery::new().with_id(99)).unwrap().is_none());
    }

    #[test]
    fn test_fetch_all_and_count() {
        let store = MemoryStore::with_records(
            "tl_page",
            vec![
                Record::new("tl_page").with("pid", 0).with("sorting", 256),
                Record::new("tl_page").with("pid", 0).with("sorting", 128),
                Record::new("tl_page").with("pid", 1).with("sorting", 128),
            ],
        )
        .unwrap();

        let query = DataQuery::new()
            .with_filter(FilterExpr::eq("pid", 0))
            .with_sorting(vec![OrderSpec::asc("sorting")]);
        let rows = store.fetch_all(&query).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id(), Some(&Ident::Int(2)));
        assert_eq!(store.count(&query).unwrap(), 2);
    }

    #[test]
    fn test_rejects_foreign_records() {
        let store = MemoryStore::new("tl_page");
        let mut record = Record::new("tl_news");
        assert!(matches!(store.save(&mut record), Err(Error::InvalidArgument(_))));
    }
}
