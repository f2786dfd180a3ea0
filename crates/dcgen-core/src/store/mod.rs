//! Data store contract and implementations.
//!
//! The engine never talks to a backend directly: every fetch and save goes
//! through a [`DataStore`] looked up by record type in a [`DataStores`]
//! registry.

mod memory;
mod sled_store;

pub use self::memory::MemoryStore;
pub use self::sled_store::{SledStorage, SledStore};

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dcgen_proto::{DataQuery, OrderDirection, OrderSpec, Value};

use crate::error::Error;
use crate::filter::FilterEvaluator;
use crate::record::Record;

/// Fetch and save primitives of one record type.
pub trait DataStore: Send + Sync {
    /// Record type held by this store.
    fn name(&self) -> &str;

    /// A new, unsaved record of this type.
    fn empty_record(&self) -> Record {
        Record::new(self.name())
    }

    /// A query matching every record.
    fn empty_query(&self) -> DataQuery {
        DataQuery::new()
    }

    /// All records matching `query`, in query order.
    fn fetch_all(&self, query: &DataQuery) -> Result<Vec<Record>, Error>;

    /// The first record matching `query`, `None` when nothing matches.
    fn fetch(&self, query: &DataQuery) -> Result<Option<Record>, Error> {
        Ok(self.fetch_all(query)?.into_iter().next())
    }

    /// Number of records matching `query`, ignoring pagination.
    fn count(&self, query: &DataQuery) -> Result<usize, Error> {
        let mut query = query.clone();
        query.pagination = None;
        query.set_id_only(true);
        Ok(self.fetch_all(&query)?.len())
    }

    /// Persist a record. Assigns an identifier to unsaved records.
    fn save(&self, record: &mut Record) -> Result<(), Error>;

    /// Persist several records in order. Not atomic: a failure leaves earlier
    /// records saved.
    fn save_each(&self, records: &mut [Record]) -> Result<(), Error> {
        for record in records.iter_mut() {
            self.save(record)?;
        }
        Ok(())
    }
}

/// Registry of data stores keyed by record type.
#[derive(Clone, Default)]
pub struct DataStores {
    stores: BTreeMap<String, Arc<dyn DataStore>>,
}

impl DataStores {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store under its own name, replacing any previous one.
    pub fn register(&mut self, store: Arc<dyn DataStore>) {
        self.stores.insert(store.name().to_string(), store);
    }

    /// Builder form of [`DataStores::register`].
    pub fn with(mut self, store: Arc<dyn DataStore>) -> Self {
        self.register(store);
        self
    }

    /// Look up the store of a record type.
    pub fn get(&self, record_type: &str) -> Result<&Arc<dyn DataStore>, Error> {
        self.stores.get(record_type).ok_or_else(|| {
            Error::InvalidArgument(format!("no data store registered for '{}'", record_type))
        })
    }

    /// Whether a store is registered for the record type.
    pub fn contains(&self, record_type: &str) -> bool {
        self.stores.contains_key(record_type)
    }

    /// Registered record types.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }
}

impl fmt::Debug for DataStores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStores")
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Apply a query to records loaded in identifier order.
///
/// Filter, then sort, then offset/limit, then id-only projection. Shared by
/// backends that cannot push queries down.
pub(crate) fn apply_query(records: impl IntoIterator<Item = Record>, query: &DataQuery) -> Vec<Record> {
    let mut rows: Vec<Record> = records
        .into_iter()
        .filter(|record| match &query.id {
            Some(id) => record.id() == Some(id),
            None => true,
        })
        .filter(|record| match &query.filter {
            Some(filter) => FilterEvaluator::evaluate(filter, record),
            None => true,
        })
        .collect();

    if !query.sorting.is_empty() {
        sort_records(&mut rows, &query.sorting);
    }

    if let Some(pagination) = query.pagination {
        rows = rows
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
    }

    if query.id_only {
        rows = rows.into_iter().map(Record::into_id_only).collect();
    }

    rows
}

/// Stable sort by a list of order specs. NULL sorts first ascending.
pub(crate) fn sort_records(rows: &mut [Record], order_by: &[OrderSpec]) {
    rows.sort_by(|a, b| {
        for spec in order_by {
            let a_val = a.value(&spec.field);
            let b_val = b.value(&spec.field);
            let cmp = compare_values(&a_val, &b_val);

            let cmp = match spec.direction {
                OrderDirection::Asc => cmp,
                OrderDirection::Desc => cmp.reverse(),
            };

            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    });
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    a.compare(b).unwrap_or_else(|| a.to_string().cmp(&b.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcgen_proto::{FilterExpr, Pagination};

    fn rows() -> Vec<Record> {
        vec![
            Record::new("t").with_id(1).with("pid", 0).with("sorting", 256),
            Record::new("t").with_id(2).with("pid", 0).with("sorting", 128),
            Record::new("t").with_id(3).with("pid", 1).with("sorting", 64),
            Record::new("t").with_id(4).with("pid", 0),
        ]
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records
            .iter()
            .filter_map(|r| r.value("id").as_i64())
            .collect()
    }

    #[test]
    fn test_filter_then_sort() {
        let query = DataQuery::new()
            .with_filter(FilterExpr::eq("pid", 0))
            .with_sorting(vec![OrderSpec::asc("sorting")]);
        assert_eq!(ids(&apply_query(rows(), &query)), vec![4, 2, 1]);

        let query = DataQuery::new().with_sorting(vec![OrderSpec::desc("sorting")]);
        assert_eq!(ids(&apply_query(rows(), &query)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_pagination_after_sort() {
        let query = DataQuery::new()
            .with_sorting(vec![OrderSpec::asc("sorting")])
            .with_pagination(Pagination::new(2, 1));
        assert_eq!(ids(&apply_query(rows(), &query)), vec![3, 2]);
    }

    #[test]
    fn test_id_restriction_and_projection() {
        let mut query = DataQuery::new().with_id(3);
        query.set_id_only(true);
        let result = apply_query(rows(), &query);
        assert_eq!(ids(&result), vec![3]);
        assert!(result[0].properties().is_empty());
    }

    #[test]
    fn test_registry_lookup() {
        let stores = DataStores::new().with(Arc::new(MemoryStore::new("tl_page")));
        assert!(stores.contains("tl_page"));
        assert!(stores.get("tl_page").is_ok());
        assert!(matches!(stores.get("tl_news"), Err(Error::InvalidArgument(_))));
        assert_eq!(stores.names().collect::<Vec<_>>(), vec!["tl_page"]);
    }
}
