//! Sled-backed data store.
//!
//! One sled tree per record type. Keys encode the identifier so that tree
//! order equals identifier order; values are rkyv-encoded property lists.

use std::collections::BTreeMap;

use dcgen_proto::{DataQuery, Ident, Value};
use rkyv::{Archive, Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::{debug, trace};

use super::{apply_query, DataStore};
use crate::config::StoreConfig;
use crate::error::Error;
use crate::record::Record;

/// Prefix of the tree holding records of one type.
const TREE_PREFIX: &str = "records:";

const KEY_INT: u8 = 0;
const KEY_STR: u8 = 1;

/// One stored property.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
struct StoredProperty {
    name: String,
    value: Value,
}

/// Stored payload of a record.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
struct StoredRecord {
    properties: Vec<StoredProperty>,
    /// Last write in microseconds since Unix epoch.
    updated_at: u64,
}

impl StoredRecord {
    fn from_record(record: &Record) -> Self {
        Self {
            properties: record
                .properties()
                .iter()
                .map(|(name, value)| StoredProperty {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
            updated_at: current_timestamp(),
        }
    }

    fn into_record(self, record_type: &str, id: Ident) -> Record {
        let properties: BTreeMap<String, Value> = self
            .properties
            .into_iter()
            .map(|p| (p.name, p.value))
            .collect();
        Record::stored(record_type, id, properties)
    }

    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Current time in microseconds since Unix epoch.
fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Encode an identifier as an order-preserving key.
fn encode_key(id: &Ident) -> Vec<u8> {
    match id {
        Ident::Int(value) => {
            let mut key = Vec::with_capacity(9);
            key.push(KEY_INT);
            // Flip the sign bit so negative ids sort first.
            key.extend_from_slice(&((*value as u64) ^ (1 << 63)).to_be_bytes());
            key
        }
        Ident::Str(value) => {
            let mut key = Vec::with_capacity(1 + value.len());
            key.push(KEY_STR);
            key.extend_from_slice(value.as_bytes());
            key
        }
    }
}

fn decode_key(key: &[u8]) -> Result<Ident, Error> {
    match key.split_first() {
        Some((&KEY_INT, rest)) => {
            let bytes: [u8; 8] = rest
                .try_into()
                .map_err(|_| Error::Deserialization("invalid integer key length".to_string()))?;
            Ok(Ident::Int((u64::from_be_bytes(bytes) ^ (1 << 63)) as i64))
        }
        Some((&KEY_STR, rest)) => String::from_utf8(rest.to_vec())
            .map(Ident::Str)
            .map_err(|e| Error::Deserialization(e.to_string())),
        _ => Err(Error::Deserialization("unknown key tag".to_string())),
    }
}

/// An open sled database holding one tree per record type.
pub struct SledStorage {
    db: Db,
}

impl SledStorage {
    /// Open or create the database.
    pub fn open(config: StoreConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        if db.was_recovered() {
            debug!("opened existing sled database");
        }
        Ok(Self { db })
    }

    /// Open the store of a record type.
    pub fn store(&self, record_type: &str) -> Result<SledStore, Error> {
        let tree = self.db.open_tree(format!("{}{}", TREE_PREFIX, record_type))?;
        Ok(SledStore {
            name: record_type.to_string(),
            db: self.db.clone(),
            tree,
        })
    }

    /// Record types that have a tree in the database.
    pub fn record_types(&self) -> Vec<String> {
        self.db
            .tree_names()
            .into_iter()
            .filter_map(|name| {
                std::str::from_utf8(&name)
                    .ok()
                    .and_then(|name| name.strip_prefix(TREE_PREFIX))
                    .map(str::to_string)
            })
            .collect()
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }
}

/// Data store of one record type inside a [`SledStorage`].
pub struct SledStore {
    name: String,
    db: Db,
    tree: Tree,
}

impl SledStore {
    fn load(&self, key: &[u8], bytes: &[u8]) -> Result<Record, Error> {
        let id = decode_key(key)?;
        Ok(StoredRecord::from_bytes(bytes)?.into_record(&self.name, id))
    }
}

impl DataStore for SledStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_all(&self, query: &DataQuery) -> Result<Vec<Record>, Error> {
        let records = match &query.id {
            Some(id) => {
                let key = encode_key(id);
                match self.tree.get(&key)? {
                    Some(bytes) => vec![self.load(&key, &bytes)?],
                    None => Vec::new(),
                }
            }
            None => {
                let mut records = Vec::new();
                for entry in self.tree.iter() {
                    let (key, bytes) = entry?;
                    records.push(self.load(&key, &bytes)?);
                }
                records
            }
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

        let id = match record.id() {
            Some(id) => id.clone(),
            // sled ids start at 0; 0 is kept free for "no parent" values.
            None => Ident::Int(self.db.generate_id()? as i64 + 1),
        };

        let payload = StoredRecord::from_record(record).to_bytes()?;
        self.tree.insert(encode_key(&id), payload)?;
        trace!(store = %self.name, id = %id, "saved record");

        record.assign_id(id);
        Ok(())
    }
}
