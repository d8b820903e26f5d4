//! In-memory persistence store.

use crate::error::{StoreError, StoreResult};
use crate::id::ObjectId;
use crate::record::{ChangeKind, DataRecord, PersistableChange, RelationQuery, Timestamp};
use crate::store::PersistenceStore;
use crate::value::Value;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Encoded form of one stored row.
#[derive(Serialize, Deserialize)]
struct StoredRow {
    timestamp: Timestamp,
    values: BTreeMap<String, Value>,
    foreign_keys: BTreeMap<String, Option<ObjectId>>,
}

/// Snapshot layout written by [`InMemoryStore::write_snapshot`].
#[derive(Serialize, Deserialize)]
struct Snapshot {
    next_timestamp: u64,
    rows: Vec<(ObjectId, Vec<u8>)>,
}

/// A persistence store that keeps every record in memory.
///
/// Records are held as CBOR bytes and decoded on every load, so callers
/// always receive fresh copies. This store is suitable for:
/// - Unit and integration tests
/// - Fixtures that are saved to and restored from a snapshot file
/// - Ephemeral object graphs that never touch disk
///
/// The store counts loads and relation queries so tests can assert whether
/// the engine went back to the store.
///
/// # Thread Safety
///
/// The store is `Send + Sync`; commits hold the write lock for the whole
/// batch so they are atomic with respect to readers.
#[derive(Debug)]
pub struct InMemoryStore {
    rows: RwLock<BTreeMap<ObjectId, Vec<u8>>>,
    next_timestamp: AtomicU64,
    load_count: AtomicUsize,
    query_count: AtomicUsize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_timestamp: AtomicU64::new(1),
            load_count: AtomicUsize::new(0),
            query_count: AtomicUsize::new(0),
        }
    }

    /// Inserts or replaces a record outside of any commit.
    ///
    /// The record receives a fresh timestamp, which is returned. Intended
    /// for seeding fixtures and for simulating changes made by another
    /// process.
    pub fn insert(&self, record: DataRecord) -> Timestamp {
        let timestamp = self.allocate_timestamp();
        let row = StoredRow {
            timestamp,
            values: record.values,
            foreign_keys: record.foreign_keys,
        };
        match encode(&row) {
            Ok(bytes) => {
                self.rows.write().insert(record.id, bytes);
            }
            Err(e) => tracing::warn!(object_id = %record.id, error = %e, "failed to seed record"),
        }
        timestamp
    }

    /// Returns `true` if the store holds the object.
    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.rows.read().contains_key(id)
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns `true` if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Number of successful or failed `load` calls so far.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    /// Number of `load_relation_targets` calls so far.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    /// Writes all records to `writer` as a CBOR snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn write_snapshot<W: Write>(&self, writer: W) -> StoreResult<()> {
        let rows = self.rows.read();
        let snapshot = Snapshot {
            next_timestamp: self.next_timestamp.load(Ordering::SeqCst),
            rows: rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        ciborium::into_writer(&snapshot, writer).map_err(|e| StoreError::Encoding(e.to_string()))
    }

    /// Restores a store from a snapshot produced by [`Self::write_snapshot`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupted`] if the snapshot cannot be decoded.
    pub fn read_snapshot<R: Read>(reader: R) -> StoreResult<Self> {
        let snapshot: Snapshot =
            ciborium::from_reader(reader).map_err(|e| StoreError::Corrupted(e.to_string()))?;
        Ok(Self {
            rows: RwLock::new(snapshot.rows.into_iter().collect()),
            next_timestamp: AtomicU64::new(snapshot.next_timestamp),
            load_count: AtomicUsize::new(0),
            query_count: AtomicUsize::new(0),
        })
    }

    fn allocate_timestamp(&self) -> Timestamp {
        Timestamp::new(self.next_timestamp.fetch_add(1, Ordering::SeqCst))
    }
}

impl PersistenceStore for InMemoryStore {
    fn load(&self, id: &ObjectId) -> StoreResult<Option<DataRecord>> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.read();
        rows.get(id)
            .map(|bytes| decode_record(id, bytes))
            .transpose()
    }

    fn load_relation_targets(&self, query: &RelationQuery) -> StoreResult<Vec<DataRecord>> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.read();
        let mut result = Vec::new();
        for (id, bytes) in rows.iter().filter(|(id, _)| id.class_id() == &query.class_id) {
            let record = decode_record(id, bytes)?;
            if record.foreign_key(&query.foreign_key) == Some(&query.referenced) {
                result.push(record);
            }
        }
        Ok(result)
    }

    fn commit(&self, changes: &[PersistableChange]) -> StoreResult<Vec<(ObjectId, Timestamp)>> {
        let mut rows = self.rows.write();

        // Validate the whole batch before touching anything
        for change in changes {
            let existing = rows
                .get(&change.object_id)
                .map(|bytes| decode_row(bytes))
                .transpose()?;
            match (change.kind, existing) {
                (ChangeKind::Insert, Some(_)) => {
                    return Err(StoreError::DuplicateObject {
                        object_id: change.object_id.clone(),
                    });
                }
                (ChangeKind::Insert, None) => {}
                (_, None) => {
                    return Err(StoreError::NotFound {
                        object_id: change.object_id.clone(),
                    });
                }
                (_, Some(row)) => {
                    if change.expected_timestamp != Some(row.timestamp) {
                        return Err(StoreError::ConcurrencyViolation {
                            object_id: change.object_id.clone(),
                            expected: change.expected_timestamp,
                            actual: row.timestamp,
                        });
                    }
                }
            }
        }

        let mut encoded = Vec::with_capacity(changes.len());
        for change in changes {
            if change.kind == ChangeKind::Delete {
                encoded.push(None);
                continue;
            }
            let timestamp = self.allocate_timestamp();
            let row = StoredRow {
                timestamp,
                values: change.values.clone(),
                foreign_keys: change.foreign_keys.clone(),
            };
            encoded.push(Some((timestamp, encode(&row)?)));
        }

        let mut stamps = Vec::new();
        for (change, encoded) in changes.iter().zip(encoded) {
            match encoded {
                None => {
                    rows.remove(&change.object_id);
                }
                Some((timestamp, bytes)) => {
                    rows.insert(change.object_id.clone(), bytes);
                    stamps.push((change.object_id.clone(), timestamp));
                }
            }
        }

        tracing::debug!(changes = changes.len(), "store commit applied");
        Ok(stamps)
    }
}

fn encode(row: &StoredRow) -> StoreResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(row, &mut bytes).map_err(|e| StoreError::Encoding(e.to_string()))?;
    Ok(bytes)
}

fn decode_row(bytes: &[u8]) -> StoreResult<StoredRow> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Corrupted(e.to_string()))
}

fn decode_record(id: &ObjectId, bytes: &[u8]) -> StoreResult<DataRecord> {
    let row = decode_row(bytes)?;
    Ok(DataRecord {
        id: id.clone(),
        timestamp: row.timestamp,
        values: row.values,
        foreign_keys: row.foreign_keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(key: u128, customer: Option<&ObjectId>) -> DataRecord {
        DataRecord::new(ObjectId::from_u128("Order", key))
            .with_value("OrderNumber", key as i64)
            .with_foreign_key("Customer", customer.cloned())
    }

    fn update(record: &DataRecord, expected: Timestamp) -> PersistableChange {
        PersistableChange {
            object_id: record.id.clone(),
            kind: ChangeKind::Update,
            values: record.values.clone(),
            foreign_keys: record.foreign_keys.clone(),
            expected_timestamp: Some(expected),
        }
    }

    #[test]
    fn load_missing_returns_none() {
        let store = InMemoryStore::new();
        let result = store.load(&ObjectId::from_u128("Order", 1)).unwrap();
        assert!(result.is_none());
        assert_eq!(store.load_count(), 1);
    }

    #[test]
    fn insert_and_load() {
        let store = InMemoryStore::new();
        let record = order(1, None);
        let ts = store.insert(record.clone());

        let loaded = store.load(&record.id).unwrap().unwrap();
        assert_eq!(loaded.values, record.values);
        assert_eq!(loaded.timestamp, ts);
    }

    #[test]
    fn relation_query_filters_by_foreign_key() {
        let store = InMemoryStore::new();
        let c1 = ObjectId::from_u128("Customer", 1);
        let c2 = ObjectId::from_u128("Customer", 2);
        store.insert(order(1, Some(&c1)));
        store.insert(order(2, Some(&c2)));
        store.insert(order(3, Some(&c1)));

        let query = RelationQuery {
            class_id: "Order".into(),
            foreign_key: "Customer".to_string(),
            referenced: c1,
        };
        let ids: Vec<_> = store
            .load_relation_targets(&query)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        assert_eq!(
            ids,
            vec![ObjectId::from_u128("Order", 1), ObjectId::from_u128("Order", 3)]
        );
        assert_eq!(store.query_count(), 1);
    }

    #[test]
    fn commit_assigns_new_timestamps() {
        let store = InMemoryStore::new();
        let record = order(1, None);
        let ts = store.insert(record.clone());

        let stamps = store.commit(&[update(&record, ts)]).unwrap();
        assert_eq!(stamps.len(), 1);
        assert!(stamps[0].1 > ts);
        assert_eq!(store.load(&record.id).unwrap().unwrap().timestamp, stamps[0].1);
    }

    #[test]
    fn stale_timestamp_is_rejected_atomically() {
        let store = InMemoryStore::new();
        let a = order(1, None);
        let b = order(2, None);
        let ts_a = store.insert(a.clone());
        store.insert(b.clone());

        let new_b = b.clone().with_value("OrderNumber", 99i64);
        let result = store.commit(&[update(&a, ts_a), update(&new_b, Timestamp::new(0))]);

        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyViolation { .. })
        ));
        // Nothing from the batch was applied
        assert_eq!(store.load(&a.id).unwrap().unwrap().timestamp, ts_a);
        assert_eq!(
            store.load(&b.id).unwrap().unwrap().values["OrderNumber"],
            Value::Integer(2)
        );
    }

    #[test]
    fn insert_duplicate_fails() {
        let store = InMemoryStore::new();
        let record = order(1, None);
        store.insert(record.clone());

        let change = PersistableChange {
            object_id: record.id.clone(),
            kind: ChangeKind::Insert,
            values: record.values.clone(),
            foreign_keys: record.foreign_keys.clone(),
            expected_timestamp: None,
        };
        assert!(matches!(
            store.commit(&[change]),
            Err(StoreError::DuplicateObject { .. })
        ));
    }

    #[test]
    fn delete_removes_record() {
        let store = InMemoryStore::new();
        let record = order(1, None);
        let ts = store.insert(record.clone());

        let change = PersistableChange {
            object_id: record.id.clone(),
            kind: ChangeKind::Delete,
            values: BTreeMap::new(),
            foreign_keys: BTreeMap::new(),
            expected_timestamp: Some(ts),
        };
        let stamps = store.commit(&[change]).unwrap();
        assert!(stamps.is_empty());
        assert!(!store.contains(&record.id));
    }

    #[test]
    fn snapshot_roundtrip_through_file() {
        use std::fs::File;

        let store = InMemoryStore::new();
        let c1 = ObjectId::from_u128("Customer", 1);
        store.insert(order(1, Some(&c1)));
        store.insert(order(2, None));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.cbor");
        store.write_snapshot(File::create(&path).unwrap()).unwrap();

        let restored = InMemoryStore::read_snapshot(File::open(&path).unwrap()).unwrap();
        assert_eq!(restored.len(), 2);
        let loaded = restored
            .load(&ObjectId::from_u128("Order", 1))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.foreign_key("Customer"), Some(&c1));

        // Timestamps keep increasing after restore
        let ts = restored.insert(order(3, None));
        assert!(ts > loaded.timestamp);
    }

    #[test]
    fn corrupted_snapshot_is_reported() {
        let result = InMemoryStore::read_snapshot(&[0xff, 0x00, 0x13][..]);
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }
}
