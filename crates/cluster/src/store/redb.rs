//! Redb centroid store.
//!
//! Each conditional operation runs inside a single redb write transaction.
//! Redb admits one writer at a time, so the read-check-write inside
//! `create_if_absent` and `compare_and_update` cannot interleave with another
//! writer. Readers use MVCC snapshots and never observe a half-written record.
//!
//! Records are `bincode`-encoded `(vector, update_count)` pairs keyed by the
//! numeric topic index.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::{Centroid, ClusterError, ClusterStore, TopicId};

/// Table holding one record per topic.
pub const CENTROID_TABLE: TableDefinition<u32, &[u8]> = TableDefinition::new("centroids");

#[derive(Serialize, Deserialize)]
struct StoredCentroid {
    vector: Vec<f32>,
    update_count: u64,
}

fn encode(record: &StoredCentroid) -> Result<Vec<u8>, ClusterError> {
    Ok(bincode::serde::encode_to_vec(
        record,
        bincode::config::standard(),
    )?)
}

fn decode(bytes: &[u8]) -> Result<StoredCentroid, ClusterError> {
    let (record, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(record)
}

/// Redb-backed [`ClusterStore`].
///
/// The `Arc<Database>` may be shared with other stores living in the same
/// file (see [`RedbClusterStore::from_database`]).
pub struct RedbClusterStore {
    db: Arc<Database>,
}

impl RedbClusterStore {
    /// Open or create a database file and make sure the centroid table exists.
    ///
    /// ```no_run
    /// use cluster::RedbClusterStore;
    ///
    /// let store = RedbClusterStore::open("/tmp/echo-centroids.redb").unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ClusterError> {
        let db = Database::create(path).map_err(ClusterError::store)?;
        Self::from_database(Arc::new(db))
    }

    /// Use an already open database handle.
    pub fn from_database(db: Arc<Database>) -> Result<Self, ClusterError> {
        let write_txn = db.begin_write().map_err(ClusterError::store)?;
        {
            // Opening the table in a write transaction creates it.
            let _table = write_txn
                .open_table(CENTROID_TABLE)
                .map_err(ClusterError::store)?;
        }
        write_txn.commit().map_err(ClusterError::store)?;
        Ok(Self { db })
    }

    pub fn database(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }
}

impl ClusterStore for RedbClusterStore {
    fn list_all(&self) -> Result<Vec<Centroid>, ClusterError> {
        let read_txn = self.db.begin_read().map_err(ClusterError::store)?;
        let table = read_txn
            .open_table(CENTROID_TABLE)
            .map_err(ClusterError::store)?;

        let mut centroids = Vec::new();
        for item in table.iter().map_err(ClusterError::store)? {
            let (key, value) = item.map_err(ClusterError::store)?;
            let record = decode(value.value())?;
            centroids.push(Centroid {
                topic_id: TopicId::new(key.value()),
                vector: record.vector,
                update_count: record.update_count,
            });
        }
        Ok(centroids)
    }

    fn get(&self, topic_id: TopicId) -> Result<Option<Centroid>, ClusterError> {
        let read_txn = self.db.begin_read().map_err(ClusterError::store)?;
        let table = read_txn
            .open_table(CENTROID_TABLE)
            .map_err(ClusterError::store)?;

        match table.get(topic_id.index()).map_err(ClusterError::store)? {
            Some(value) => {
                let record = decode(value.value())?;
                Ok(Some(Centroid {
                    topic_id,
                    vector: record.vector,
                    update_count: record.update_count,
                }))
            }
            None => Ok(None),
        }
    }

    fn create_if_absent(&self, topic_id: TopicId, initial: &[f32]) -> Result<bool, ClusterError> {
        let bytes = encode(&StoredCentroid {
            vector: initial.to_vec(),
            update_count: 0,
        })?;

        let write_txn = self.db.begin_write().map_err(ClusterError::store)?;
        let created = {
            let mut table = write_txn
                .open_table(CENTROID_TABLE)
                .map_err(ClusterError::store)?;
            let exists = table
                .get(topic_id.index())
                .map_err(ClusterError::store)?
                .is_some();
            if !exists {
                table
                    .insert(topic_id.index(), bytes.as_slice())
                    .map_err(ClusterError::store)?;
            }
            !exists
        };

        if created {
            write_txn.commit().map_err(ClusterError::store)?;
        } else {
            write_txn.abort().map_err(ClusterError::store)?;
        }
        Ok(created)
    }

    fn compare_and_update(
        &self,
        topic_id: TopicId,
        expected_update_count: u64,
        new_vector: &[f32],
        new_update_count: u64,
    ) -> Result<bool, ClusterError> {
        let bytes = encode(&StoredCentroid {
            vector: new_vector.to_vec(),
            update_count: new_update_count,
        })?;

        let write_txn = self.db.begin_write().map_err(ClusterError::store)?;
        let outcome = {
            let mut table = write_txn
                .open_table(CENTROID_TABLE)
                .map_err(ClusterError::store)?;
            let current = table
                .get(topic_id.index())
                .map_err(ClusterError::store)?
                .map(|value| decode(value.value()))
                .transpose()?;

            match current {
                None => Err(ClusterError::MissingTopic(topic_id)),
                Some(record) if record.update_count != expected_update_count => Ok(false),
                Some(record) if record.vector.len() != new_vector.len() => {
                    Err(ClusterError::DimensionMismatch {
                        expected: record.vector.len(),
                        actual: new_vector.len(),
                    })
                }
                Some(_) => {
                    table
                        .insert(topic_id.index(), bytes.as_slice())
                        .map_err(ClusterError::store)?;
                    Ok(true)
                }
            }
        };

        match outcome {
            Ok(true) => {
                write_txn.commit().map_err(ClusterError::store)?;
                Ok(true)
            }
            other => {
                write_txn.abort().map_err(ClusterError::store)?;
                other
            }
        }
    }
}
