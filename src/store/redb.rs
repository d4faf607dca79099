//! Redb backend for documents and analyses.
//!
//! Values are JSON so the records stay readable with generic redb tooling.
//! The tables live next to the `centroids` table when the database handle is
//! shared with the cluster store.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

use super::{AnalysisStore, DocumentStore, StoreError};
use crate::types::{AnalysisResult, Document};

/// `doc_id` -> JSON record.
type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

const DOCUMENTS_TABLE: JsonTable = TableDefinition::new("documents");
const ANALYSES_TABLE: JsonTable = TableDefinition::new("analyses");

pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a database file and make sure both tables exist.
    ///
    /// ```no_run
    /// use echo::RedbStore;
    ///
    /// let store = RedbStore::open("/tmp/echo.redb").unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(StoreError::unavailable)?;
        Self::from_database(Arc::new(db))
    }

    /// Use an already open database handle.
    pub fn from_database(db: Arc<Database>) -> Result<Self, StoreError> {
        let write_txn = db.begin_write().map_err(StoreError::unavailable)?;
        {
            let _documents = write_txn
                .open_table(DOCUMENTS_TABLE)
                .map_err(StoreError::unavailable)?;
            let _analyses = write_txn
                .open_table(ANALYSES_TABLE)
                .map_err(StoreError::unavailable)?;
        }
        write_txn.commit().map_err(StoreError::unavailable)?;
        Ok(Self { db })
    }

    fn put(
        &self,
        table_def: JsonTable,
        key: &str,
        value: &[u8],
    ) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::unavailable)?;
        {
            let mut table = write_txn
                .open_table(table_def)
                .map_err(StoreError::unavailable)?;
            table.insert(key, value).map_err(StoreError::unavailable)?;
        }
        write_txn.commit().map_err(StoreError::unavailable)?;
        Ok(())
    }

    fn get(
        &self,
        table_def: JsonTable,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::unavailable)?;
        let table = read_txn
            .open_table(table_def)
            .map_err(StoreError::unavailable)?;
        match table.get(key).map_err(StoreError::unavailable)? {
            Some(value) => Ok(Some(value.value().to_vec())),
            None => Ok(None),
        }
    }

    fn count(&self, table_def: JsonTable) -> Result<u64, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::unavailable)?;
        let table = read_txn
            .open_table(table_def)
            .map_err(StoreError::unavailable)?;
        let mut count = 0u64;
        for entry in table.iter().map_err(StoreError::unavailable)? {
            entry.map_err(StoreError::unavailable)?;
            count += 1;
        }
        Ok(count)
    }
}

impl DocumentStore for RedbStore {
    fn get_document(&self, doc_id: &str) -> Result<Option<Document>, StoreError> {
        self.get(DOCUMENTS_TABLE, doc_id)?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(StoreError::from))
            .transpose()
    }

    fn put_document(&self, document: &Document) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(document)?;
        self.put(DOCUMENTS_TABLE, &document.id, &bytes)
    }

    fn document_count(&self) -> Result<u64, StoreError> {
        self.count(DOCUMENTS_TABLE)
    }
}

impl AnalysisStore for RedbStore {
    fn get_analysis(&self, doc_id: &str) -> Result<Option<AnalysisResult>, StoreError> {
        self.get(ANALYSES_TABLE, doc_id)?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(StoreError::from))
            .transpose()
    }

    fn put_analysis(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(result)?;
        self.put(ANALYSES_TABLE, &result.doc_id, &bytes)
    }

    fn analysis_count(&self) -> Result<u64, StoreError> {
        self.count(ANALYSES_TABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cluster::{AssignmentKind, TopicId};
    use tempfile::NamedTempFile;

    #[test]
    fn documents_survive_reopen() {
        let temp_file = NamedTempFile::new().unwrap();
        {
            let store = RedbStore::open(temp_file.path()).unwrap();
            let mut doc = Document::new("2401.1", "Title", "Body");
            doc.link = Some("https://arxiv.org/abs/2401.1".into());
            store.put_document(&doc).unwrap();
        }
        let store = RedbStore::open(temp_file.path()).unwrap();
        let doc = store.get_document("2401.1").unwrap().unwrap();
        assert_eq!(doc.body_text, "Body");
        assert_eq!(doc.link.as_deref(), Some("https://arxiv.org/abs/2401.1"));
        assert_eq!(store.document_count().unwrap(), 1);
        assert!(store.get_document("missing").unwrap().is_none());
    }

    #[test]
    fn analyses_overwrite() {
        let temp_file = NamedTempFile::new().unwrap();
        let store = RedbStore::open(temp_file.path()).unwrap();
        for topic in [1, 3] {
            store
                .put_analysis(&AnalysisResult {
                    doc_id: "d".into(),
                    topic_id: TopicId::new(topic),
                    similarity_score: 1.0,
                    score: 100,
                    assignment: AssignmentKind::Created,
                    model: "m".into(),
                    analyzed_at: Utc::now(),
                })
                .unwrap();
        }
        assert_eq!(store.analysis_count().unwrap(), 1);
        assert_eq!(
            store.get_analysis("d").unwrap().unwrap().topic_id,
            TopicId::new(3)
        );
    }

    #[test]
    fn shares_database_with_cluster_store() {
        let temp_file = NamedTempFile::new().unwrap();
        let db = Arc::new(Database::create(temp_file.path()).unwrap());
        let docs = RedbStore::from_database(db.clone()).unwrap();
        let clusters = cluster::RedbClusterStore::from_database(db).unwrap();

        use cluster::ClusterStore;
        docs.put_document(&Document::new("a", "t", "b")).unwrap();
        clusters.create_if_absent(TopicId::FIRST, &[1.0]).unwrap();

        assert_eq!(docs.document_count().unwrap(), 1);
        assert_eq!(clusters.list_all().unwrap().len(), 1);
    }
}
