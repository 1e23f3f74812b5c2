use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use super::{IndexStore, StoredEntry};
use crate::error::VectorStoreError;
use crate::models::{Chunk, IndexEntry};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    dimension INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    collection TEXT NOT NULL,
    chunk_id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    text TEXT NOT NULL,
    start_offset INTEGER NOT NULL,
    end_offset INTEGER NOT NULL,
    seq INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    PRIMARY KEY (collection, chunk_id)
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(collection, document_id);
CREATE INDEX IF NOT EXISTS idx_chunks_seq ON chunks(collection, seq);
"#;

/// SQLite-backed [`IndexStore`]. One database file may hold several collections.
pub struct SqliteIndexStore {
    conn: Mutex<Connection>,
    collection: String,
    dimension: usize,
}

impl SqliteIndexStore {
    /// Open (or create) `collection` in the database at `path`.
    ///
    /// Fails with [`VectorStoreError::DimensionMismatch`] when the collection
    /// already exists with a different dimension.
    pub fn open(path: &Path, collection: &str, dimension: usize) -> Result<Self, VectorStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn, collection, dimension)
    }

    pub fn open_in_memory(collection: &str, dimension: usize) -> Result<Self, VectorStoreError> {
        Self::init(Connection::open_in_memory()?, collection, dimension)
    }

    fn init(conn: Connection, collection: &str, dimension: usize) -> Result<Self, VectorStoreError> {
        conn.execute_batch(SCHEMA)?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT dimension FROM collections WHERE name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(stored) if stored as usize != dimension => {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: stored as usize,
                    actual: dimension,
                });
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT INTO collections (name, dimension, created_at) VALUES (?1, ?2, ?3)",
                    params![collection, dimension as i64, chrono::Utc::now().to_rfc3339()],
                )?;
                info!(collection, dimension, "created collection");
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
            collection: collection.to_string(),
            dimension,
        })
    }

    // A panicking holder cannot leave a transaction open: dropping it rolls back.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IndexStore for SqliteIndexStore {
    fn load(&self) -> Result<Vec<StoredEntry>, VectorStoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT chunk_id, document_id, ordinal, text, start_offset, end_offset, seq, embedding
             FROM chunks WHERE collection = ?1 ORDER BY seq",
        )?;

        let rows = stmt.query_map(params![self.collection], |row| {
            let chunk = Chunk {
                id: row.get(0)?,
                document_id: row.get(1)?,
                ordinal: row.get::<_, i64>(2)? as u32,
                text: row.get(3)?,
                start_offset: row.get::<_, i64>(4)? as u64,
                end_offset: row.get::<_, i64>(5)? as u64,
            };
            let seq = row.get::<_, i64>(6)? as u64;
            let blob: Vec<u8> = row.get(7)?;
            Ok((seq, chunk, blob))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (seq, chunk, blob) = row?;
            let embedding = decode_embedding(&blob).ok_or_else(|| {
                VectorStoreError::Corrupt(format!(
                    "embedding blob for chunk {} has length {}",
                    chunk.id,
                    blob.len()
                ))
            })?;
            entries.push(StoredEntry {
                seq,
                entry: IndexEntry { chunk, embedding },
            });
        }
        Ok(entries)
    }

    fn replace_document(
        &self,
        document_id: &str,
        entries: &[StoredEntry],
    ) -> Result<(), VectorStoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM chunks WHERE collection = ?1 AND document_id = ?2",
            params![self.collection, document_id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks
                 (collection, chunk_id, document_id, ordinal, text, start_offset, end_offset, seq, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for stored in entries {
                let chunk = &stored.entry.chunk;
                stmt.execute(params![
                    self.collection,
                    chunk.id,
                    chunk.document_id,
                    chunk.ordinal as i64,
                    chunk.text,
                    chunk.start_offset as i64,
                    chunk.end_offset as i64,
                    stored.seq as i64,
                    encode_embedding(&stored.entry.embedding),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_document(&self, document_id: &str) -> Result<usize, VectorStoreError> {
        let removed = self.conn().execute(
            "DELETE FROM chunks WHERE collection = ?1 AND document_id = ?2",
            params![self.collection, document_id],
        )?;
        Ok(removed)
    }

    fn clear(&self) -> Result<(), VectorStoreError> {
        self.conn().execute(
            "DELETE FROM chunks WHERE collection = ?1",
            params![self.collection],
        )?;
        Ok(())
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::vector_store::VectorIndex;

    fn entry(doc: &str, ordinal: u32, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk: Chunk::new(doc, format!("{doc}-{ordinal}"), ordinal, 0, 4),
            embedding,
        }
    }

    #[test]
    fn test_embedding_blob_encoding() {
        let original = vec![0.5_f32, -1.25, 3.0];
        let bytes = encode_embedding(&original);
        assert_eq!(bytes.len(), 12);
        assert_eq!(decode_embedding(&bytes).unwrap(), original);
        assert!(decode_embedding(&bytes[..5]).is_none());
    }

    #[test]
    fn test_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        {
            let store = SqliteIndexStore::open(&path, "notes", 2).unwrap();
            let index = VectorIndex::open(Box::new(store), 2).unwrap();
            index
                .upsert("a", vec![entry("a", 0, vec![1.0, 0.0]), entry("a", 1, vec![0.0, 1.0])])
                .unwrap();
            index.upsert("b", vec![entry("b", 0, vec![0.6, 0.8])]).unwrap();
            index.upsert("a", vec![entry("a", 0, vec![1.0, 0.0])]).unwrap();
        }

        let store = SqliteIndexStore::open(&path, "notes", 2).unwrap();
        let index = VectorIndex::open(Box::new(store), 2).unwrap();
        assert_eq!(index.len(), 2);
        let docs: Vec<String> = index.documents().into_iter().map(|d| d.document_id).collect();
        assert_eq!(docs, vec!["b", "a"]);

        let results = index.query(&[1.0, 0.0], 1).unwrap();
        assert_eq!(results[0].chunk.text, "a-0");
    }

    #[test]
    fn test_collections_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        let first = VectorIndex::open(Box::new(SqliteIndexStore::open(&path, "one", 2).unwrap()), 2)
            .unwrap();
        first.upsert("a", vec![entry("a", 0, vec![1.0, 0.0])]).unwrap();

        let second =
            VectorIndex::open(Box::new(SqliteIndexStore::open(&path, "two", 2).unwrap()), 2)
                .unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_dimension_is_fixed_per_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        drop(SqliteIndexStore::open(&path, "notes", 3).unwrap());

        let result = SqliteIndexStore::open(&path, "notes", 4);
        assert!(matches!(
            result,
            Err(VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_remove_and_clear_persist() {
        let store = SqliteIndexStore::open_in_memory("notes", 2).unwrap();
        let e = |doc: &str| StoredEntry {
            seq: 0,
            entry: entry(doc, 0, vec![1.0, 0.0]),
        };
        store.replace_document("a", &[e("a")]).unwrap();
        store.replace_document("b", &[e("b")]).unwrap();

        assert_eq!(store.delete_document("a").unwrap(), 1);
        assert_eq!(store.load().unwrap().len(), 1);
        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
