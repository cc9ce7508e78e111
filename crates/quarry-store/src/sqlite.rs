//! SQLite vector store: units in a table, vectors as little-endian `f32`
//! BLOBs, cosine similarity computed in Rust.

use std::path::Path;

use rusqlite::{params, params_from_iter, Connection};
use tracing::debug;

use quarry_core::{CodeUnit, QuarryError, Result, UnitKind};

use crate::{cosine_similarity, StoredUnit, UnitFilter, VectorHit, VectorStore};

/// The default store backend.
///
/// The first open locks the embedding dimensionality into the `metadata`
/// table; later opens with a different dimension fail rather than mixing
/// incompatible vectors.
///
/// # Examples
///
/// ```
/// use quarry_store::{SqliteVectorStore, VectorStore};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = SqliteVectorStore::open(&dir.path().join("units.db"), 384).unwrap();
/// assert_eq!(store.dim(), Some(384));
/// ```
pub struct SqliteVectorStore {
    conn: Connection,
    dim: usize,
}

struct RawRow {
    id: String,
    relative_path: String,
    language: String,
    kind: String,
    name: String,
    code: String,
    start_line: u32,
    end_line: u32,
    metadata: String,
    vector: Option<Vec<u8>>,
}

impl SqliteVectorStore {
    /// Open or create the store at `path`, locking `dim` as the vector
    /// dimensionality.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::DimensionMismatch`] when the store was created
    /// with a different dimension, or [`QuarryError::Store`] on open/schema
    /// failure.
    pub fn open(path: &Path, dim: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| QuarryError::Store(format!("failed to open database: {e}")))?;

        let store = Self { conn, dim };
        store.init_schema()?;
        store.lock_dimensions()?;
        Ok(store)
    }

    /// In-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] if schema creation fails.
    pub fn in_memory(dim: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| QuarryError::Store(format!("failed to create in-memory database: {e}")))?;
        let store = Self { conn, dim };
        store.init_schema()?;
        store.lock_dimensions()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS metadata (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS units (
                    id TEXT PRIMARY KEY,
                    relative_path TEXT NOT NULL,
                    language TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    name TEXT NOT NULL,
                    code TEXT NOT NULL,
                    start_line INTEGER NOT NULL,
                    end_line INTEGER NOT NULL,
                    metadata TEXT NOT NULL,
                    vector BLOB,
                    indexed_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_units_path ON units(relative_path);
                CREATE INDEX IF NOT EXISTS idx_units_language ON units(language);
                ",
            )
            .map_err(|e| QuarryError::Store(format!("failed to create schema: {e}")))?;
        Ok(())
    }

    fn lock_dimensions(&self) -> Result<()> {
        let existing = self.get_metadata("dim")?;
        if let Some(stored) = existing {
            let stored: usize = stored
                .parse()
                .map_err(|_| QuarryError::Store(format!("corrupted dim metadata: '{stored}'")))?;
            if stored != self.dim {
                return Err(QuarryError::DimensionMismatch {
                    stored,
                    actual: self.dim,
                });
            }
            return Ok(());
        }
        self.set_metadata("dim", &self.dim.to_string())
    }

    fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let result = self.conn.query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(QuarryError::Store(format!(
                "failed to get metadata '{key}': {e}"
            ))),
        }
    }

    fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| QuarryError::Store(format!("failed to set metadata '{key}': {e}")))?;
        Ok(())
    }

    fn query_rows(&self, filter: &UnitFilter) -> Result<Vec<RawRow>> {
        let (clause, filter_params) = filter_sql(filter);
        let sql = format!(
            "SELECT id, relative_path, language, kind, name, code,
                    start_line, end_line, metadata, vector
             FROM units{clause}"
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| QuarryError::Store(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params_from_iter(filter_params), |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    relative_path: row.get(1)?,
                    language: row.get(2)?,
                    kind: row.get(3)?,
                    name: row.get(4)?,
                    code: row.get(5)?,
                    start_line: row.get(6)?,
                    end_line: row.get(7)?,
                    metadata: row.get(8)?,
                    vector: row.get(9)?,
                })
            })
            .map_err(|e| QuarryError::Store(format!("failed to query units: {e}")))?;

        let mut raw = Vec::new();
        for row in rows {
            raw.push(row.map_err(|e| QuarryError::Store(format!("failed to read row: {e}")))?);
        }
        Ok(raw)
    }
}

fn row_to_unit(raw: &RawRow) -> Result<CodeUnit> {
    let kind: UnitKind = raw
        .kind
        .parse()
        .map_err(|e| QuarryError::Store(format!("corrupted kind column: {e}")))?;
    let metadata = serde_json::from_str(&raw.metadata)?;
    Ok(CodeUnit {
        id: raw.id.clone(),
        relative_path: raw.relative_path.clone(),
        language: raw.language.clone(),
        kind,
        name: raw.name.clone(),
        code: raw.code.clone(),
        start_line: raw.start_line,
        end_line: raw.end_line,
        metadata,
    })
}

fn filter_sql(filter: &UnitFilter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    for (column, list) in [
        ("language", &filter.languages),
        ("relative_path", &filter.relative_paths),
        ("kind", &filter.kinds),
    ] {
        if !list.is_empty() {
            let placeholders = vec!["?"; list.len()].join(", ");
            clauses.push(format!("{column} IN ({placeholders})"));
            values.extend(list.iter().cloned());
        }
    }
    let clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (clause, values)
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(floats.len() * 4);
    for f in floats {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    let mut floats = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let arr: [u8; 4] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        floats.push(f32::from_le_bytes(arr));
    }
    floats
}

impl VectorStore for SqliteVectorStore {
    fn insert(&mut self, units: &[StoredUnit]) -> Result<usize> {
        // Validate every vector before touching the database so a bad batch
        // leaves no partial writes.
        for stored in units {
            if let Some(vector) = &stored.vector {
                if vector.len() != self.dim {
                    return Err(QuarryError::DimensionMismatch {
                        stored: self.dim,
                        actual: vector.len(),
                    });
                }
            }
        }

        let tx = self
            .conn
            .transaction()
            .map_err(|e| QuarryError::Store(format!("failed to begin transaction: {e}")))?;
        for stored in units {
            let unit = &stored.unit;
            let metadata = serde_json::to_string(&unit.metadata)?;
            let vector = stored.vector.as_deref().map(floats_to_bytes);
            tx.execute(
                "INSERT OR REPLACE INTO units
                 (id, relative_path, language, kind, name, code,
                  start_line, end_line, metadata, vector, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    unit.id,
                    unit.relative_path,
                    unit.language,
                    unit.kind.to_string(),
                    unit.name,
                    unit.code,
                    unit.start_line,
                    unit.end_line,
                    metadata,
                    vector,
                    stored.indexed_at,
                ],
            )
            .map_err(|e| QuarryError::Store(format!("failed to insert unit: {e}")))?;
        }
        tx.commit()
            .map_err(|e| QuarryError::Store(format!("failed to commit insert: {e}")))?;

        debug!(count = units.len(), "inserted units");
        Ok(units.len())
    }

    fn search(
        &self,
        query_vector: Option<&[f32]>,
        _query_text: &str,
        limit: usize,
        filter: &UnitFilter,
    ) -> Result<Vec<VectorHit>> {
        let Some(query) = query_vector else {
            return Ok(Vec::new());
        };
        if query.len() != self.dim {
            return Err(QuarryError::DimensionMismatch {
                stored: self.dim,
                actual: query.len(),
            });
        }

        let raw = self.query_rows(filter)?;
        let mut scored: Vec<VectorHit> = Vec::with_capacity(raw.len());
        for row in &raw {
            let Some(bytes) = &row.vector else { continue };
            let vector = bytes_to_floats(bytes);
            let similarity = cosine_similarity(query, &vector);
            scored.push(VectorHit {
                unit: row_to_unit(row)?,
                similarity,
            });
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.unit.id.cmp(&b.unit.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    fn get(&self, id: &str) -> Result<Option<CodeUnit>> {
        let result = self.conn.query_row(
            "SELECT id, relative_path, language, kind, name, code,
                    start_line, end_line, metadata, vector
             FROM units WHERE id = ?1",
            params![id],
            |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    relative_path: row.get(1)?,
                    language: row.get(2)?,
                    kind: row.get(3)?,
                    name: row.get(4)?,
                    code: row.get(5)?,
                    start_line: row.get(6)?,
                    end_line: row.get(7)?,
                    metadata: row.get(8)?,
                    vector: row.get(9)?,
                })
            },
        );
        match result {
            Ok(raw) => Ok(Some(row_to_unit(&raw)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(QuarryError::Store(format!("failed to get unit: {e}"))),
        }
    }

    fn ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM units ORDER BY id")
            .map_err(|e| QuarryError::Store(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| QuarryError::Store(format!("failed to query ids: {e}")))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| QuarryError::Store(format!("failed to read id: {e}")))?);
        }
        Ok(ids)
    }

    fn ids_for_path(&self, relative_path: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM units WHERE relative_path = ?1 ORDER BY id")
            .map_err(|e| QuarryError::Store(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params![relative_path], |row| row.get(0))
            .map_err(|e| QuarryError::Store(format!("failed to query ids: {e}")))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| QuarryError::Store(format!("failed to read id: {e}")))?);
        }
        Ok(ids)
    }

    fn delete(&mut self, filter: &UnitFilter) -> Result<usize> {
        let (clause, filter_params) = filter_sql(filter);
        let sql = format!("DELETE FROM units{clause}");
        let removed = self
            .conn
            .execute(&sql, params_from_iter(filter_params))
            .map_err(|e| QuarryError::Store(format!("failed to delete units: {e}")))?;
        Ok(removed)
    }

    fn count(&self, filter: &UnitFilter) -> Result<usize> {
        let (clause, filter_params) = filter_sql(filter);
        let sql = format!("SELECT COUNT(*) FROM units{clause}");
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(filter_params), |row| row.get(0))
            .map_err(|e| QuarryError::Store(format!("failed to count units: {e}")))?;
        Ok(count as usize)
    }

    fn dim(&self) -> Option<usize> {
        Some(self.dim)
    }

    fn close(&mut self) -> Result<()> {
        // rusqlite flushes on drop; nothing buffered beyond that.
        Ok(())
    }
}
