//! SQLite symbol index: fast name/kind lookup plus file change tracking.
//!
//! Symbols mirror the indexed code units in a lightweight table (no code
//! bodies, no vectors) with an FTS5 side table for full-text lookup over
//! names and signatures. The `indexed_files` table carries the per-file
//! content hashes that gate incremental reindexing.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::debug;

use quarry_core::{CodeUnit, QuarryError, Result};

/// One symbol row, as returned by lookups.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolRow {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub relative_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub language: String,
    pub signature: String,
    pub docstring: Option<String>,
    pub parent: Option<String>,
}

/// Aggregate counts over the symbol table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SymbolStats {
    pub total_symbols: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_language: BTreeMap<String, usize>,
    pub indexed_files: usize,
}

/// The on-disk symbol index (`symbols.db`).
///
/// # Examples
///
/// ```
/// use quarry_symbols::SymbolIndex;
///
/// let index = SymbolIndex::in_memory().unwrap();
/// assert_eq!(index.stats().unwrap().total_symbols, 0);
/// ```
pub struct SymbolIndex {
    conn: Connection,
}

impl SymbolIndex {
    /// Open or create the index database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] if the database cannot be opened or
    /// the schema cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| QuarryError::Store(format!("failed to open symbol database: {e}")))?;
        let index = Self { conn };
        index.init_schema()?;
        Ok(index)
    }

    /// In-memory index for tests.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| QuarryError::Store(format!("failed to create in-memory database: {e}")))?;
        let index = Self { conn };
        index.init_schema()?;
        Ok(index)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS symbols (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    relative_path TEXT NOT NULL,
                    start_line INTEGER NOT NULL,
                    end_line INTEGER NOT NULL,
                    language TEXT NOT NULL,
                    signature TEXT NOT NULL DEFAULT '',
                    docstring TEXT,
                    parent TEXT,
                    file_hash TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
                CREATE INDEX IF NOT EXISTS idx_symbols_path ON symbols(relative_path);
                CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind);

                CREATE TABLE IF NOT EXISTS indexed_files (
                    relative_path TEXT PRIMARY KEY,
                    file_hash TEXT NOT NULL,
                    indexed_at TEXT NOT NULL
                );

                CREATE VIRTUAL TABLE IF NOT EXISTS symbols_fts USING fts5(
                    name, kind, signature, docstring,
                    content='symbols', content_rowid='rowid'
                );

                -- Triggers keep FTS in sync with the symbols table.
                CREATE TRIGGER IF NOT EXISTS symbols_ai AFTER INSERT ON symbols BEGIN
                    INSERT INTO symbols_fts(rowid, name, kind, signature, docstring)
                    VALUES (new.rowid, new.name, new.kind, new.signature, new.docstring);
                END;

                CREATE TRIGGER IF NOT EXISTS symbols_ad AFTER DELETE ON symbols BEGIN
                    INSERT INTO symbols_fts(symbols_fts, rowid, name, kind, signature, docstring)
                    VALUES ('delete', old.rowid, old.name, old.kind, old.signature, old.docstring);
                END;

                CREATE TRIGGER IF NOT EXISTS symbols_au AFTER UPDATE ON symbols BEGIN
                    INSERT INTO symbols_fts(symbols_fts, rowid, name, kind, signature, docstring)
                    VALUES ('delete', old.rowid, old.name, old.kind, old.signature, old.docstring);
                    INSERT INTO symbols_fts(rowid, name, kind, signature, docstring)
                    VALUES (new.rowid, new.name, new.kind, new.signature, new.docstring);
                END;
                ",
            )
            .map_err(|e| QuarryError::Store(format!("failed to create symbol schema: {e}")))?;
        Ok(())
    }

    /// Insert symbols for a batch of units, optionally recording the file
    /// they came from as `(relative_path, file_hash)`.
    ///
    /// When the file tuple is given, prior rows for that file are deleted
    /// first, so the call replaces the file's symbols wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on insert failure.
    pub fn add_symbols(&self, units: &[CodeUnit], file: Option<(&str, &str)>) -> Result<()> {
        if let Some((relative_path, _)) = file {
            self.conn
                .execute(
                    "DELETE FROM symbols WHERE relative_path = ?1",
                    params![relative_path],
                )
                .map_err(|e| QuarryError::Store(format!("failed to delete symbols: {e}")))?;
        }

        for unit in units {
            let signature = extract_signature(&unit.code);
            let docstring = unit.metadata.get("docstring").cloned();
            let parent = unit
                .metadata
                .get("class")
                .or_else(|| unit.metadata.get("impl"))
                .cloned();
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO symbols
                     (id, name, kind, relative_path, start_line, end_line,
                      language, signature, docstring, parent, file_hash)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        unit.id,
                        unit.name,
                        unit.kind.to_string(),
                        unit.relative_path,
                        unit.start_line,
                        unit.end_line,
                        unit.language,
                        signature,
                        docstring,
                        parent,
                        file.map(|(_, hash)| hash),
                    ],
                )
                .map_err(|e| QuarryError::Store(format!("failed to insert symbol: {e}")))?;
        }

        if let Some((relative_path, file_hash)) = file {
            let now = chrono::Utc::now().to_rfc3339();
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO indexed_files (relative_path, file_hash, indexed_at)
                     VALUES (?1, ?2, ?3)",
                    params![relative_path, file_hash, now],
                )
                .map_err(|e| QuarryError::Store(format!("failed to record file: {e}")))?;
        }

        debug!(count = units.len(), "symbols added");
        Ok(())
    }

    /// Replace all symbols for one file in a single step. A no-op when the
    /// recorded hash already matches `file_hash`.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on failure.
    pub fn update_file_symbols(
        &self,
        relative_path: &str,
        file_hash: &str,
        units: &[CodeUnit],
    ) -> Result<()> {
        if !self.is_file_modified(relative_path, file_hash)? {
            return Ok(());
        }
        self.add_symbols(units, Some((relative_path, file_hash)))
    }

    /// Whether `file_hash` differs from the recorded hash (or the file is
    /// untracked).
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on query failure.
    pub fn is_file_modified(&self, relative_path: &str, file_hash: &str) -> Result<bool> {
        let result = self.conn.query_row(
            "SELECT file_hash FROM indexed_files WHERE relative_path = ?1",
            params![relative_path],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(stored) => Ok(stored != file_hash),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(true),
            Err(e) => Err(QuarryError::Store(format!("failed to check file: {e}"))),
        }
    }

    /// Of `current` `(relative_path, file_hash)` pairs, the paths whose
    /// content changed or that were never indexed.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on query failure.
    pub fn get_modified_files(&self, current: &[(String, String)]) -> Result<Vec<String>> {
        let mut modified = Vec::new();
        for (relative_path, file_hash) in current {
            if self.is_file_modified(relative_path, file_hash)? {
                modified.push(relative_path.clone());
            }
        }
        Ok(modified)
    }

    /// All tracked files with their recorded hashes.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on query failure.
    pub fn tracked_files(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT relative_path, file_hash FROM indexed_files ORDER BY relative_path")
            .map_err(|e| QuarryError::Store(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| QuarryError::Store(format!("failed to query files: {e}")))?;
        let mut files = Vec::new();
        for row in rows {
            files.push(row.map_err(|e| QuarryError::Store(format!("failed to read row: {e}")))?);
        }
        Ok(files)
    }

    /// Drop all symbols and the tracking row for one file.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on delete failure.
    pub fn remove_file(&self, relative_path: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM symbols WHERE relative_path = ?1",
                params![relative_path],
            )
            .map_err(|e| QuarryError::Store(format!("failed to delete symbols: {e}")))?;
        self.conn
            .execute(
                "DELETE FROM indexed_files WHERE relative_path = ?1",
                params![relative_path],
            )
            .map_err(|e| QuarryError::Store(format!("failed to delete file record: {e}")))?;
        Ok(())
    }

    /// Substring name lookup, exact matches first, then shorter names.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on query failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use quarry_symbols::SymbolIndex;
    ///
    /// let index = SymbolIndex::in_memory().unwrap();
    /// assert!(index.search_by_name("connect", 10).unwrap().is_empty());
    /// ```
    pub fn search_by_name(&self, name: &str, limit: usize) -> Result<Vec<SymbolRow>> {
        let pattern = format!("%{name}%");
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, kind, relative_path, start_line, end_line,
                        language, signature, docstring, parent
                 FROM symbols
                 WHERE name LIKE ?1
                 ORDER BY (name = ?2) DESC, length(name) ASC, rowid ASC
                 LIMIT ?3",
            )
            .map_err(|e| QuarryError::Store(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params![pattern, name, limit as i64], row_to_symbol)
            .map_err(|e| QuarryError::Store(format!("failed to query symbols: {e}")))?;
        collect_symbols(rows)
    }

    /// All symbols of one kind (`"function"`, `"class"`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on query failure.
    pub fn search_by_type(&self, kind: &str, limit: usize) -> Result<Vec<SymbolRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, kind, relative_path, start_line, end_line,
                        language, signature, docstring, parent
                 FROM symbols WHERE kind = ?1
                 ORDER BY name ASC, rowid ASC
                 LIMIT ?2",
            )
            .map_err(|e| QuarryError::Store(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params![kind, limit as i64], row_to_symbol)
            .map_err(|e| QuarryError::Store(format!("failed to query symbols: {e}")))?;
        collect_symbols(rows)
    }

    /// FTS5 lookup over names, kinds, signatures, and docstrings.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on query failure.
    pub fn search_fulltext(&self, query: &str, limit: usize) -> Result<Vec<SymbolRow>> {
        let safe_query = sanitize_fts_query(query);
        if safe_query.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self
            .conn
            .prepare(
                "SELECT s.id, s.name, s.kind, s.relative_path, s.start_line, s.end_line,
                        s.language, s.signature, s.docstring, s.parent
                 FROM symbols_fts f
                 JOIN symbols s ON s.rowid = f.rowid
                 WHERE symbols_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .map_err(|e| QuarryError::Store(format!("failed to prepare FTS query: {e}")))?;
        let rows = stmt
            .query_map(params![safe_query, limit as i64], row_to_symbol)
            .map_err(|e| QuarryError::Store(format!("FTS query failed: {e}")))?;
        collect_symbols(rows)
    }

    /// All symbol ids, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on query failure.
    pub fn symbol_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM symbols ORDER BY id")
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

    /// Aggregate counts by kind and language.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on query failure.
    pub fn stats(&self) -> Result<SymbolStats> {
        let total_symbols: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))
            .map_err(|e| QuarryError::Store(format!("failed to count symbols: {e}")))?;
        let indexed_files: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM indexed_files", [], |row| row.get(0))
            .map_err(|e| QuarryError::Store(format!("failed to count files: {e}")))?;

        let mut stats = SymbolStats {
            total_symbols: total_symbols as usize,
            indexed_files: indexed_files as usize,
            ..SymbolStats::default()
        };

        for (sql, target) in [
            (
                "SELECT kind, COUNT(*) FROM symbols GROUP BY kind",
                &mut stats.by_kind,
            ),
            (
                "SELECT language, COUNT(*) FROM symbols GROUP BY language",
                &mut stats.by_language,
            ),
        ] {
            let mut stmt = self
                .conn
                .prepare(sql)
                .map_err(|e| QuarryError::Store(format!("failed to prepare stats query: {e}")))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .map_err(|e| QuarryError::Store(format!("failed to query stats: {e}")))?;
            for row in rows {
                let (key, count) =
                    row.map_err(|e| QuarryError::Store(format!("failed to read row: {e}")))?;
                target.insert(key, count as usize);
            }
        }

        Ok(stats)
    }

    /// Drop every symbol and tracking row.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on delete failure.
    pub fn clear(&self) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM symbols; DELETE FROM indexed_files;")
            .map_err(|e| QuarryError::Store(format!("failed to clear symbols: {e}")))?;
        Ok(())
    }
}

fn row_to_symbol(row: &rusqlite::Row<'_>) -> rusqlite::Result<SymbolRow> {
    Ok(SymbolRow {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        relative_path: row.get(3)?,
        start_line: row.get(4)?,
        end_line: row.get(5)?,
        language: row.get(6)?,
        signature: row.get(7)?,
        docstring: row.get(8)?,
        parent: row.get(9)?,
    })
}

fn collect_symbols(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<SymbolRow>>,
) -> Result<Vec<SymbolRow>> {
    let mut symbols = Vec::new();
    for row in rows {
        symbols.push(row.map_err(|e| QuarryError::Store(format!("failed to read symbol: {e}")))?);
    }
    Ok(symbols)
}

/// The declaration's head: text before the first `{` or `:`, whitespace
/// collapsed.
fn extract_signature(code: &str) -> String {
    let head = if let Some(pos) = code.find('{') {
        &code[..pos]
    } else if let Some(pos) = code.find(':') {
        &code[..pos]
    } else {
        code
    };
    head.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn sanitize_fts_query(query: &str) -> String {
    let words: Vec<String> = query
        .split_whitespace()
        .map(|w| {
            let clean: String = w
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            format!("\"{clean}\"")
        })
        .filter(|w| w != "\"\"")
        .collect();
    words.join(" OR ")
}
