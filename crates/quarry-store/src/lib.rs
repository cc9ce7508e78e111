//! Vector store backends for the quarry engine.
//!
//! A [`VectorStore`] persists [`CodeUnit`]s with their dense vectors and
//! answers similarity queries. Two backends exist:
//!
//! - [`SqliteVectorStore`] — SQLite with little-endian `f32` BLOB vectors
//!   and cosine similarity computed in Rust (the default)
//! - [`TextSearchStore`] — a JSON snapshot with token-overlap scoring, for
//!   environments with no embedding endpoint
//!
//! [`open_store`] picks the backend named in `config.yaml`.

mod sqlite;
mod textsearch;

pub use sqlite::SqliteVectorStore;
pub use textsearch::TextSearchStore;

use std::path::Path;

use quarry_core::{CodeUnit, QuarryError, Result};

/// A unit as persisted: the unit itself, its optional dense vector, and the
/// RFC 3339 timestamp of the indexing run that wrote it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoredUnit {
    pub unit: CodeUnit,
    pub vector: Option<Vec<f32>>,
    pub indexed_at: String,
}

/// A similarity hit from a store search.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub unit: CodeUnit,
    /// Similarity in `[0, 1]`.
    pub similarity: f64,
}

/// Conjunctive equality/membership filter over unit attributes.
///
/// Empty lists impose no constraint; non-empty lists match any listed value.
///
/// # Examples
///
/// ```
/// use quarry_core::{CodeUnit, UnitKind};
/// use quarry_store::UnitFilter;
///
/// let unit = CodeUnit::new("src/db.rs", "rust", UnitKind::Function, "connect", "fn connect() {}", 1, 1);
/// let filter = UnitFilter {
///     languages: vec!["rust".into()],
///     ..UnitFilter::default()
/// };
/// assert!(filter.matches(&unit));
/// ```
#[derive(Debug, Clone, Default)]
pub struct UnitFilter {
    pub languages: Vec<String>,
    pub relative_paths: Vec<String>,
    pub kinds: Vec<String>,
}

impl UnitFilter {
    /// Filter matching every unit.
    pub fn any() -> Self {
        Self::default()
    }

    /// Filter restricted to one file.
    pub fn for_path(relative_path: &str) -> Self {
        Self {
            relative_paths: vec![relative_path.to_string()],
            ..Self::default()
        }
    }

    /// Whether all present constraints accept the unit.
    pub fn matches(&self, unit: &CodeUnit) -> bool {
        (self.languages.is_empty() || self.languages.contains(&unit.language))
            && (self.relative_paths.is_empty()
                || self.relative_paths.contains(&unit.relative_path))
            && (self.kinds.is_empty() || self.kinds.contains(&unit.kind.to_string()))
    }

    /// True when no constraint is present.
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty() && self.relative_paths.is_empty() && self.kinds.is_empty()
    }
}

/// Persistent unit storage with similarity search.
///
/// Implementations own durability: `insert` is atomic per call, and `close`
/// flushes anything buffered.
pub trait VectorStore {
    /// Insert or replace units by id. Returns how many were written.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::DimensionMismatch`] if any vector disagrees
    /// with the store's locked dimensionality; nothing is written in that
    /// case. Returns [`QuarryError::Store`] on storage failure.
    fn insert(&mut self, units: &[StoredUnit]) -> Result<usize>;

    /// Rank stored units against a query.
    ///
    /// Dense backends use `query_vector`; the text fallback uses
    /// `query_text`. Hits come back sorted by descending similarity,
    /// truncated to `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on storage failure.
    fn search(
        &self,
        query_vector: Option<&[f32]>,
        query_text: &str,
        limit: usize,
        filter: &UnitFilter,
    ) -> Result<Vec<VectorHit>>;

    /// Fetch one unit by id.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on storage failure.
    fn get(&self, id: &str) -> Result<Option<CodeUnit>>;

    /// All stored unit ids, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on storage failure.
    fn ids(&self) -> Result<Vec<String>>;

    /// Unit ids belonging to one file.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on storage failure.
    fn ids_for_path(&self, relative_path: &str) -> Result<Vec<String>>;

    /// Delete matching units. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on storage failure.
    fn delete(&mut self, filter: &UnitFilter) -> Result<usize>;

    /// Count matching units.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on storage failure.
    fn count(&self, filter: &UnitFilter) -> Result<usize>;

    /// The locked vector dimensionality, if the backend stores vectors.
    fn dim(&self) -> Option<usize>;

    /// Flush and release resources.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] if the final flush fails.
    fn close(&mut self) -> Result<()>;
}

/// Open the store named by `backend` under the engine data directory.
///
/// # Errors
///
/// Returns [`QuarryError::Config`] for an unknown backend name, or the
/// backend's own open error.
///
/// # Examples
///
/// ```
/// use quarry_store::open_store;
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = open_store("sqlite", dir.path(), 384).unwrap();
/// assert_eq!(store.dim(), Some(384));
/// assert!(open_store("pinecone", dir.path(), 384).is_err());
/// ```
pub fn open_store(backend: &str, data_path: &Path, dim: usize) -> Result<Box<dyn VectorStore>> {
    match backend {
        "sqlite" => {
            let store = SqliteVectorStore::open(&data_path.join("sqlite").join("units.db"), dim)?;
            Ok(Box::new(store))
        }
        "textsearch" => {
            let store = TextSearchStore::open(&data_path.join("textsearch").join("index.json"))?;
            Ok(Box::new(store))
        }
        other => Err(QuarryError::Config(format!(
            "unknown vector store backend: '{other}' (expected 'sqlite' or 'textsearch')"
        ))),
    }
}

/// Cosine similarity mapped into `[0, 1]`; negative cosine clamps to zero.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for i in 0..a.len() {
        let ai = a[i] as f64;
        let bi = b[i] as f64;
        dot += ai * bi;
        norm_a += ai * ai;
        norm_b += bi * bi;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    (dot / denom).max(0.0)
}
