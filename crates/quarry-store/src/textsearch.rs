//! Token-overlap fallback store, persisted as a JSON snapshot.
//!
//! Used when no embedding endpoint is available: units are ranked by how
//! many query tokens appear in their name and code, max-normalized into
//! `[0, 1]`. Vectors handed to `insert` are accepted and ignored.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use quarry_core::{CodeUnit, Result};
use quarry_lexical::tokenize;

use crate::{StoredUnit, UnitFilter, VectorHit, VectorStore};

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    units: Vec<StoredUnit>,
}

/// JSON-backed lexical store for the `textsearch` backend.
///
/// # Examples
///
/// ```
/// use quarry_store::{TextSearchStore, VectorStore};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = TextSearchStore::open(&dir.path().join("index.json")).unwrap();
/// assert_eq!(store.dim(), None);
/// ```
pub struct TextSearchStore {
    path: PathBuf,
    units: HashMap<String, StoredUnit>,
    /// token -> unit ids containing it, rebuilt from the snapshot on open.
    postings: HashMap<String, HashSet<String>>,
}

impl TextSearchStore {
    /// Open or create the snapshot at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`quarry_core::QuarryError::Io`] on read failure or
    /// [`quarry_core::QuarryError::Serialization`] on a corrupt snapshot.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<Snapshot>(&content)?
        } else {
            Snapshot::default()
        };

        let mut store = Self {
            path: path.to_path_buf(),
            units: HashMap::new(),
            postings: HashMap::new(),
        };
        for unit in snapshot.units {
            store.index_unit(unit);
        }
        debug!(count = store.units.len(), "textsearch snapshot loaded");
        Ok(store)
    }

    fn index_unit(&mut self, stored: StoredUnit) {
        let id = stored.unit.id.clone();
        self.unindex(&id);
        for token in unit_tokens(&stored.unit) {
            self.postings.entry(token).or_default().insert(id.clone());
        }
        self.units.insert(id, stored);
    }

    fn unindex(&mut self, id: &str) {
        if self.units.remove(id).is_some() {
            self.postings.retain(|_, ids| {
                ids.remove(id);
                !ids.is_empty()
            });
        }
    }

    fn save(&self) -> Result<()> {
        let mut units: Vec<&StoredUnit> = self.units.values().collect();
        units.sort_by(|a, b| a.unit.id.cmp(&b.unit.id));
        let snapshot = serde_json::json!({ "units": units });
        let content = serde_json::to_string(&snapshot)?;

        // Write-then-rename keeps the snapshot whole under interruption.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Tokens for a unit: its name and code, with identifier subwords added so a
/// query for `authenticate` reaches `authenticate_user`.
fn unit_tokens(unit: &CodeUnit) -> HashSet<String> {
    let text = format!("{} {}", unit.name, unit.code);
    let mut tokens: HashSet<String> = HashSet::new();
    for token in tokenize(&text) {
        for part in token.split('_') {
            if part.len() > 2 {
                tokens.insert(part.to_string());
            }
        }
        tokens.insert(token);
    }
    tokens
}

fn query_tokens(query: &str) -> Vec<String> {
    let mut tokens: HashSet<String> = HashSet::new();
    for token in tokenize(query) {
        for part in token.split('_') {
            if part.len() > 2 {
                tokens.insert(part.to_string());
            }
        }
        tokens.insert(token);
    }
    tokens.into_iter().collect()
}

impl VectorStore for TextSearchStore {
    fn insert(&mut self, units: &[StoredUnit]) -> Result<usize> {
        for stored in units {
            self.index_unit(stored.clone());
        }
        self.save()?;
        Ok(units.len())
    }

    fn search(
        &self,
        _query_vector: Option<&[f32]>,
        query_text: &str,
        limit: usize,
        filter: &UnitFilter,
    ) -> Result<Vec<VectorHit>> {
        let tokens = query_tokens(query_text);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut scores: HashMap<&str, f64> = HashMap::new();
        for token in &tokens {
            if let Some(ids) = self.postings.get(token) {
                for id in ids {
                    *scores.entry(id.as_str()).or_insert(0.0) += 1.0;
                }
            }
        }

        let max_score = scores.values().cloned().fold(0.0f64, f64::max);
        if max_score == 0.0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<VectorHit> = scores
            .into_iter()
            .filter_map(|(id, score)| {
                let stored = self.units.get(id)?;
                if !filter.matches(&stored.unit) {
                    return None;
                }
                Some(VectorHit {
                    unit: stored.unit.clone(),
                    similarity: (score / max_score).min(1.0),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.unit.id.cmp(&b.unit.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    fn get(&self, id: &str) -> Result<Option<CodeUnit>> {
        Ok(self.units.get(id).map(|stored| stored.unit.clone()))
    }

    fn ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.units.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn ids_for_path(&self, relative_path: &str) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .units
            .values()
            .filter(|stored| stored.unit.relative_path == relative_path)
            .map(|stored| stored.unit.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn delete(&mut self, filter: &UnitFilter) -> Result<usize> {
        let doomed: Vec<String> = self
            .units
            .values()
            .filter(|stored| filter.matches(&stored.unit))
            .map(|stored| stored.unit.id.clone())
            .collect();
        for id in &doomed {
            self.unindex(id);
        }
        if !doomed.is_empty() {
            self.save()?;
        }
        Ok(doomed.len())
    }

    fn count(&self, filter: &UnitFilter) -> Result<usize> {
        Ok(self
            .units
            .values()
            .filter(|stored| filter.matches(&stored.unit))
            .count())
    }

    fn dim(&self) -> Option<usize> {
        None
    }

    fn close(&mut self) -> Result<()> {
        self.save()
    }
}
