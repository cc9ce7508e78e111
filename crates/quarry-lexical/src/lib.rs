//! Persistent BM25 inverted index over code units.
//!
//! The whole index lives in memory while open and is serialized to a JSON
//! snapshot on [`Bm25Index::save`]. Snapshots are written to a temporary
//! file and renamed into place so a crash never leaves a torn index.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use quarry_core::{QuarryError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Term-frequency saturation (BM25 `k1`).
const DEFAULT_K1: f64 = 1.5;
/// Length normalization (BM25 `b`).
const DEFAULT_B: f64 = 0.75;

/// Split text into search terms.
///
/// Lowercases, replaces every character that is neither ASCII alphanumeric
/// nor underscore by whitespace, splits, then drops tokens of length <= 2
/// and English stopwords. Underscored identifiers survive as single terms.
///
/// # Examples
///
/// ```
/// use quarry_lexical::tokenize;
///
/// let tokens = tokenize("Fetch_User_Data → JSON!");
/// assert_eq!(tokens, vec!["fetch_user_data", "json"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|t| t.len() > 2 && !is_stopword(t))
        .map(String::from)
        .collect()
}

/// Whether `word` belongs to the fixed English stopword set.
pub fn is_stopword(word: &str) -> bool {
    matches!(
        word,
        "the" | "a" | "an" | "and" | "or" | "in" | "on" | "at" | "to" | "for" | "of" | "with"
            | "by" | "is" | "are" | "am" | "be" | "been" | "being" | "have" | "has" | "do"
            | "does" | "did" | "will" | "would" | "could" | "should" | "can" | "may" | "might"
            | "must" | "shall" | "was" | "were"
    )
}

/// A document stored in the lexical index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocEntry {
    /// Text the document was tokenized from.
    pub text: String,
    /// Filterable metadata (language, relative_path, kind).
    pub metadata: BTreeMap<String, String>,
}

/// Index statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalStats {
    pub total_docs: usize,
    pub total_terms: usize,
    pub avg_doc_length: f64,
}

/// Metadata filter: every listed key must match one of its allowed values.
pub type MetadataFilter = BTreeMap<String, Vec<String>>;

/// BM25 inverted index.
///
/// # Examples
///
/// ```
/// use quarry_lexical::Bm25Index;
/// use std::collections::BTreeMap;
///
/// let mut index = Bm25Index::new();
/// index.add_document("a", "parse json payload", BTreeMap::new());
/// index.add_document("b", "open database connection", BTreeMap::new());
///
/// let hits = index.search("json", 10, None);
/// assert_eq!(hits[0].0, "a");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Index {
    k1: f64,
    b: f64,
    documents: HashMap<String, DocEntry>,
    /// Per-document term frequencies.
    tf: HashMap<String, HashMap<String, usize>>,
    /// Inverted index: term -> document ids.
    postings: HashMap<String, BTreeSet<String>>,
    doc_length: HashMap<String, usize>,
    avg_doc_length: f64,
    total_docs: usize,
}

impl Bm25Index {
    /// Create an empty index with the standard parameters.
    pub fn new() -> Self {
        Self::with_params(DEFAULT_K1, DEFAULT_B)
    }

    /// Create an empty index with explicit `k1` and `b`.
    pub fn with_params(k1: f64, b: f64) -> Self {
        Self {
            k1,
            b,
            documents: HashMap::new(),
            tf: HashMap::new(),
            postings: HashMap::new(),
            doc_length: HashMap::new(),
            avg_doc_length: 0.0,
            total_docs: 0,
        }
    }

    /// Add or replace a document.
    ///
    /// Re-adding an existing id replaces it, keeping postings consistent.
    pub fn add_document(&mut self, id: &str, text: &str, metadata: BTreeMap<String, String>) {
        if self.documents.contains_key(id) {
            self.remove_document(id);
        }

        let tokens = tokenize(text);
        let mut term_freqs: HashMap<String, usize> = HashMap::new();
        for token in &tokens {
            *term_freqs.entry(token.clone()).or_insert(0) += 1;
        }

        for term in term_freqs.keys() {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(id.to_string());
        }

        self.doc_length.insert(id.to_string(), tokens.len());
        self.tf.insert(id.to_string(), term_freqs);
        self.documents.insert(
            id.to_string(),
            DocEntry {
                text: text.to_string(),
                metadata,
            },
        );
        self.total_docs += 1;
        self.recompute_avg_length();
    }

    /// Add a batch of `(id, text, metadata)` documents.
    pub fn add_documents_batch(
        &mut self,
        documents: Vec<(String, String, BTreeMap<String, String>)>,
    ) {
        for (id, text, metadata) in documents {
            self.add_document(&id, &text, metadata);
        }
    }

    /// Remove a document. Returns `false` if the id was not indexed.
    pub fn remove_document(&mut self, id: &str) -> bool {
        let Some(term_freqs) = self.tf.remove(id) else {
            return false;
        };

        for term in term_freqs.keys() {
            if let Some(ids) = self.postings.get_mut(term) {
                ids.remove(id);
                if ids.is_empty() {
                    self.postings.remove(term);
                }
            }
        }

        self.documents.remove(id);
        self.doc_length.remove(id);
        self.total_docs -= 1;
        self.recompute_avg_length();
        true
    }

    fn recompute_avg_length(&mut self) {
        if self.total_docs == 0 {
            self.avg_doc_length = 0.0;
        } else {
            let total: usize = self.doc_length.values().sum();
            self.avg_doc_length = total as f64 / self.total_docs as f64;
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let df = self.postings.get(term).map_or(0, BTreeSet::len) as f64;
        if df == 0.0 {
            return 0.0;
        }
        let n = self.total_docs as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score_document(&self, id: &str, query_terms: &[String]) -> f64 {
        let Some(term_freqs) = self.tf.get(id) else {
            return 0.0;
        };
        let dl = self.doc_length.get(id).copied().unwrap_or(0) as f64;

        let mut score = 0.0;
        for term in query_terms {
            let tf = term_freqs.get(term).copied().unwrap_or(0) as f64;
            if tf == 0.0 {
                continue;
            }
            let idf = self.idf(term);
            let numerator = tf * (self.k1 + 1.0);
            let denominator =
                tf + self.k1 * (1.0 - self.b + self.b * (dl / self.avg_doc_length));
            score += idf * (numerator / denominator);
        }
        score
    }

    fn matches_filter(&self, id: &str, filters: &MetadataFilter) -> bool {
        let Some(doc) = self.documents.get(id) else {
            return false;
        };
        filters.iter().all(|(key, allowed)| {
            doc.metadata
                .get(key)
                .is_some_and(|value| allowed.iter().any(|a| a == value))
        })
    }

    /// Search the index, returning `(id, score)` pairs in descending score.
    ///
    /// Documents with zero query-term overlap are excluded. `filters`
    /// restricts candidates by metadata equality (set membership per key).
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        filters: Option<&MetadataFilter>,
    ) -> Vec<(String, f64)> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        // Only documents containing at least one query term are candidates.
        let mut candidates: HashSet<&String> = HashSet::new();
        for term in &query_terms {
            if let Some(ids) = self.postings.get(term) {
                candidates.extend(ids);
            }
        }

        let mut scores: Vec<(String, f64)> = candidates
            .into_iter()
            .filter(|id| filters.is_none_or(|f| self.matches_filter(id, f)))
            .map(|id| (id.clone(), self.score_document(id, &query_terms)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scores.truncate(limit);
        scores
    }

    /// Whether the given document id is indexed.
    pub fn contains(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    /// All indexed document ids, sorted.
    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.documents.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Look up a stored document.
    pub fn document(&self, id: &str) -> Option<&DocEntry> {
        self.documents.get(id)
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.total_docs
    }

    /// Whether the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.total_docs == 0
    }

    /// Drop all documents and postings.
    pub fn clear(&mut self) {
        self.documents.clear();
        self.tf.clear();
        self.postings.clear();
        self.doc_length.clear();
        self.avg_doc_length = 0.0;
        self.total_docs = 0;
    }

    /// Index statistics.
    pub fn stats(&self) -> LexicalStats {
        LexicalStats {
            total_docs: self.total_docs,
            total_terms: self.postings.len(),
            avg_doc_length: self.avg_doc_length,
        }
    }

    /// Serialize the index to `path`, atomically (write-then-rename).
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Io`] on write failure or
    /// [`QuarryError::Serialization`] if encoding fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        debug!(docs = self.total_docs, path = %path.display(), "saved lexical index");
        Ok(())
    }

    /// Load an index snapshot from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::FileNotFound`] if the snapshot does not exist,
    /// [`QuarryError::Io`] on read failure, or
    /// [`QuarryError::Serialization`] on a corrupt snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(QuarryError::FileNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        let index: Self = serde_json::from_str(&json)?;
        Ok(index)
    }
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn tokenize_splits_and_drops() {
        let tokens = tokenize("Fetch_User_Data → JSON!");
        assert_eq!(tokens, vec!["fetch_user_data", "json"]);
    }

    #[test]
    fn tokenize_contract_holds_for_arbitrary_text() {
        let tokens = tokenize("The quick_brown FOX does JUMP over a lazy-dog (42x)!");
        for t in &tokens {
            assert!(t.len() > 2, "short token survived: {t}");
            assert!(!is_stopword(t), "stopword survived: {t}");
            assert!(
                t.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
                "bad char in token: {t}"
            );
            assert_eq!(*t, t.to_lowercase());
        }
        assert!(tokens.contains(&"quick_brown".to_string()));
        assert!(tokens.contains(&"fox".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"does".to_string()));
    }

    #[test]
    fn add_and_search_ranks_overlap() {
        let mut index = Bm25Index::new();
        index.add_document("1", "quick brown fox jumps", BTreeMap::new());
        index.add_document("2", "lazy dog sleeps", BTreeMap::new());
        index.add_document("3", "quick rabbit runs", BTreeMap::new());

        let results = index.search("quick fox", 10, None);
        assert!(!results.is_empty());
        assert_eq!(results[0].0, "1");
        // Zero-overlap doc is excluded entirely.
        assert!(results.iter().all(|(id, _)| id != "2"));
    }

    #[test]
    fn bm25_monotonic_in_term_frequency() {
        let mut index = Bm25Index::new();
        // Same length, A has strictly more "token" occurrences than B.
        index.add_document("a", "token token token filler", BTreeMap::new());
        index.add_document("b", "token filler filler filler", BTreeMap::new());

        let results = index.search("token", 10, None);
        assert_eq!(results[0].0, "a");
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn readd_replaces_document() {
        let mut index = Bm25Index::new();
        index.add_document("1", "alpha beta", BTreeMap::new());
        index.add_document("1", "gamma delta", BTreeMap::new());

        assert_eq!(index.len(), 1);
        assert!(index.search("alpha", 10, None).is_empty());
        assert_eq!(index.search("gamma", 10, None).len(), 1);
    }

    #[test]
    fn remove_updates_postings_and_stats() {
        let mut index = Bm25Index::new();
        index.add_document("1", "unique term here", BTreeMap::new());
        index.add_document("2", "different content entirely", BTreeMap::new());

        assert!(index.remove_document("1"));
        assert!(!index.remove_document("1"));

        assert!(index.search("unique", 10, None).is_empty());
        let stats = index.stats();
        assert_eq!(stats.total_docs, 1);
        assert_eq!(stats.avg_doc_length, 3.0);
    }

    #[test]
    fn avg_doc_length_tracks_mutations() {
        let mut index = Bm25Index::new();
        index.add_document("1", "one_tok two_tok", BTreeMap::new()); // 2 tokens
        index.add_document("2", "three four five six", BTreeMap::new()); // 4 tokens
        assert!((index.stats().avg_doc_length - 3.0).abs() < 1e-9);

        index.remove_document("2");
        assert!((index.stats().avg_doc_length - 2.0).abs() < 1e-9);
    }

    #[test]
    fn metadata_filter_restricts_results() {
        let mut index = Bm25Index::new();
        index.add_document("rs", "parse tokens", meta(&[("language", "rust")]));
        index.add_document("py", "parse tokens", meta(&[("language", "python")]));

        let mut filter = MetadataFilter::new();
        filter.insert("language".into(), vec!["rust".into()]);
        let results = index.search("parse", 10, Some(&filter));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "rs");

        filter.insert("language".into(), vec!["rust".into(), "python".into()]);
        assert_eq!(index.search("parse", 10, Some(&filter)).len(), 2);
    }

    #[test]
    fn empty_query_returns_nothing() {
        let mut index = Bm25Index::new();
        index.add_document("1", "some content here", BTreeMap::new());
        assert!(index.search("", 10, None).is_empty());
        assert!(index.search("a to", 10, None).is_empty());
    }

    #[test]
    fn search_respects_limit() {
        let mut index = Bm25Index::new();
        for i in 0..20 {
            index.add_document(
                &i.to_string(),
                &format!("document number{i} with shared words"),
                BTreeMap::new(),
            );
        }
        assert_eq!(index.search("document shared", 5, None).len(), 5);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bm25.json");

        let mut index = Bm25Index::new();
        index.add_document("doc1", "hello world rust", meta(&[("kind", "function")]));
        index.add_document("doc2", "rust programming language", BTreeMap::new());
        index.save(&path).unwrap();
        assert!(path.exists());

        let loaded = Bm25Index::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.search("rust", 10, None).len(), 2);
        assert_eq!(
            loaded.document("doc1").unwrap().metadata.get("kind").unwrap(),
            "function"
        );
    }

    #[test]
    fn load_missing_snapshot_fails() {
        let err = Bm25Index::load(Path::new("/nonexistent/bm25.json")).unwrap_err();
        assert!(matches!(err, QuarryError::FileNotFound(_)));
    }

    #[test]
    fn clear_empties_everything() {
        let mut index = Bm25Index::new();
        index.add_document("1", "content here now", BTreeMap::new());
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.stats().total_terms, 0);
        assert!(index.document_ids().is_empty());
    }
}
