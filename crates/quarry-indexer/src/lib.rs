//! Indexing and search orchestration.
//!
//! [`SemanticIndexer`] wires the whole engine together: it walks the project,
//! segments source files into code units, embeds them, and keeps three
//! synchronized persistence layers — the vector store, the BM25 lexical
//! index, and the SQLite symbol index — all under
//! `.lazygophers/ccplugin/semantic/` in the project root.
//!
//! Indexing is incremental (unchanged files are skipped by content hash) and
//! cancellable at file granularity. Search runs in pure vector mode or in
//! hybrid mode, where dense and lexical candidate lists are fused by
//! `quarry-search`.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

use quarry_core::{
    content_hash, data_dir, CodeUnit, IndexReport, QuarryError, Result, ScoreType, SearchResult,
    SemanticConfig,
};
use quarry_embed::{EmbeddingBackend, HttpEmbedding};
use quarry_lexical::{Bm25Index, LexicalStats, MetadataFilter};
use quarry_search::{HybridRanker, QueryAnalysis, QueryAnalyzer, RankStrategy};
use quarry_segment::{discover, segment_file, truncate_code, Language, SourceFile};
use quarry_store::{open_store, StoredUnit, UnitFilter, VectorStore};
use quarry_symbols::{SymbolIndex, SymbolRow, SymbolStats};

/// BM25 snapshot file inside the data directory.
const BM25_FILE: &str = "bm25.json";
/// Symbol database file inside the data directory.
const SYMBOLS_DB: &str = "symbols.db";

/// Upper bound on query variants tried by [`SemanticIndexer::search_with_expansion`].
const MAX_EXPANSION_VARIANTS: usize = 3;

/// How to score results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Dense cosine similarity only.
    Vector,
    /// Dense and lexical lists fused by a [`RankStrategy`].
    #[default]
    Hybrid,
}

/// Knobs for one search call.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum results returned.
    pub limit: usize,
    /// Restrict to one language tag and bias query analysis toward it.
    pub language: Option<String>,
    /// Minimum score; `None` takes the config threshold in vector mode and
    /// no threshold in hybrid mode (fused RRF scores live on a much smaller
    /// scale than cosine similarities).
    pub threshold: Option<f64>,
    pub mode: SearchMode,
    pub strategy: RankStrategy,
    /// `(vector_weight, keyword_weight)` override; must sum to 1.
    pub weights: Option<(f64, f64)>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            language: None,
            threshold: None,
            mode: SearchMode::default(),
            strategy: RankStrategy::default(),
            weights: None,
        }
    }
}

/// Aggregate engine statistics.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub backend: String,
    pub embedding_model: String,
    pub units: usize,
    pub lexical: LexicalStats,
    pub symbols: SymbolStats,
}

/// The top-level engine handle for one project.
///
/// # Examples
///
/// ```no_run
/// use quarry_indexer::{SearchOptions, SemanticIndexer};
/// use std::path::Path;
///
/// let mut indexer = SemanticIndexer::open(Path::new("/repo"))?;
/// let report = indexer.index_project()?;
/// println!("indexed {} units", report.units_indexed);
///
/// let results = indexer.search("where is the user authenticated", &SearchOptions::default())?;
/// for r in &results {
///     println!("{:.3} {}:{} {}", r.score, r.relative_path, r.start_line, r.name);
/// }
/// # Ok::<(), quarry_core::QuarryError>(())
/// ```
pub struct SemanticIndexer {
    project_root: PathBuf,
    data_dir: PathBuf,
    config: SemanticConfig,
    embedder: Box<dyn EmbeddingBackend>,
    store: Box<dyn VectorStore>,
    bm25: Bm25Index,
    symbols: SymbolIndex,
    analyzer: QueryAnalyzer,
}

impl SemanticIndexer {
    /// Open the engine for `project_root` with the HTTP embedding backend
    /// named in `config.yaml` (materializing a default config on first use).
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Embedding`] if the embedding endpoint is
    /// unreachable, or the underlying store/config error.
    pub fn open(project_root: &Path) -> Result<Self> {
        let data = data_dir(project_root);
        let config = SemanticConfig::load_or_init(&data)?;
        let embedder = Box::new(HttpEmbedding::new(&config.embedding_model));
        Self::with_backend(project_root, config, embedder)
    }

    /// Open the engine with an explicit configuration and embedding backend.
    ///
    /// The `textsearch` store keeps no vectors, so the backend is left
    /// unloaded there and never called.
    ///
    /// # Errors
    ///
    /// Returns the backend load error or the store open error.
    pub fn with_backend(
        project_root: &Path,
        config: SemanticConfig,
        mut embedder: Box<dyn EmbeddingBackend>,
    ) -> Result<Self> {
        let data = data_dir(project_root);
        std::fs::create_dir_all(&data)?;

        if config.backend != "textsearch" {
            embedder.load()?;
        }
        let store = open_store(&config.backend, &data, embedder.dim())?;

        let bm25_path = data.join(BM25_FILE);
        let bm25 = match Bm25Index::load(&bm25_path) {
            Ok(index) => index,
            Err(QuarryError::FileNotFound(_)) => Bm25Index::new(),
            Err(e) => {
                warn!(error = %e, path = %bm25_path.display(), "lexical snapshot unreadable, starting fresh");
                Bm25Index::new()
            }
        };
        let symbols = SymbolIndex::open(&data.join(SYMBOLS_DB))?;

        info!(
            root = %project_root.display(),
            backend = %config.backend,
            model = embedder.name(),
            "engine opened"
        );

        Ok(Self {
            project_root: project_root.to_path_buf(),
            data_dir: data,
            config,
            embedder,
            store,
            bm25,
            symbols,
            analyzer: QueryAnalyzer::new(),
        })
    }

    /// The engine configuration in effect.
    pub fn config(&self) -> &SemanticConfig {
        &self.config
    }

    /// The symbol index, for direct name/kind/full-text lookups.
    pub fn symbols(&self) -> &SymbolIndex {
        &self.symbols
    }

    /// Index the whole project incrementally.
    ///
    /// # Errors
    ///
    /// Returns an error only for engine-level failures (walking the tree,
    /// persisting the lexical snapshot). Per-file failures are logged,
    /// counted in [`IndexReport::errors`], and skipped.
    pub fn index_project(&mut self) -> Result<IndexReport> {
        self.index_project_with_cancel(&AtomicBool::new(false))
    }

    /// Index the project, checking `cancel` between files.
    ///
    /// A cancelled run stops cleanly at a file boundary: everything indexed
    /// so far stays persisted and the next run resumes from the hashes.
    ///
    /// # Errors
    ///
    /// Same as [`SemanticIndexer::index_project`].
    pub fn index_project_with_cancel(&mut self, cancel: &AtomicBool) -> Result<IndexReport> {
        let allowed = self.allowed_languages();
        let files = discover(&self.project_root, &allowed)?;

        let mut report = IndexReport {
            files_total: files.len(),
            ..IndexReport::default()
        };
        let mut cancelled = false;

        for file in &files {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }

            let hash = content_hash(file.content.as_bytes());
            match self.symbols.is_file_modified(&file.relative_path, &hash) {
                Ok(false) => {
                    report.files_skipped += 1;
                    continue;
                }
                Ok(true) => {}
                Err(e) => {
                    warn!(path = %file.relative_path, error = %e, "change check failed");
                    report.errors += 1;
                    continue;
                }
            }

            match self.index_file(file, &hash) {
                Ok(units) => {
                    report.files_indexed += 1;
                    report.units_indexed += units;
                }
                Err(e) => {
                    warn!(path = %file.relative_path, error = %e, "file skipped");
                    report.errors += 1;
                }
            }
        }

        if !cancelled {
            self.sweep_orphans(&files)?;
        }

        self.bm25.save(&self.data_dir.join(BM25_FILE))?;

        info!(
            total = report.files_total,
            indexed = report.files_indexed,
            skipped = report.files_skipped,
            units = report.units_indexed,
            errors = report.errors,
            cancelled,
            "indexing finished"
        );
        Ok(report)
    }

    /// Reindex one file: segment and embed the new units, then swap them in
    /// for the old ones across all three layers. Returns the unit count.
    fn index_file(&mut self, file: &SourceFile, hash: &str) -> Result<usize> {
        let units = segment_file(&file.relative_path, &file.content, file.language)?;

        if units.is_empty() {
            for id in self.store.ids_for_path(&file.relative_path)? {
                self.bm25.remove_document(&id);
            }
            self.store.delete(&UnitFilter::for_path(&file.relative_path))?;
            // Track the file anyway so it is not re-segmented every run.
            self.symbols.update_file_symbols(&file.relative_path, hash, &units)?;
            return Ok(0);
        }

        let texts: Vec<String> = units
            .iter()
            .map(|u| truncate_code(&u.code, self.config.max_chunk_size))
            .collect();

        // Embed before touching any store, so a failure here leaves the
        // file's previous units intact and the three layers in agreement.
        let vectors: Vec<Option<Vec<f32>>> = if self.store.dim().is_some() {
            self.embedder
                .encode(&texts)?
                .into_iter()
                .map(Some)
                .collect()
        } else {
            vec![None; units.len()]
        };

        // Old unit ids leave the lexical index before the store forgets them.
        for id in self.store.ids_for_path(&file.relative_path)? {
            self.bm25.remove_document(&id);
        }
        self.store.delete(&UnitFilter::for_path(&file.relative_path))?;

        let indexed_at = chrono::Utc::now().to_rfc3339();
        let stored: Vec<StoredUnit> = units
            .iter()
            .zip(vectors)
            .map(|(unit, vector)| StoredUnit {
                unit: unit.clone(),
                vector,
                indexed_at: indexed_at.clone(),
            })
            .collect();
        self.store.insert(&stored)?;

        for (unit, text) in units.iter().zip(&texts) {
            let mut metadata = BTreeMap::new();
            metadata.insert("language".to_string(), unit.language.clone());
            metadata.insert("relative_path".to_string(), unit.relative_path.clone());
            metadata.insert("kind".to_string(), unit.kind.to_string());
            let doc = format!(
                "{} {} {} {}",
                unit.name,
                name_subwords(&unit.name),
                unit.relative_path,
                text
            );
            self.bm25.add_document(&unit.id, &doc, metadata);
        }

        self.symbols
            .update_file_symbols(&file.relative_path, hash, &units)?;

        debug!(path = %file.relative_path, units = units.len(), "file indexed");
        Ok(units.len())
    }

    /// Drop units for files that are tracked but no longer on disk.
    fn sweep_orphans(&mut self, discovered: &[SourceFile]) -> Result<()> {
        let present: HashSet<&str> = discovered
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect();

        for (relative_path, _) in self.symbols.tracked_files()? {
            if present.contains(relative_path.as_str()) {
                continue;
            }
            for id in self.store.ids_for_path(&relative_path)? {
                self.bm25.remove_document(&id);
            }
            self.store.delete(&UnitFilter::for_path(&relative_path))?;
            self.symbols.remove_file(&relative_path)?;
            debug!(path = %relative_path, "orphaned file removed");
        }
        Ok(())
    }

    fn allowed_languages(&self) -> Vec<Language> {
        match &self.config.supported_languages {
            Some(tags) => tags
                .iter()
                .filter_map(|tag| Language::from_tag(tag))
                .collect(),
            None => Language::ALL.to_vec(),
        }
    }

    /// Analyze a query without searching.
    pub fn analyze_query(&self, query: &str, language: Option<&str>) -> QueryAnalysis {
        self.analyzer.analyze(query, language)
    }

    /// Search the index.
    ///
    /// An empty (post-normalization) query, an embedding failure, or invalid
    /// rank weights yield an empty result list rather than an error; those
    /// are query problems, not engine problems.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] if a persistence layer fails.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let analysis = self.analyzer.analyze(query, options.language.as_deref());
        if analysis.normalized.is_empty() {
            debug!("empty query after normalization");
            return Ok(Vec::new());
        }

        let filter = UnitFilter {
            languages: options.language.iter().cloned().collect(),
            ..UnitFilter::default()
        };

        let query_vector = if self.store.dim().is_some() {
            match self.embedder.encode_query(&analysis.original) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(error = %e, "query embedding failed");
                    return Ok(Vec::new());
                }
            }
        } else {
            None
        };

        match options.mode {
            SearchMode::Vector => self.search_vector(&analysis, query_vector, options, &filter),
            SearchMode::Hybrid => self.search_hybrid(&analysis, query_vector, options, &filter),
        }
    }

    fn search_vector(
        &self,
        analysis: &QueryAnalysis,
        query_vector: Option<Vec<f32>>,
        options: &SearchOptions,
        filter: &UnitFilter,
    ) -> Result<Vec<SearchResult>> {
        let threshold = options
            .threshold
            .unwrap_or(self.config.similarity_threshold);
        let hits = self.store.search(
            query_vector.as_deref(),
            &analysis.rewritten,
            options.limit,
            filter,
        )?;
        Ok(hits
            .into_iter()
            .filter(|h| h.similarity >= threshold)
            .map(|h| SearchResult::from_unit(h.unit, h.similarity, ScoreType::VectorSimilarity))
            .collect())
    }

    fn search_hybrid(
        &self,
        analysis: &QueryAnalysis,
        query_vector: Option<Vec<f32>>,
        options: &SearchOptions,
        filter: &UnitFilter,
    ) -> Result<Vec<SearchResult>> {
        let ranker = match options.weights {
            Some((vector_weight, keyword_weight)) => {
                match HybridRanker::with_weights(vector_weight, keyword_weight) {
                    Ok(ranker) => ranker,
                    Err(e) => {
                        warn!(error = %e, "invalid rank weights");
                        return Ok(Vec::new());
                    }
                }
            }
            None => HybridRanker::new(),
        };

        // Each source contributes a pool twice the requested size so fusion
        // can surface units the other source missed.
        let pool = options.limit.saturating_mul(2).max(options.limit);
        let dense_hits = self.store.search(
            query_vector.as_deref(),
            &analysis.rewritten,
            pool,
            filter,
        )?;

        let lexical_filter: Option<MetadataFilter> = options.language.as_ref().map(|language| {
            let mut f = MetadataFilter::new();
            f.insert("language".to_string(), vec![language.clone()]);
            f
        });
        let lexical_hits = self
            .bm25
            .search(&analysis.rewritten, pool, lexical_filter.as_ref());

        let mut units: BTreeMap<String, CodeUnit> = BTreeMap::new();
        let dense: Vec<(String, f64)> = dense_hits
            .into_iter()
            .map(|h| {
                let pair = (h.unit.id.clone(), h.similarity);
                units.insert(h.unit.id.clone(), h.unit);
                pair
            })
            .collect();

        let threshold = options.threshold.unwrap_or(0.0);
        let fused = ranker.fuse(
            options.strategy,
            &dense,
            &lexical_hits,
            options.limit,
            threshold,
        )?;

        let mut results = Vec::with_capacity(fused.len());
        for entry in fused {
            let unit = match units.remove(&entry.id) {
                Some(unit) => Some(unit),
                // Lexical-only hits are hydrated from the store.
                None => self.store.get(&entry.id)?,
            };
            let Some(unit) = unit else {
                debug!(id = %entry.id, "stale lexical hit dropped");
                continue;
            };
            if !filter.matches(&unit) {
                continue;
            }
            let mut result = SearchResult::from_unit(unit, entry.score, ScoreType::Hybrid);
            result.vector_score = Some(entry.vector_score);
            result.keyword_score = Some(entry.keyword_score);
            results.push(result);
        }
        Ok(results)
    }

    /// Search across the query's expansion variants and merge the result
    /// sets, averaging the score of a unit over the variants that found it.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] if a persistence layer fails.
    pub fn search_with_expansion(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let analysis = self.analyzer.analyze(query, options.language.as_deref());
        let variants: Vec<&String> = analysis
            .expanded
            .iter()
            .take(MAX_EXPANSION_VARIANTS)
            .collect();

        let mut merged: BTreeMap<String, (SearchResult, f64, usize)> = BTreeMap::new();
        for variant in variants {
            for result in self.search(variant, options)? {
                match merged.get_mut(&result.id) {
                    Some((_, total, count)) => {
                        *total += result.score;
                        *count += 1;
                    }
                    None => {
                        let score = result.score;
                        merged.insert(result.id.clone(), (result, score, 1));
                    }
                }
            }
        }

        let mut results: Vec<SearchResult> = merged
            .into_values()
            .map(|(mut result, total, count)| {
                result.score = total / count as f64;
                result
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(options.limit);
        Ok(results)
    }

    /// Substring symbol lookup, exact names first.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on query failure.
    pub fn find_symbol(&self, name: &str, limit: usize) -> Result<Vec<SymbolRow>> {
        self.symbols.search_by_name(name, limit)
    }

    /// Aggregate statistics over all three persistence layers.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on query failure.
    pub fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            backend: self.config.backend.clone(),
            embedding_model: self.embedder.name().to_string(),
            units: self.store.count(&UnitFilter::any())?,
            lexical: self.bm25.stats(),
            symbols: self.symbols.stats()?,
        })
    }

    /// Drop every indexed unit, lexical document, and symbol.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] on delete failure.
    pub fn clear(&mut self) -> Result<()> {
        self.store.delete(&UnitFilter::any())?;
        self.bm25.clear();
        self.bm25.save(&self.data_dir.join(BM25_FILE))?;
        self.symbols.clear()?;
        info!("index cleared");
        Ok(())
    }

    /// Flush everything and release resources.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] if the final flush fails.
    pub fn close(&mut self) -> Result<()> {
        self.bm25.save(&self.data_dir.join(BM25_FILE))?;
        self.store.close()
    }
}

/// Identifier subwords for lexical indexing: `authenticate_user` and
/// `UserSession` both become searchable by their word parts.
fn name_subwords(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    for piece in name.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut current = String::new();
        for ch in piece.chars() {
            if ch.is_ascii_uppercase() && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            current.push(ch.to_ascii_lowercase());
        }
        if !current.is_empty() {
            words.push(current);
        }
    }
    words.join(" ")
}

impl std::fmt::Debug for SemanticIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticIndexer")
            .field("project_root", &self.project_root)
            .field("backend", &self.config.backend)
            .field("model", &self.embedder.name())
            .finish_non_exhaustive()
    }
}
