//! End-to-end tests over a real on-disk project tree, with a deterministic
//! in-process embedding backend so no network is involved.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use quarry_core::{QuarryError, Result, ScoreType, SemanticConfig};
use quarry_embed::EmbeddingBackend;
use quarry_indexer::{SearchMode, SearchOptions, SemanticIndexer};

/// Bag-of-words hashing embedder: each token bumps one of `dim` buckets,
/// then the vector is L2-normalized. Deterministic across instances, and
/// the bucket space is wide enough that the fixture vocabularies below
/// never collide, so texts score by exact word overlap.
struct BagEmbedding {
    dim: usize,
}

impl BagEmbedding {
    fn new() -> Self {
        Self { dim: 256 }
    }
}

fn bag_vector(text: &str, dim: usize) -> Vec<f32> {
    let mut v = vec![0f32; dim];
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
    {
        if token.is_empty() {
            continue;
        }
        // FNV-1a.
        let mut h: u32 = 0x811c_9dc5;
        for b in token.bytes() {
            h ^= u32::from(b);
            h = h.wrapping_mul(0x0100_0193);
        }
        v[(h % dim as u32) as usize] += 1.0;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

impl EmbeddingBackend for BagEmbedding {
    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| bag_vector(t, self.dim)).collect())
    }

    fn encode_query(&self, query: &str) -> Result<Vec<f32>> {
        Ok(bag_vector(query, self.dim))
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &str {
        "bag-of-words"
    }
}

/// Wraps [`BagEmbedding`] with a switch that makes `encode` fail, for
/// exercising the engine's behavior under a flaky embedding endpoint.
struct FlakyEmbedding {
    inner: BagEmbedding,
    fail: Arc<AtomicBool>,
}

impl EmbeddingBackend for FlakyEmbedding {
    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(QuarryError::Embedding("endpoint unavailable".into()));
        }
        self.inner.encode(texts)
    }

    fn encode_query(&self, query: &str) -> Result<Vec<f32>> {
        self.inner.encode_query(query)
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn name(&self) -> &str {
        "flaky-bag-of-words"
    }
}

fn write_project(root: &Path) {
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(
        root.join("src/auth.py"),
        "def authenticate_user(username, password):\n    return verify_password(username, password)\n",
    )
    .unwrap();
    std::fs::write(
        root.join("src/db.py"),
        "def open_connection(dsn):\n    return Driver.connect(dsn)\n",
    )
    .unwrap();
}

fn open_indexer(root: &Path) -> SemanticIndexer {
    let config = SemanticConfig {
        similarity_threshold: 0.1,
        ..SemanticConfig::default()
    };
    SemanticIndexer::with_backend(root, config, Box::new(BagEmbedding::new())).unwrap()
}

fn vector_options(threshold: f64) -> SearchOptions {
    SearchOptions {
        mode: SearchMode::Vector,
        threshold: Some(threshold),
        ..SearchOptions::default()
    }
}

#[test]
fn index_then_vector_search_finds_relevant_unit() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let mut indexer = open_indexer(dir.path());

    let report = indexer.index_project().unwrap();
    assert_eq!(report.files_total, 2);
    assert_eq!(report.files_indexed, 2);
    assert_eq!(report.files_skipped, 0);
    assert!(report.units_indexed >= 2);
    assert_eq!(report.errors, 0);

    let results = indexer
        .search("authenticate user password", &vector_options(0.2))
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].name, "authenticate_user");
    assert_eq!(results[0].relative_path, "src/auth.py");
    assert_eq!(results[0].score_type, ScoreType::VectorSimilarity);
    assert!(results[0].score >= 0.2);
}

#[test]
fn reindex_skips_unchanged_and_picks_up_edits() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let mut indexer = open_indexer(dir.path());
    indexer.index_project().unwrap();

    let second = indexer.index_project().unwrap();
    assert_eq!(second.files_indexed, 0);
    assert_eq!(second.files_skipped, 2);

    std::fs::write(
        dir.path().join("src/auth.py"),
        "def check_credentials(token):\n    return decode(token)\n",
    )
    .unwrap();
    let third = indexer.index_project().unwrap();
    assert_eq!(third.files_indexed, 1);
    assert_eq!(third.files_skipped, 1);

    // The old unit is fully replaced.
    assert!(indexer.find_symbol("authenticate_user", 10).unwrap().is_empty());
    assert!(!indexer.find_symbol("check_credentials", 10).unwrap().is_empty());
}

#[test]
fn deleted_files_are_swept_from_all_layers() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let mut indexer = open_indexer(dir.path());
    indexer.index_project().unwrap();
    let before = indexer.stats().unwrap();

    std::fs::remove_file(dir.path().join("src/db.py")).unwrap();
    indexer.index_project().unwrap();

    let after = indexer.stats().unwrap();
    assert!(after.units < before.units);
    assert_eq!(after.symbols.indexed_files, 1);
    assert!(indexer.find_symbol("open_connection", 10).unwrap().is_empty());
    let results = indexer
        .search("open connection dsn", &vector_options(0.0))
        .unwrap();
    assert!(results.iter().all(|r| r.relative_path != "src/db.py"));
}

#[test]
fn hybrid_search_hits_exact_identifier() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let mut indexer = open_indexer(dir.path());
    indexer.index_project().unwrap();

    let options = SearchOptions {
        mode: SearchMode::Hybrid,
        ..SearchOptions::default()
    };
    let results = indexer.search("open_connection", &options).unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].name, "open_connection");
    assert_eq!(results[0].score_type, ScoreType::Hybrid);
    assert!(results[0].keyword_score.unwrap() > 0.0);
    assert!(results[0].vector_score.is_some());
}

#[test]
fn hybrid_rrf_ranks_definition_above_related_class() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(
        dir.path().join("src/auth.py"),
        "def authenticate_user(username: str, password: str): ...\nclass UserSession: ...\n",
    )
    .unwrap();
    let mut indexer = open_indexer(dir.path());
    indexer.index_project().unwrap();

    let options = SearchOptions {
        mode: SearchMode::Hybrid,
        limit: 5,
        threshold: Some(0.0),
        language: Some("python".to_string()),
        ..SearchOptions::default()
    };
    let results = indexer.search("authenticate user", &options).unwrap();
    assert!(results.len() >= 2);
    assert_eq!(results[0].name, "authenticate_user");
    assert_eq!(results[0].kind.to_string(), "function");
    assert_eq!(results[0].start_line, 1);
    assert_eq!(results[1].name, "UserSession");
}

#[test]
fn go_method_outranks_its_receiver_type() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(
        dir.path().join("src/store.go"),
        "package store\n\ntype User struct {\n\tName string\n}\n\nfunc (u *User) Save(db *DB) error {\n\treturn db.WriteUser(u)\n}\n",
    )
    .unwrap();
    let mut indexer = open_indexer(dir.path());
    indexer.index_project().unwrap();

    let options = SearchOptions {
        mode: SearchMode::Hybrid,
        ..SearchOptions::default()
    };
    let results = indexer.search("save user to database", &options).unwrap();
    assert!(results.len() >= 2);
    assert_eq!(results[0].name, "Save");
    assert_eq!(results[0].metadata.get("receiver").unwrap(), "(u *User)");
    let struct_pos = results.iter().position(|r| r.name == "User").unwrap();
    assert!(struct_pos >= 1);

    // Name lookup agrees: the exact-named method comes back with the
    // receiver in its signature.
    let rows = indexer.find_symbol("Save", 10).unwrap();
    assert_eq!(rows[0].name, "Save");
    assert_eq!(rows[0].kind, "method");
    assert!(rows[0].signature.contains("(u *User)"));
}

#[test]
fn embedding_failure_leaves_previous_units_intact() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let fail = Arc::new(AtomicBool::new(false));
    let backend = Box::new(FlakyEmbedding {
        inner: BagEmbedding::new(),
        fail: fail.clone(),
    });
    let config = SemanticConfig {
        similarity_threshold: 0.1,
        ..SemanticConfig::default()
    };
    let mut indexer = SemanticIndexer::with_backend(dir.path(), config, backend).unwrap();
    indexer.index_project().unwrap();
    let before = indexer.stats().unwrap();

    std::fs::write(
        dir.path().join("src/auth.py"),
        "def check_credentials(token):\n    return decode(token)\n",
    )
    .unwrap();
    fail.store(true, Ordering::Relaxed);
    let report = indexer.index_project().unwrap();
    assert_eq!(report.errors, 1);
    assert_eq!(report.files_indexed, 0);

    // The failed file's old units survive in every layer, so the stores
    // stay in agreement.
    let after = indexer.stats().unwrap();
    assert_eq!(after.units, before.units);
    assert_eq!(after.lexical.total_docs, before.lexical.total_docs);
    assert_eq!(after.symbols.total_symbols, before.symbols.total_symbols);
    assert!(!indexer.find_symbol("authenticate_user", 10).unwrap().is_empty());
    let results = indexer
        .search("authenticate user password", &vector_options(0.2))
        .unwrap();
    assert_eq!(results[0].name, "authenticate_user");

    // The next healthy run swaps in the new content.
    fail.store(false, Ordering::Relaxed);
    let report = indexer.index_project().unwrap();
    assert_eq!(report.files_indexed, 1);
    assert!(indexer.find_symbol("authenticate_user", 10).unwrap().is_empty());
    assert!(!indexer.find_symbol("check_credentials", 10).unwrap().is_empty());
}

#[test]
fn empty_or_garbage_query_returns_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let mut indexer = open_indexer(dir.path());
    indexer.index_project().unwrap();

    assert!(indexer.search("", &SearchOptions::default()).unwrap().is_empty());
    assert!(indexer
        .search("   !!?? ", &SearchOptions::default())
        .unwrap()
        .is_empty());
}

#[test]
fn language_filter_restricts_results() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let mut indexer = open_indexer(dir.path());
    indexer.index_project().unwrap();

    let mut options = vector_options(0.0);
    options.language = Some("python".to_string());
    assert!(!indexer
        .search("authenticate user password", &options)
        .unwrap()
        .is_empty());

    options.language = Some("rust".to_string());
    assert!(indexer
        .search("authenticate user password", &options)
        .unwrap()
        .is_empty());
}

#[test]
fn threshold_above_similarity_scale_filters_everything() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let mut indexer = open_indexer(dir.path());
    indexer.index_project().unwrap();

    let results = indexer
        .search("authenticate user password", &vector_options(1.1))
        .unwrap();
    assert!(results.is_empty());
}

#[test]
fn cancellation_stops_at_file_boundary() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let mut indexer = open_indexer(dir.path());

    let cancel = AtomicBool::new(true);
    let report = indexer.index_project_with_cancel(&cancel).unwrap();
    assert_eq!(report.files_total, 2);
    assert_eq!(report.files_indexed, 0);

    // A later uncancelled run indexes everything.
    let report = indexer.index_project().unwrap();
    assert_eq!(report.files_indexed, 2);
}

#[test]
fn expansion_search_still_finds_the_unit() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let mut indexer = open_indexer(dir.path());
    indexer.index_project().unwrap();

    let results = indexer
        .search_with_expansion("authenticate user password", &vector_options(0.2))
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].name, "authenticate_user");
}

#[test]
fn clear_empties_every_layer() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let mut indexer = open_indexer(dir.path());
    indexer.index_project().unwrap();
    assert!(indexer.stats().unwrap().units > 0);

    indexer.clear().unwrap();
    let stats = indexer.stats().unwrap();
    assert_eq!(stats.units, 0);
    assert_eq!(stats.lexical.total_docs, 0);
    assert_eq!(stats.symbols.total_symbols, 0);
    assert!(indexer
        .search("authenticate user password", &vector_options(0.0))
        .unwrap()
        .is_empty());
}

#[test]
fn state_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    {
        let mut indexer = open_indexer(dir.path());
        indexer.index_project().unwrap();
        indexer.close().unwrap();
    }

    let indexer = open_indexer(dir.path());
    assert!(indexer.stats().unwrap().units > 0);
    let results = indexer
        .search("authenticate user password", &vector_options(0.2))
        .unwrap();
    assert_eq!(results[0].name, "authenticate_user");
}
