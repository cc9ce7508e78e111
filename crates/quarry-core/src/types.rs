use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Closed set of labels for an indexed code unit.
///
/// # Examples
///
/// ```
/// use quarry_core::UnitKind;
///
/// let kind: UnitKind = "type_alias".parse().unwrap();
/// assert_eq!(kind, UnitKind::TypeAlias);
/// assert_eq!(kind.to_string(), "type_alias");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Function,
    Method,
    Class,
    Struct,
    Interface,
    Trait,
    Enum,
    Impl,
    Mixin,
    Extension,
    TypeAlias,
    Module,
    Field,
    ArrowFunction,
    Widget,
    DataClass,
    Variable,
    Constant,
    Import,
    Other,
}

impl UnitKind {
    /// The wire/database string for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::Function => "function",
            UnitKind::Method => "method",
            UnitKind::Class => "class",
            UnitKind::Struct => "struct",
            UnitKind::Interface => "interface",
            UnitKind::Trait => "trait",
            UnitKind::Enum => "enum",
            UnitKind::Impl => "impl",
            UnitKind::Mixin => "mixin",
            UnitKind::Extension => "extension",
            UnitKind::TypeAlias => "type_alias",
            UnitKind::Module => "module",
            UnitKind::Field => "field",
            UnitKind::ArrowFunction => "arrow_function",
            UnitKind::Widget => "widget",
            UnitKind::DataClass => "data_class",
            UnitKind::Variable => "variable",
            UnitKind::Constant => "constant",
            UnitKind::Import => "import",
            UnitKind::Other => "other",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(UnitKind::Function),
            "method" => Ok(UnitKind::Method),
            "class" => Ok(UnitKind::Class),
            "struct" => Ok(UnitKind::Struct),
            "interface" => Ok(UnitKind::Interface),
            "trait" => Ok(UnitKind::Trait),
            "enum" => Ok(UnitKind::Enum),
            "impl" => Ok(UnitKind::Impl),
            "mixin" => Ok(UnitKind::Mixin),
            "extension" => Ok(UnitKind::Extension),
            "type_alias" => Ok(UnitKind::TypeAlias),
            "module" => Ok(UnitKind::Module),
            "field" => Ok(UnitKind::Field),
            "arrow_function" => Ok(UnitKind::ArrowFunction),
            "widget" => Ok(UnitKind::Widget),
            "data_class" => Ok(UnitKind::DataClass),
            "variable" => Ok(UnitKind::Variable),
            "constant" => Ok(UnitKind::Constant),
            "import" => Ok(UnitKind::Import),
            "other" => Ok(UnitKind::Other),
            other => Err(format!("unknown unit kind: {other}")),
        }
    }
}

/// One indexed atom: an AST definition extracted from a source file.
///
/// The `id` is a stable fingerprint of `(relative_path, start_line, kind)`,
/// so a unit that stays at the same location keeps its id across reindexing.
///
/// # Examples
///
/// ```
/// use quarry_core::{CodeUnit, UnitKind};
///
/// let unit = CodeUnit::new(
///     "src/auth.py",
///     "python",
///     UnitKind::Function,
///     "authenticate_user",
///     "def authenticate_user(): ...",
///     1,
///     1,
/// );
/// assert_eq!(unit.id.len(), 16);
/// assert_eq!(unit.kind, UnitKind::Function);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeUnit {
    /// 16-hex-char fingerprint of `(relative_path, start_line, kind)`.
    pub id: String,
    /// Path relative to the project root, `/`-separated.
    pub relative_path: String,
    /// Language tag (e.g. `"python"`, `"golang"`).
    pub language: String,
    /// Kind of definition.
    pub kind: UnitKind,
    /// Identifier; empty for anonymous units.
    pub name: String,
    /// Literal source slice.
    pub code: String,
    /// First line, 1-based inclusive.
    pub start_line: u32,
    /// Last line, 1-based inclusive.
    pub end_line: u32,
    /// Language-specific extras (receiver, is_pub, decorators, ...).
    ///
    /// A `BTreeMap` keeps serialization deterministic.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CodeUnit {
    /// Build a unit, deriving its id from location and kind.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        relative_path: &str,
        language: &str,
        kind: UnitKind,
        name: &str,
        code: &str,
        start_line: u32,
        end_line: u32,
    ) -> Self {
        Self {
            id: unit_id(relative_path, start_line, kind),
            relative_path: relative_path.to_string(),
            language: language.to_string(),
            kind,
            name: name.to_string(),
            code: code.to_string(),
            start_line,
            end_line,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry, consuming and returning the unit.
    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Derive the stable 16-hex-char unit id.
///
/// The fingerprint is the first 16 hex characters of
/// `md5("{relative_path}:{start_line}:{kind}")`.
///
/// # Examples
///
/// ```
/// use quarry_core::{unit_id, UnitKind};
///
/// let a = unit_id("src/auth.py", 1, UnitKind::Function);
/// let b = unit_id("src/auth.py", 1, UnitKind::Function);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 16);
/// ```
pub fn unit_id(relative_path: &str, start_line: u32, kind: UnitKind) -> String {
    let mut hasher = Md5::new();
    hasher.update(format!("{relative_path}:{start_line}:{kind}").as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// MD5 hex digest of a file's bytes, used only for change detection.
///
/// # Examples
///
/// ```
/// use quarry_core::content_hash;
///
/// let h = content_hash(b"fn main() {}");
/// assert_eq!(h.len(), 32);
/// assert_eq!(h, content_hash(b"fn main() {}"));
/// ```
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// How a search result's `score` was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    /// Pure dense-vector cosine similarity.
    VectorSimilarity,
    /// Fused dense + lexical score.
    Hybrid,
}

impl fmt::Display for ScoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreType::VectorSimilarity => write!(f, "vector_similarity"),
            ScoreType::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// A ranked result returned by the query surface.
///
/// Hybrid results carry per-source sub-scores alongside the fused `score`.
///
/// # Examples
///
/// ```
/// use quarry_core::{CodeUnit, ScoreType, SearchResult, UnitKind};
///
/// let unit = CodeUnit::new("db.rs", "rust", UnitKind::Function, "connect", "fn connect() {}", 1, 3);
/// let result = SearchResult::from_unit(unit, 0.92, ScoreType::VectorSimilarity);
/// assert!(result.score > 0.9);
/// assert!(result.keyword_score.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub relative_path: String,
    pub language: String,
    pub kind: UnitKind,
    pub name: String,
    pub code: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Final (possibly fused) relevance score.
    pub score: f64,
    pub score_type: ScoreType,
    /// Dense contribution, present for hybrid results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f64>,
    /// Lexical contribution, present for hybrid results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl SearchResult {
    /// Wrap a unit with a score and no per-source breakdown.
    pub fn from_unit(unit: CodeUnit, score: f64, score_type: ScoreType) -> Self {
        Self {
            id: unit.id,
            relative_path: unit.relative_path,
            language: unit.language,
            kind: unit.kind,
            name: unit.name,
            code: unit.code,
            start_line: unit.start_line,
            end_line: unit.end_line,
            score,
            score_type,
            vector_score: None,
            keyword_score: None,
            metadata: unit.metadata,
        }
    }
}

/// Counters reported after every indexing run.
///
/// # Examples
///
/// ```
/// use quarry_core::IndexReport;
///
/// let report = IndexReport::default();
/// assert_eq!(report.files_indexed, 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Files discovered under the project root.
    pub files_total: usize,
    /// Files segmented, embedded, and written this run.
    pub files_indexed: usize,
    /// Files skipped because their content hash was unchanged.
    pub files_skipped: usize,
    /// Units written across all indexed files.
    pub units_indexed: usize,
    /// Per-file failures that were logged and skipped.
    pub errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_id_is_stable_and_location_sensitive() {
        let a = unit_id("src/auth.py", 10, UnitKind::Function);
        let b = unit_id("src/auth.py", 10, UnitKind::Function);
        let c = unit_id("src/auth.py", 11, UnitKind::Function);
        let d = unit_id("src/auth.py", 10, UnitKind::Class);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn content_hash_is_md5_hex() {
        // Well-known MD5 test vector.
        assert_eq!(content_hash(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            content_hash(b"abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn unit_kind_roundtrips() {
        for kind in [
            UnitKind::Function,
            UnitKind::ArrowFunction,
            UnitKind::TypeAlias,
            UnitKind::DataClass,
            UnitKind::Widget,
            UnitKind::Other,
        ] {
            let s = kind.to_string();
            assert_eq!(s.parse::<UnitKind>().unwrap(), kind);
        }
        assert!("lambda".parse::<UnitKind>().is_err());
    }

    #[test]
    fn unit_kind_serializes_snake_case() {
        let json = serde_json::to_string(&UnitKind::TypeAlias).unwrap();
        assert_eq!(json, "\"type_alias\"");
        let parsed: UnitKind = serde_json::from_str("\"arrow_function\"").unwrap();
        assert_eq!(parsed, UnitKind::ArrowFunction);
    }

    #[test]
    fn code_unit_new_derives_id() {
        let unit = CodeUnit::new(
            "src/main.rs",
            "rust",
            UnitKind::Function,
            "main",
            "fn main() {}",
            1,
            1,
        );
        assert_eq!(unit.id, unit_id("src/main.rs", 1, UnitKind::Function));
    }

    #[test]
    fn with_metadata_chains() {
        let unit = CodeUnit::new("a.go", "golang", UnitKind::Method, "Save", "func", 5, 9)
            .with_metadata("receiver", "(u *User)");
        assert_eq!(unit.metadata.get("receiver").unwrap(), "(u *User)");
    }

    #[test]
    fn search_result_omits_absent_subscores() {
        let unit = CodeUnit::new("a.rs", "rust", UnitKind::Function, "f", "fn f() {}", 1, 1);
        let result = SearchResult::from_unit(unit, 0.5, ScoreType::VectorSimilarity);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("vector_score").is_none());
        assert_eq!(json["score_type"], "vector_similarity");
    }
}
