use std::path::PathBuf;

/// Errors that can occur across the quarry engine.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; per-file indexing failures are logged and counted rather than
/// propagated, so most callers only ever see the store-level and
/// configuration variants.
///
/// # Examples
///
/// ```
/// use quarry_core::QuarryError;
///
/// let err = QuarryError::Config("unknown backend 'faiss'".into());
/// assert!(err.to_string().contains("faiss"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum QuarryError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Source code parsing failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Embedding backend failure (load, encode, or transport).
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Vector store, lexical index, or symbol database failure.
    #[error("store error: {0}")]
    Store(String),

    /// Stored vector dimension does not match the active backend.
    ///
    /// Fatal for indexing and vector queries; the index must be rebuilt.
    #[error("dimension mismatch: index stores {stored}-dim vectors but backend produces {actual}-dim")]
    DimensionMismatch {
        /// Dimension recorded when the index was created.
        stored: usize,
        /// Dimension reported by the current embedding backend.
        actual: usize,
    },

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML deserialization failure.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}
