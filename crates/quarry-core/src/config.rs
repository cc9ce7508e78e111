use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::QuarryError;

/// Directory under the project root that holds all engine state.
pub const DATA_DIR: &str = ".lazygophers/ccplugin/semantic";

/// Name of the config file inside the data directory.
pub const CONFIG_FILE: &str = "config.yaml";

/// Engine configuration loaded from `config.yaml`.
///
/// Unknown keys are ignored; missing keys take defaults. On first load the
/// default file is materialized on disk so users have something to edit.
///
/// # Examples
///
/// ```
/// use quarry_core::SemanticConfig;
///
/// let config = SemanticConfig::default();
/// assert_eq!(config.backend, "sqlite");
/// assert_eq!(config.similarity_threshold, 0.5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConfig {
    /// Vector store identifier (`"sqlite"` or `"textsearch"`).
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Embedding model short name or literal backend id.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Results scoring below this are discarded.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Upper bound on characters per unit before embedding, in rough tokens
    /// (actual character budget is `max_chunk_size * 4`).
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    /// Reserved; AST units do not slide, so overlap is currently advisory.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Optional override of the supported language tags.
    #[serde(default)]
    pub supported_languages: Option<Vec<String>>,
}

fn default_backend() -> String {
    "sqlite".into()
}

fn default_embedding_model() -> String {
    "default".into()
}

fn default_similarity_threshold() -> f64 {
    0.5
}

fn default_max_chunk_size() -> usize {
    1024
}

fn default_chunk_overlap() -> usize {
    100
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            embedding_model: default_embedding_model(),
            similarity_threshold: default_similarity_threshold(),
            max_chunk_size: default_max_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            supported_languages: None,
        }
    }
}

impl SemanticConfig {
    /// Load configuration from a YAML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Io`] if the file cannot be read, or
    /// [`QuarryError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, QuarryError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Yaml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use quarry_core::SemanticConfig;
    ///
    /// let yaml = "backend: textsearch\nsimilarity_threshold: 0.3\n";
    /// let config = SemanticConfig::from_yaml(yaml).unwrap();
    /// assert_eq!(config.backend, "textsearch");
    /// assert_eq!(config.similarity_threshold, 0.3);
    /// ```
    pub fn from_yaml(content: &str) -> Result<Self, QuarryError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Load `config.yaml` from `data_dir`, materializing the default file
    /// when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Io`] on read/write failure or
    /// [`QuarryError::Yaml`] on an invalid existing file.
    pub fn load_or_init(data_dir: &Path) -> Result<Self, QuarryError> {
        let path = data_dir.join(CONFIG_FILE);
        if path.exists() {
            return Self::from_file(&path);
        }
        std::fs::create_dir_all(data_dir)?;
        let config = Self::default();
        let yaml = serde_yaml::to_string(&config)?;
        std::fs::write(&path, yaml)?;
        Ok(config)
    }
}

/// The engine state directory for a project root.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use quarry_core::data_dir;
///
/// let dir = data_dir(Path::new("/repo"));
/// assert!(dir.ends_with(".lazygophers/ccplugin/semantic"));
/// ```
pub fn data_dir(project_root: &Path) -> PathBuf {
    project_root.join(DATA_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = SemanticConfig::default();
        assert_eq!(config.backend, "sqlite");
        assert_eq!(config.embedding_model, "default");
        assert_eq!(config.similarity_threshold, 0.5);
        assert_eq!(config.max_chunk_size, 1024);
        assert_eq!(config.chunk_overlap, 100);
        assert!(config.supported_languages.is_none());
    }

    #[test]
    fn parse_partial_yaml_takes_defaults() {
        let config = SemanticConfig::from_yaml("embedding_model: bge-base-en\n").unwrap();
        assert_eq!(config.embedding_model, "bge-base-en");
        assert_eq!(config.backend, "sqlite");
        assert_eq!(config.max_chunk_size, 1024);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let yaml = "backend: sqlite\nsome_future_knob: 42\n";
        let config = SemanticConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.backend, "sqlite");
    }

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = SemanticConfig::from_yaml("").unwrap();
        assert_eq!(config.backend, "sqlite");
    }

    #[test]
    fn invalid_yaml_returns_error() {
        assert!(SemanticConfig::from_yaml("backend: [unclosed").is_err());
    }

    #[test]
    fn supported_languages_override_parses() {
        let yaml = "supported_languages:\n  - rust\n  - python\n";
        let config = SemanticConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.supported_languages,
            Some(vec!["rust".to_string(), "python".to_string()])
        );
    }

    #[test]
    fn load_or_init_materializes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("semantic");

        let config = SemanticConfig::load_or_init(&data).unwrap();
        assert_eq!(config.backend, "sqlite");
        assert!(data.join(CONFIG_FILE).exists());

        // Second load reads the file instead of rewriting it.
        std::fs::write(data.join(CONFIG_FILE), "backend: textsearch\n").unwrap();
        let reloaded = SemanticConfig::load_or_init(&data).unwrap();
        assert_eq!(reloaded.backend, "textsearch");
    }

    #[test]
    fn data_dir_is_nested_under_root() {
        let dir = data_dir(Path::new("/work/project"));
        assert_eq!(
            dir,
            PathBuf::from("/work/project/.lazygophers/ccplugin/semantic")
        );
    }
}
