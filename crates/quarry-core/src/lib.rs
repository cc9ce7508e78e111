//! Core types, configuration, and error handling for the quarry engine.
//!
//! This crate provides the shared foundation used by all other quarry crates:
//! - [`QuarryError`] — unified error type using `thiserror`
//! - [`SemanticConfig`] — configuration loaded from `config.yaml`
//! - Shared types: [`CodeUnit`], [`UnitKind`], [`SearchResult`],
//!   [`ScoreType`], [`IndexReport`]
//! - Fingerprint helpers: [`unit_id`], [`content_hash`]

mod config;
mod error;
mod types;

pub use config::{data_dir, SemanticConfig, CONFIG_FILE, DATA_DIR};
pub use error::QuarryError;
pub use types::{
    content_hash, unit_id, CodeUnit, IndexReport, ScoreType, SearchResult, UnitKind,
};

/// A convenience `Result` type for quarry operations.
pub type Result<T> = std::result::Result<T, QuarryError>;
