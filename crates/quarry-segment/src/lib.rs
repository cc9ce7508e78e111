//! Source discovery and AST segmentation for the quarry engine.
//!
//! [`discover`] walks a project root and returns indexable source files;
//! [`segment_file`] turns one file into typed [`quarry_core::CodeUnit`]s
//! using per-language tree-sitter grammars. [`truncate_code`] caps unit text
//! before embedding.

mod language;
mod segmenter;
mod walker;

pub use language::Language;
pub use segmenter::{segment_file, truncate_code};
pub use walker::{discover, SourceFile};
