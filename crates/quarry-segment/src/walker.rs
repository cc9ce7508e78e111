use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::debug;

use quarry_core::Result;

use crate::language::Language;

/// Directories never descended into, on top of hidden (dot-prefixed) ones.
const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "dist",
    "build",
    "target",
];

/// Files above this size are skipped; generated bundles and data dumps
/// dominate past it.
const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// A discovered source file, read into memory.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the project root, with `/` separators.
    pub relative_path: String,
    /// Absolute path on disk.
    pub path: PathBuf,
    pub language: Language,
    pub content: String,
}

/// Walk `root` and collect indexable source files in a stable order.
///
/// Hidden directories and [`SKIP_DIRS`] are pruned. Files with no recognized
/// language, files over 1 MiB, and files that fail UTF-8 or contain NUL bytes
/// are skipped. When `allowed` is non-empty, only those languages are kept.
///
/// # Errors
///
/// Returns [`quarry_core::QuarryError::Io`] only for a failure reading an
/// accepted file; unreadable directory entries are logged and skipped.
pub fn discover(root: &Path, allowed: &[Language]) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(true)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.file_type().is_some_and(|t| t.is_dir()) && SKIP_DIRS.contains(&name.as_ref()))
        })
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let Some(language) = Language::from_path(path) else {
            continue;
        };
        if !allowed.is_empty() && !allowed.contains(&language) {
            continue;
        }
        if entry.metadata().map(|m| m.len()).unwrap_or(0) > MAX_FILE_SIZE {
            debug!(path = %path.display(), "skipping oversized file");
            continue;
        }
        let Ok(content) = std::fs::read_to_string(path) else {
            debug!(path = %path.display(), "skipping non-UTF-8 file");
            continue;
        };
        if content.contains('\0') {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        let relative_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(SourceFile {
            relative_path,
            path: path.to_path_buf(),
            language,
            content,
        });
    }

    // The walk order is platform dependent; sort so indexing is deterministic.
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn discovers_recognized_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/lib.rs", "pub fn a() {}");
        write(dir.path(), "app.py", "def f():\n    pass\n");
        write(dir.path(), "README.txt", "not code");

        let files = discover(dir.path(), &[]).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["app.py", "src/lib.rs"]);
        assert_eq!(files[0].language, Language::Python);
        assert_eq!(files[1].language, Language::Rust);
    }

    #[test]
    fn skips_vendored_and_hidden_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "node_modules/pkg/index.js", "x");
        write(dir.path(), "target/debug/gen.rs", "x");
        write(dir.path(), ".git/hooks/sample.py", "x");
        write(dir.path(), "__pycache__/mod.py", "x");
        write(dir.path(), "keep.go", "package main");

        let files = discover(dir.path(), &[]).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["keep.go"]);
    }

    #[test]
    fn language_filter_applies() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.rs", "fn a() {}");
        write(dir.path(), "b.py", "def b(): pass");

        let files = discover(dir.path(), &[Language::Python]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "b.py");
    }

    #[test]
    fn skips_binary_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bin.py"), b"def f():\0 pass").unwrap();
        write(dir.path(), "ok.py", "def g(): pass");

        let files = discover(dir.path(), &[]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "ok.py");
    }

    #[test]
    fn skips_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "big.py", &"# pad\n".repeat(200_000));
        write(dir.path(), "small.py", "def h(): pass");

        let files = discover(dir.path(), &[]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "small.py");
    }
}
