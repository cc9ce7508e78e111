use std::fmt;
use std::path::Path;

/// Languages recognized by the segmenter.
///
/// Each language carries a stable lowercase tag used in persisted units and
/// search filters. Not every language has a grammar: tags like `markdown` or
/// `dockerfile` are recognized during discovery but yield no code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Go,
    JavaScript,
    TypeScript,
    Rust,
    Dart,
    Java,
    Kotlin,
    /// Alias tag for Kotlin/Java mobile trees; resolvable only by tag, never
    /// from a file extension.
    Android,
    Bash,
    C,
    Cpp,
    CSharp,
    Swift,
    Php,
    Ruby,
    Markdown,
    Sql,
    Dockerfile,
    PowerShell,
}

impl Language {
    /// All recognized languages, in tag resolution order.
    pub const ALL: [Language; 20] = [
        Language::Python,
        Language::Go,
        Language::JavaScript,
        Language::TypeScript,
        Language::Rust,
        Language::Dart,
        Language::Java,
        Language::Kotlin,
        Language::Android,
        Language::Bash,
        Language::C,
        Language::Cpp,
        Language::CSharp,
        Language::Swift,
        Language::Php,
        Language::Ruby,
        Language::Markdown,
        Language::Sql,
        Language::Dockerfile,
        Language::PowerShell,
    ];

    /// Resolve a language from a file path.
    ///
    /// `Dockerfile` is matched by file name; everything else by extension.
    /// `.h` headers resolve to C.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use quarry_segment::Language;
    ///
    /// assert_eq!(Language::from_path(Path::new("src/main.rs")), Some(Language::Rust));
    /// assert_eq!(Language::from_path(Path::new("Dockerfile")), Some(Language::Dockerfile));
    /// assert_eq!(Language::from_path(Path::new("notes.txt")), None);
    /// ```
    pub fn from_path(path: &Path) -> Option<Self> {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name == "Dockerfile" || name.starts_with("Dockerfile.") {
                return Some(Language::Dockerfile);
            }
        }
        let ext = path.extension()?.to_str()?;
        let language = match ext {
            "py" | "pyi" => Language::Python,
            "go" => Language::Go,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" | "mts" => Language::TypeScript,
            "rs" => Language::Rust,
            "dart" => Language::Dart,
            "java" => Language::Java,
            "kt" | "kts" => Language::Kotlin,
            "sh" | "bash" => Language::Bash,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" => Language::Cpp,
            "cs" => Language::CSharp,
            "swift" => Language::Swift,
            "php" => Language::Php,
            "rb" => Language::Ruby,
            "md" | "markdown" => Language::Markdown,
            "sql" => Language::Sql,
            "ps1" | "psm1" => Language::PowerShell,
            _ => return None,
        };
        Some(language)
    }

    /// Resolve a language from its persisted tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.tag() == tag)
    }

    /// The stable lowercase tag stored on units and accepted in filters.
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Go => "golang",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Rust => "rust",
            Language::Dart => "dart",
            Language::Java => "java",
            Language::Kotlin => "kotlin",
            Language::Android => "android",
            Language::Bash => "bash",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Swift => "swift",
            Language::Php => "php",
            Language::Ruby => "ruby",
            Language::Markdown => "markdown",
            Language::Sql => "sql",
            Language::Dockerfile => "dockerfile",
            Language::PowerShell => "powershell",
        }
    }

    /// The tree-sitter grammar for this language, when one exists.
    ///
    /// Android shares the Kotlin grammar. Markdown, SQL, Dockerfile and
    /// PowerShell have none and segment to an empty unit sequence.
    pub fn grammar(&self) -> Option<tree_sitter::Language> {
        let grammar = match self {
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            Language::Dart => tree_sitter_dart_orchard::LANGUAGE.into(),
            Language::Java => tree_sitter_java::LANGUAGE.into(),
            Language::Kotlin | Language::Android => tree_sitter_kotlin_ng::LANGUAGE.into(),
            Language::Bash => tree_sitter_bash::LANGUAGE.into(),
            Language::C => tree_sitter_c::LANGUAGE.into(),
            Language::Cpp => tree_sitter_cpp::LANGUAGE.into(),
            Language::CSharp => tree_sitter_c_sharp::LANGUAGE.into(),
            Language::Swift => tree_sitter_swift::LANGUAGE.into(),
            Language::Php => tree_sitter_php::LANGUAGE_PHP.into(),
            Language::Ruby => tree_sitter_ruby::LANGUAGE.into(),
            Language::Markdown
            | Language::Sql
            | Language::Dockerfile
            | Language::PowerShell => return None,
        };
        Some(grammar)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}
