//! Query analysis: normalization, intent detection, expansion, and rewrite.

use serde::Serialize;

use quarry_lexical::tokenize;

/// What the user appears to be looking for, keyword-triggered with
/// first-match-wins precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    FindDefinition,
    FindUsage,
    FindImplementation,
    FindSimilar,
    GeneralSearch,
}

impl QueryIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryIntent::FindDefinition => "find_definition",
            QueryIntent::FindUsage => "find_usage",
            QueryIntent::FindImplementation => "find_implementation",
            QueryIntent::FindSimilar => "find_similar",
            QueryIntent::GeneralSearch => "general_search",
        }
    }
}

impl std::fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured artifact produced by [`QueryAnalyzer::analyze`].
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnalysis {
    pub original: String,
    pub normalized: String,
    pub intent: QueryIntent,
    /// Coarse symbol kind the query names, when one is recognizable.
    pub symbol_kind: Option<String>,
    pub keywords: Vec<String>,
    /// Variants to search with; the original query always comes first.
    pub expanded: Vec<String>,
    /// The string dispatched to the lexical retriever.
    pub rewritten: String,
}

/// Short forms expanded into full words during query expansion.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("fn", "function"),
    ("func", "function"),
    ("def", "definition"),
    ("impl", "implementation"),
    ("decl", "declaration"),
    ("ref", "reference"),
    ("param", "parameter"),
    ("arg", "argument"),
    ("ret", "return"),
    ("err", "error"),
    ("exc", "exception"),
    ("init", "initialize"),
    ("del", "delete"),
    ("prop", "property"),
    ("attr", "attribute"),
];

const SYNONYMS: &[(&str, &[&str])] = &[
    ("func", &["function", "method", "def"]),
    ("function", &["func", "method", "def"]),
    ("class", &["struct", "type", "class"]),
    ("method", &["function", "func", "procedure"]),
    ("var", &["variable", "var", "name"]),
    ("const", &["constant", "const", "literal"]),
    ("import", &["include", "import", "require"]),
    ("export", &["export", "public", "expose"]),
    ("async", &["asynchronous", "promise", "callback"]),
    ("error", &["exception", "error", "fail"]),
    ("result", &["return", "output", "result"]),
];

/// `long form -> short form`; the rewrite step replaces shorts with longs so
/// the lexical retriever sees the spelled-out terms.
const CODE_KEYWORDS: &[(&str, &str)] = &[
    ("algorithm", "algo"),
    ("authentication", "auth"),
    ("authorization", "authz"),
    ("configuration", "config"),
    ("database", "db"),
    ("dependency", "dep"),
    ("documentation", "doc"),
    ("exception", "error"),
    ("generate", "gen"),
    ("implementation", "impl"),
    ("initialize", "init"),
    ("interface", "iface"),
    ("parameter", "param"),
    ("performance", "perf"),
    ("reference", "ref"),
    ("security", "sec"),
    ("structure", "struct"),
    ("template", "tmpl"),
    ("transaction", "tx"),
    ("utility", "util"),
    ("validation", "validate"),
];

const LANGUAGE_KEYWORDS: &[(&str, &[&str])] = &[
    ("python", &["def", "class", "async", "await", "lambda"]),
    ("javascript", &["function", "class", "async", "await", "const"]),
    ("typescript", &["function", "class", "async", "await", "interface"]),
    ("golang", &["func", "type", "interface", "struct", "defer"]),
    ("rust", &["fn", "struct", "enum", "trait", "impl"]),
    ("java", &["class", "interface", "method", "final", "static"]),
];

/// Stateless query analyzer.
///
/// # Examples
///
/// ```
/// use quarry_search::{QueryAnalyzer, QueryIntent};
///
/// let analyzer = QueryAnalyzer::new();
/// let analysis = analyzer.analyze("find the definition of parse_config", None);
/// assert_eq!(analysis.intent, QueryIntent::FindDefinition);
/// assert_eq!(analysis.expanded[0], "find the definition of parse_config");
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryAnalyzer;

impl QueryAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Lowercase, collapse whitespace, and strip everything that is not
    /// alphanumeric, whitespace, or underscore.
    ///
    /// # Examples
    ///
    /// ```
    /// use quarry_search::QueryAnalyzer;
    ///
    /// let analyzer = QueryAnalyzer::new();
    /// assert_eq!(analyzer.normalize("  Parse   JSON!? "), "parse json");
    /// ```
    pub fn normalize(&self, query: &str) -> String {
        let lowered = query.to_lowercase();
        let stripped: String = lowered
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
            .collect();
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Classify what the query is after, first match wins.
    pub fn detect_intent(&self, query: &str) -> QueryIntent {
        let lowered = query.to_lowercase();
        let contains_any = |words: &[&str]| words.iter().any(|w| lowered.contains(w));

        if contains_any(&["define", "definition", "def", "declare"]) {
            QueryIntent::FindDefinition
        } else if contains_any(&["usage", "use", "call", "reference"]) {
            QueryIntent::FindUsage
        } else if contains_any(&["implement", "implementation", "impl", "code"]) {
            QueryIntent::FindImplementation
        } else if contains_any(&["similar", "like", "example", "sample"]) {
            QueryIntent::FindSimilar
        } else {
            QueryIntent::GeneralSearch
        }
    }

    /// Coarse symbol kind named by the query surface, if any.
    pub fn detect_symbol_kind(&self, query: &str) -> Option<&'static str> {
        let lowered = query.to_lowercase();
        let contains_any = |words: &[&str]| words.iter().any(|w| lowered.contains(w));

        if contains_any(&["function", "func", "fn", "method"]) {
            Some("function")
        } else if contains_any(&["class", "struct", "type"]) {
            Some("class")
        } else if contains_any(&["interface", "protocol", "trait"]) {
            Some("interface")
        } else if contains_any(&["variable", "var", "const", "constant"]) {
            Some("variable")
        } else if contains_any(&["enum", "enumeration"]) {
            Some("enum")
        } else {
            None
        }
    }

    /// Expansion variants: the original query first, then abbreviation
    /// expansions, synonym swaps, and language keyword injections, deduped
    /// in that order.
    pub fn expand(&self, query: &str, language: Option<&str>) -> Vec<String> {
        let lowered = query.to_lowercase();
        let mut expanded: Vec<String> = vec![query.to_string()];
        let mut push = |variant: String, expanded: &mut Vec<String>| {
            if !expanded.contains(&variant) {
                expanded.push(variant);
            }
        };

        for (abbrev, full) in ABBREVIATIONS {
            if lowered.contains(abbrev) {
                push(lowered.replace(abbrev, full), &mut expanded);
            }
        }

        for word in lowered.split_whitespace() {
            if let Some((_, synonyms)) = SYNONYMS.iter().find(|(key, _)| key == &word) {
                for synonym in *synonyms {
                    push(lowered.replace(word, synonym), &mut expanded);
                }
            }
        }

        if let Some(language) = language {
            if let Some((_, keywords)) = LANGUAGE_KEYWORDS
                .iter()
                .find(|(tag, _)| *tag == language.to_lowercase())
            {
                for keyword in *keywords {
                    push(format!("{lowered} {keyword}"), &mut expanded);
                }
            }
        }

        expanded
    }

    /// Content-bearing tokens of the query (lowercased, stopwords and short
    /// tokens removed).
    pub fn keywords(&self, query: &str) -> Vec<String> {
        tokenize(query)
    }

    /// The normalized query with the language hint appended and short-form
    /// code terms spelled out for the lexical retriever.
    ///
    /// # Examples
    ///
    /// ```
    /// use quarry_search::QueryAnalyzer;
    ///
    /// let analyzer = QueryAnalyzer::new();
    /// assert_eq!(analyzer.rewrite("db tx handling", None), "database transaction handling");
    /// ```
    pub fn rewrite(&self, query: &str, language: Option<&str>) -> String {
        let mut rewritten = self.normalize(query);

        if let Some(language) = language {
            let tag = language.to_lowercase();
            if LANGUAGE_KEYWORDS.iter().any(|(known, _)| *known == tag) {
                rewritten = format!("{rewritten} {tag}");
            }
        }

        for (long_form, short_form) in CODE_KEYWORDS {
            if rewritten.contains(short_form) {
                rewritten = rewritten.replace(short_form, long_form);
            }
        }

        rewritten
    }

    /// Full analysis of one query.
    pub fn analyze(&self, query: &str, language: Option<&str>) -> QueryAnalysis {
        QueryAnalysis {
            original: query.to_string(),
            normalized: self.normalize(query),
            intent: self.detect_intent(query),
            symbol_kind: self.detect_symbol_kind(query).map(str::to_string),
            keywords: self.keywords(query),
            expanded: self.expand(query, language),
            rewritten: self.rewrite(query, language),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_punctuation_and_case() {
        let analyzer = QueryAnalyzer::new();
        assert_eq!(
            analyzer.normalize("How do I  parse_config()?!"),
            "how do i parse_config"
        );
        assert_eq!(analyzer.normalize("   "), "");
    }

    #[test]
    fn intent_precedence_is_first_match() {
        let analyzer = QueryAnalyzer::new();
        assert_eq!(
            analyzer.detect_intent("where is the definition of connect"),
            QueryIntent::FindDefinition
        );
        assert_eq!(
            analyzer.detect_intent("usage of connect"),
            QueryIntent::FindUsage
        );
        assert_eq!(
            analyzer.detect_intent("how is caching implemented"),
            QueryIntent::FindImplementation
        );
        assert_eq!(
            analyzer.detect_intent("similar to retry loop"),
            QueryIntent::FindSimilar
        );
        assert_eq!(
            analyzer.detect_intent("retry loop"),
            QueryIntent::GeneralSearch
        );
        // "definition" wins over "usage" because definition is checked first.
        assert_eq!(
            analyzer.detect_intent("definition and usage"),
            QueryIntent::FindDefinition
        );
    }

    #[test]
    fn symbol_kind_detection() {
        let analyzer = QueryAnalyzer::new();
        assert_eq!(analyzer.detect_symbol_kind("the save method"), Some("function"));
        assert_eq!(analyzer.detect_symbol_kind("user struct"), Some("class"));
        assert_eq!(analyzer.detect_symbol_kind("reader trait"), Some("interface"));
        assert_eq!(analyzer.detect_symbol_kind("color enum"), Some("enum"));
        assert_eq!(analyzer.detect_symbol_kind("retry backoff"), None);
    }

    #[test]
    fn expansion_contains_original_first() {
        let analyzer = QueryAnalyzer::new();
        let expanded = analyzer.expand("fn to parse json", None);
        assert_eq!(expanded[0], "fn to parse json");
        assert!(expanded.contains(&"function to parse json".to_string()));
        // No duplicates.
        let unique: std::collections::HashSet<&String> = expanded.iter().collect();
        assert_eq!(unique.len(), expanded.len());
    }

    #[test]
    fn expansion_swaps_synonyms() {
        let analyzer = QueryAnalyzer::new();
        let expanded = analyzer.expand("error in the parser", None);
        assert!(expanded.contains(&"exception in the parser".to_string()));
        assert!(expanded.contains(&"fail in the parser".to_string()));
    }

    #[test]
    fn expansion_injects_language_keywords() {
        let analyzer = QueryAnalyzer::new();
        let expanded = analyzer.expand("http router", Some("golang"));
        assert!(expanded.contains(&"http router func".to_string()));
        assert!(expanded.contains(&"http router struct".to_string()));
        // Unknown hints inject nothing.
        assert_eq!(analyzer.expand("http router", Some("cobol")).len(), 1);
    }

    #[test]
    fn rewrite_spells_out_short_forms() {
        let analyzer = QueryAnalyzer::new();
        assert_eq!(
            analyzer.rewrite("db config", None),
            "database configuration"
        );
        assert_eq!(
            analyzer.rewrite("auth flow", Some("python")),
            "authentication flow python"
        );
    }

    #[test]
    fn keywords_drop_stopwords_and_short_tokens() {
        let analyzer = QueryAnalyzer::new();
        let keywords = analyzer.keywords("the quick fix for a DB bug");
        assert!(!keywords.contains(&"the".to_string()));
        assert!(!keywords.contains(&"db".to_string()));
        assert!(keywords.contains(&"quick".to_string()));
        assert!(keywords.contains(&"bug".to_string()));
    }

    #[test]
    fn analysis_keywords_come_from_original_tokens() {
        let analyzer = QueryAnalyzer::new();
        let analysis = analyzer.analyze("Find usages of parse_config", None);
        let original_tokens = quarry_lexical::tokenize(&analysis.original);
        for keyword in &analysis.keywords {
            assert!(original_tokens.contains(keyword));
        }
        assert_eq!(analysis.expanded[0], analysis.original);
    }
}
