/// Short model names accepted in `config.yaml`, mapped to full model ids.
///
/// Unknown names pass through unchanged so a full id can be used directly.
///
/// # Examples
///
/// ```
/// use quarry_embed::resolve_model;
///
/// assert_eq!(resolve_model("bge-small-en"), "BAAI/bge-small-en-v1.5");
/// assert_eq!(resolve_model("default"), "BAAI/bge-small-en-v1.5");
/// assert_eq!(resolve_model("my-org/my-model"), "my-org/my-model");
/// ```
pub fn resolve_model(name: &str) -> &str {
    match name {
        // BGE family
        "bge-small-en" => "BAAI/bge-small-en-v1.5",
        "bge-small-zh" => "BAAI/bge-small-zh-v1.5",
        "bge-base-en" => "BAAI/bge-base-en-v1.5",
        "bge-large-en" => "BAAI/bge-large-en-v1.5",
        // Jina family
        "jina-small-en" => "jinaai/jina-embeddings-v2-small-en",
        "jina-base-en" => "jinaai/jina-embeddings-v2-base-en",
        "jina-base-de" => "jinaai/jina-embeddings-v2-base-de",
        "jina-code" => "jinaai/jina-embeddings-v2-base-code",
        // Snowflake Arctic family
        "arctic-embed-xs" => "snowflake/snowflake-arctic-embed-xs",
        "arctic-embed-s" => "snowflake/snowflake-arctic-embed-s",
        "arctic-embed-m" => "snowflake/snowflake-arctic-embed-m",
        "arctic-embed-m-long" => "snowflake/snowflake-arctic-embed-m-long",
        "arctic-embed-l" => "snowflake/snowflake-arctic-embed-l",
        // Nomic family
        "nomic-embed-text" => "nomic-ai/nomic-embed-text-v1",
        "nomic-embed-text-1.5" => "nomic-ai/nomic-embed-text-v1.5",
        "nomic-embed-text-Q" => "nomic-ai/nomic-embed-text-v1.5-Q",
        // Sentence Transformers family
        "all-minilm-l6-v2" => "sentence-transformers/all-MiniLM-L6-v2",
        "paraphrase-multilingual-mpnet" => {
            "sentence-transformers/paraphrase-multilingual-mpnet-base-v2"
        }
        "paraphrase-multilingual-MiniLM" => {
            "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2"
        }
        // E5 family
        "multilingual-e5-small" => "intfloat/multilingual-e5-small",
        "multilingual-e5-large" => "intfloat/multilingual-e5-large",
        // GTE / MXBAI / CLIP
        "gte-large" => "thenlper/gte-large",
        "mxbai-embed-large" => "mixedbread-ai/mxbai-embed-large-v1",
        "clip-vit-b-32" => "Qdrant/clip-ViT-B-32-text",
        // Compatibility aliases
        "default" => "BAAI/bge-small-en-v1.5",
        "bge-small-en-v1.5" => "BAAI/bge-small-en-v1.5",
        "bge-base-en-v1.5" => "BAAI/bge-base-en-v1.5",
        other => other,
    }
}

/// Advertised dimensionality for a short model name, before the backend is
/// loaded. The dimension recorded in the store always comes from a probe of
/// the loaded backend, never from this table.
///
/// # Examples
///
/// ```
/// use quarry_embed::default_dimensions;
///
/// assert_eq!(default_dimensions("bge-large-en"), 1024);
/// assert_eq!(default_dimensions("something-unknown"), 384);
/// ```
pub fn default_dimensions(name: &str) -> usize {
    match name {
        "bge-small-zh" | "jina-small-en" | "clip-vit-b-32" => 512,
        "bge-base-en" | "jina-base-en" | "jina-base-de" | "jina-code" | "arctic-embed-m"
        | "arctic-embed-m-long" | "nomic-embed-text" | "nomic-embed-text-1.5"
        | "nomic-embed-text-Q" | "paraphrase-multilingual-mpnet" => 768,
        "bge-large-en" | "arctic-embed-l" | "multilingual-e5-large" | "gte-large"
        | "mxbai-embed-large" => 1024,
        _ => 384,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_to_full_ids() {
        assert_eq!(resolve_model("jina-code"), "jinaai/jina-embeddings-v2-base-code");
        assert_eq!(resolve_model("all-minilm-l6-v2"), "sentence-transformers/all-MiniLM-L6-v2");
        assert_eq!(resolve_model("arctic-embed-l"), "snowflake/snowflake-arctic-embed-l");
    }

    #[test]
    fn unknown_names_pass_through() {
        assert_eq!(resolve_model("intfloat/e5-base-v2"), "intfloat/e5-base-v2");
    }

    #[test]
    fn dimensions_match_model_families() {
        assert_eq!(default_dimensions("default"), 384);
        assert_eq!(default_dimensions("bge-small-en"), 384);
        assert_eq!(default_dimensions("bge-small-zh"), 512);
        assert_eq!(default_dimensions("jina-base-en"), 768);
        assert_eq!(default_dimensions("multilingual-e5-large"), 1024);
    }
}
