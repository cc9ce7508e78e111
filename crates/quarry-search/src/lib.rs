//! Query analysis and hybrid rank fusion.
//!
//! This crate is the retrieval brain of quarry: [`QueryAnalyzer`] turns a raw
//! natural-language query into a structured [`QueryAnalysis`] (normalized
//! form, intent, expansion variants, lexical rewrite), and [`HybridRanker`]
//! fuses dense and lexical candidate lists into one ranked result set using
//! one of five [`RankStrategy`] variants.
//!
//! Both halves are pure and storage-agnostic; wiring them to the embedding
//! backend and the stores happens one level up in `quarry-indexer`.

mod query;
mod ranker;

pub use query::{QueryAnalysis, QueryAnalyzer, QueryIntent};
pub use ranker::{FusedScore, HybridRanker, RankStrategy, RRF_K};
