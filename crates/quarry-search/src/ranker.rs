//! Fusion of dense and lexical ranked lists.

use quarry_core::{QuarryError, Result};

/// The RRF rank constant: contributions are `1/(60 + rank)`.
pub const RRF_K: f64 = 60.0;

const DEFAULT_VECTOR_WEIGHT: f64 = 0.6;
const DEFAULT_KEYWORD_WEIGHT: f64 = 0.4;

/// How the two ranked lists combine into one score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankStrategy {
    /// Reciprocal rank fusion, weighted per source.
    #[default]
    Rrf,
    /// Weighted sum of normalized scores.
    Linear,
    /// Geometric mean when both sources hit, else the better one.
    Multiplicative,
    /// Best single-source score.
    Max,
    /// Worst single-source score; requires presence in both lists.
    Min,
}

impl std::str::FromStr for RankStrategy {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rrf" => Ok(RankStrategy::Rrf),
            "linear" => Ok(RankStrategy::Linear),
            "multiplicative" => Ok(RankStrategy::Multiplicative),
            "max" => Ok(RankStrategy::Max),
            "min" => Ok(RankStrategy::Min),
            other => Err(QuarryError::Config(format!(
                "unknown rank strategy: '{other}'"
            ))),
        }
    }
}

/// One fused entry: the unit id, its final score, and the per-source
/// contributions that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedScore {
    pub id: String,
    pub score: f64,
    /// Dense similarity in `[0, 1]`; zero when absent from the dense list.
    pub vector_score: f64,
    /// Lexical score max-normalized into `[0, 1]`; zero when absent.
    pub keyword_score: f64,
}

/// Weighted fuser over a dense and a lexical ranked list.
///
/// # Examples
///
/// ```
/// use quarry_search::{HybridRanker, RankStrategy};
///
/// let ranker = HybridRanker::new();
/// let dense = vec![("a".to_string(), 0.9)];
/// let lexical = vec![("a".to_string(), 2.5)];
/// let fused = ranker.fuse(RankStrategy::Rrf, &dense, &lexical, 10, 0.0).unwrap();
/// assert_eq!(fused[0].id, "a");
/// ```
#[derive(Debug, Clone)]
pub struct HybridRanker {
    vector_weight: f64,
    keyword_weight: f64,
}

impl Default for HybridRanker {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridRanker {
    /// Ranker with the default 0.6/0.4 weighting.
    pub fn new() -> Self {
        Self {
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
        }
    }

    /// Ranker with explicit weights.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Config`] unless the weights sum to 1 within
    /// `1e-6`.
    ///
    /// # Examples
    ///
    /// ```
    /// use quarry_search::HybridRanker;
    ///
    /// assert!(HybridRanker::with_weights(0.7, 0.3).is_ok());
    /// assert!(HybridRanker::with_weights(0.7, 0.5).is_err());
    /// ```
    pub fn with_weights(vector_weight: f64, keyword_weight: f64) -> Result<Self> {
        if (vector_weight + keyword_weight - 1.0).abs() >= 1e-6 {
            return Err(QuarryError::Config(format!(
                "rank weights must sum to 1, got {vector_weight} + {keyword_weight}"
            )));
        }
        Ok(Self {
            vector_weight,
            keyword_weight,
        })
    }

    /// Fuse two ranked lists into one, filtered by `threshold` and cut to
    /// `limit`.
    ///
    /// `dense` pairs ids with similarities in `[0, 1]`; `lexical` pairs ids
    /// with raw scores and is max-normalized here. Both lists must already
    /// be sorted by descending score (their order defines RRF ranks). A unit
    /// missing from one source contributes zero there, except under
    /// [`RankStrategy::Min`] which drops it.
    ///
    /// # Errors
    ///
    /// This signature reserves the right to refuse malformed input; the
    /// current strategies always succeed.
    pub fn fuse(
        &self,
        strategy: RankStrategy,
        dense: &[(String, f64)],
        lexical: &[(String, f64)],
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<FusedScore>> {
        let lexical_max = lexical
            .iter()
            .map(|(_, score)| *score)
            .fold(0.0f64, f64::max);

        // id -> (normalized score, rank)
        let mut entries: std::collections::HashMap<&str, (f64, Option<usize>, f64, Option<usize>)> =
            std::collections::HashMap::new();
        for (rank, (id, similarity)) in dense.iter().enumerate() {
            let entry = entries.entry(id.as_str()).or_insert((0.0, None, 0.0, None));
            entry.0 = *similarity;
            entry.1 = Some(rank);
        }
        for (rank, (id, score)) in lexical.iter().enumerate() {
            let normalized = if lexical_max > 0.0 {
                (score / lexical_max).min(1.0)
            } else {
                0.0
            };
            let entry = entries.entry(id.as_str()).or_insert((0.0, None, 0.0, None));
            entry.2 = normalized;
            entry.3 = Some(rank);
        }

        let mut fused: Vec<FusedScore> = Vec::with_capacity(entries.len());
        for (id, (v, v_rank, k, k_rank)) in entries {
            let score = match strategy {
                RankStrategy::Rrf => {
                    let v_rrf = v_rank.map_or(0.0, |r| 1.0 / (RRF_K + r as f64 + 1.0));
                    let k_rrf = k_rank.map_or(0.0, |r| 1.0 / (RRF_K + r as f64 + 1.0));
                    self.vector_weight * v_rrf + self.keyword_weight * k_rrf
                }
                RankStrategy::Linear => self.vector_weight * v + self.keyword_weight * k,
                RankStrategy::Multiplicative => {
                    if v > 0.0 && k > 0.0 {
                        (v * k).sqrt()
                    } else {
                        v.max(k)
                    }
                }
                RankStrategy::Max => v.max(k),
                RankStrategy::Min => {
                    if v_rank.is_none() || k_rank.is_none() {
                        continue;
                    }
                    v.min(k)
                }
            };
            if score < threshold {
                continue;
            }
            fused.push(FusedScore {
                id: id.to_string(),
                score,
                vector_score: v,
                keyword_score: k,
            });
        }

        fused.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.vector_score
                        .partial_cmp(&a.vector_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.id.cmp(&b.id))
        });
        fused.truncate(limit);
        Ok(fused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn weight_invariant_is_enforced() {
        assert!(HybridRanker::with_weights(0.6, 0.4).is_ok());
        assert!(HybridRanker::with_weights(1.0, 0.0).is_ok());
        let err = HybridRanker::with_weights(0.6, 0.6).unwrap_err();
        assert!(matches!(err, QuarryError::Config(_)));
    }

    #[test]
    fn linear_strategy_matches_worked_example() {
        // Dense [A:0.9, B:0.7], lexical [B:1.0, C:0.6], weights (0.6, 0.4).
        let ranker = HybridRanker::new();
        let dense = list(&[("A", 0.9), ("B", 0.7)]);
        let lexical = list(&[("B", 1.0), ("C", 0.6)]);

        let fused = ranker
            .fuse(RankStrategy::Linear, &dense, &lexical, 10, 0.0)
            .unwrap();
        let ids: Vec<&str> = fused.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
        assert!((fused[0].score - 0.82).abs() < 1e-9);
        assert!((fused[1].score - 0.54).abs() < 1e-9);
        assert!((fused[2].score - 0.24).abs() < 1e-9);
    }

    #[test]
    fn max_and_min_strategies_match_worked_example() {
        let ranker = HybridRanker::new();
        let dense = list(&[("A", 0.9), ("B", 0.7)]);
        let lexical = list(&[("B", 1.0), ("C", 0.6)]);

        let fused = ranker
            .fuse(RankStrategy::Max, &dense, &lexical, 10, 0.0)
            .unwrap();
        let ids: Vec<&str> = fused.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
        assert!((fused[0].score - 1.0).abs() < 1e-9);

        // Min keeps only units present in both lists.
        let fused = ranker
            .fuse(RankStrategy::Min, &dense, &lexical, 10, 0.0)
            .unwrap();
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].id, "B");
        assert!((fused[0].score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn multiplicative_uses_geometric_mean_when_both_hit() {
        let ranker = HybridRanker::new();
        let dense = list(&[("A", 0.9), ("B", 0.4)]);
        let lexical = list(&[("B", 1.0)]);

        let fused = ranker
            .fuse(RankStrategy::Multiplicative, &dense, &lexical, 10, 0.0)
            .unwrap();
        let a = fused.iter().find(|f| f.id == "A").unwrap();
        let b = fused.iter().find(|f| f.id == "B").unwrap();
        // A is dense-only, so it keeps its dense score.
        assert!((a.score - 0.9).abs() < 1e-9);
        assert!((b.score - (0.4f64).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn rrf_prefers_agreement_between_sources() {
        let ranker = HybridRanker::new();
        let dense = list(&[("A", 0.9), ("B", 0.8)]);
        let lexical = list(&[("B", 3.0), ("C", 1.0)]);

        let fused = ranker
            .fuse(RankStrategy::Rrf, &dense, &lexical, 10, 0.0)
            .unwrap();
        // B appears in both lists, so it outranks the single-source hits.
        assert_eq!(fused[0].id, "B");
    }

    #[test]
    fn threshold_suppresses_low_scores() {
        let ranker = HybridRanker::new();
        let dense = list(&[("A", 0.9), ("B", 0.74), ("C", 0.73)]);

        let fused = ranker
            .fuse(RankStrategy::Max, &dense, &[], 10, 0.75)
            .unwrap();
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].id, "A");
        for f in &fused {
            assert!(f.score >= 0.75);
        }
    }

    #[test]
    fn extreme_weights_reduce_to_single_source() {
        // (0, 1) under Linear reproduces the lexical ordering alone.
        let ranker = HybridRanker::with_weights(0.0, 1.0).unwrap();
        let dense = list(&[("A", 0.99), ("B", 0.5)]);
        let lexical = list(&[("C", 4.0), ("B", 2.0)]);

        let fused = ranker
            .fuse(RankStrategy::Linear, &dense, &lexical, 10, 0.01)
            .unwrap();
        let ids: Vec<&str> = fused.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["C", "B"]);
        assert!((fused[0].score - 1.0).abs() < 1e-9);
        assert!((fused[1].score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn limit_truncates_after_sorting() {
        let ranker = HybridRanker::new();
        let dense = list(&[("A", 0.9), ("B", 0.8), ("C", 0.7)]);
        let fused = ranker
            .fuse(RankStrategy::Max, &dense, &[], 2, 0.0)
            .unwrap();
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].id, "A");
    }

    #[test]
    fn strategy_parses_from_str() {
        assert_eq!("rrf".parse::<RankStrategy>().unwrap(), RankStrategy::Rrf);
        assert_eq!("min".parse::<RankStrategy>().unwrap(), RankStrategy::Min);
        assert!("cascade".parse::<RankStrategy>().is_err());
    }
}
