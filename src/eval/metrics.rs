//! Evaluation metrics: Precision@K, Recall@K, reciprocal rank and their means.

use crate::corpus::ParagraphId;
use crate::error::{EvalError, Result};
use serde::Serialize;
use std::collections::HashSet;

/// Number of gold paragraphs among the first `k` hits.
fn relevant_in_top_k(hits: &[ParagraphId], gold: &HashSet<ParagraphId>, k: usize) -> usize {
    hits.iter().take(k).filter(|id| gold.contains(id)).count()
}

/// Precision at K: relevant hits in the top K divided by K.
///
/// The denominator is always K, never the number of hits actually returned,
/// so a short result list is penalized for its empty slots. Returns 0.0 if k is 0.
pub fn precision_at_k(hits: &[ParagraphId], gold: &HashSet<ParagraphId>, k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    relevant_in_top_k(hits, gold, k) as f64 / k as f64
}

/// Recall at K: proportion of the gold set found in the top K.
///
/// Gold ids missing from the index still count in the denominator.
/// Returns 0.0 for an empty gold set.
pub fn recall_at_k(hits: &[ParagraphId], gold: &HashSet<ParagraphId>, k: usize) -> f64 {
    if gold.is_empty() {
        return 0.0;
    }
    relevant_in_top_k(hits, gold, k) as f64 / gold.len() as f64
}

/// 1/rank of the first gold hit within the top K (ranks start at 1), else 0.0.
pub fn reciprocal_rank(hits: &[ParagraphId], gold: &HashSet<ParagraphId>, k: usize) -> f64 {
    hits.iter()
        .take(k)
        .position(|id| gold.contains(id))
        .map(|idx| 1.0 / (idx + 1) as f64)
        .unwrap_or(0.0)
}

/// Per-query contributions to the corpus-level means.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueryScore {
    /// Gold paragraphs found in the top K (`ctp`).
    pub relevant_hits: usize,
    pub precision: f64,
    pub recall: f64,
    pub reciprocal_rank: f64,
}

impl QueryScore {
    /// Score one ranked hit list against its gold set.
    ///
    /// Returns `None` when the gold set is empty: such cases are excluded
    /// from every mean rather than contributing zeros.
    pub fn compute(hits: &[ParagraphId], gold: &HashSet<ParagraphId>, k: usize) -> Option<Self> {
        if gold.is_empty() {
            return None;
        }
        Some(Self {
            relevant_hits: relevant_in_top_k(hits, gold, k),
            precision: precision_at_k(hits, gold, k),
            recall: recall_at_k(hits, gold, k),
            reciprocal_rank: reciprocal_rank(hits, gold, k),
        })
    }
}

/// Corpus-level metrics for one index configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSummary {
    /// Mean precision@k (reported as MAP).
    pub map: f64,
    /// Mean recall@k (reported as MAR).
    pub mar: f64,
    /// Mean reciprocal rank.
    pub mrr: f64,
    /// Number of scored queries the means are taken over.
    pub queries: usize,
}

impl MetricsSummary {
    /// Arithmetic means of the per-query contributions.
    ///
    /// Fails with `EmptyResult` when nothing was scored instead of
    /// producing NaN.
    pub fn aggregate(scores: &[QueryScore]) -> Result<Self> {
        if scores.is_empty() {
            return Err(EvalError::EmptyResult);
        }
        let n = scores.len() as f64;
        let mean = |f: fn(&QueryScore) -> f64| scores.iter().map(f).sum::<f64>() / n;
        Ok(Self {
            map: mean(|s| s.precision),
            mar: mean(|s| s.recall),
            mrr: mean(|s| s.reciprocal_rank),
            queries: scores.len(),
        })
    }
}
