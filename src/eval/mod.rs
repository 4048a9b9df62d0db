//! Evaluation: per-query scoring (P@K, R@K, RR), aggregation (MAP, MAR, MRR)
//! and the evaluator that drives searches for a test set.

pub mod evaluator;
pub mod metrics;

pub use evaluator::{EvaluationRun, Evaluator, QueryOutcome};
pub use metrics::{precision_at_k, recall_at_k, reciprocal_rank, MetricsSummary, QueryScore};
