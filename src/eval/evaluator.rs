//! Runs the test questions against one index configuration and scores them.

use crate::corpus::{ParagraphId, QueryCase};
use crate::error::Result;
use crate::eval::metrics::{MetricsSummary, QueryScore};
use crate::lemma::Lemmatizer;
use crate::search::{IndexConfig, SearchBackend};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Instant;

const PROGRESS_EVERY: usize = 100;

/// One scored question.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub uid: Option<u64>,
    pub question: String,
    /// Text actually sent to the engine (lemmatized in morphological mode).
    pub processed_query: String,
    pub hits: Vec<ParagraphId>,
    #[serde(flatten)]
    pub score: QueryScore,
}

/// Result of evaluating every question against one index configuration.
#[derive(Debug, Clone)]
pub struct EvaluationRun {
    pub index: String,
    pub morphological: bool,
    /// Scored questions in dataset order.
    pub outcomes: Vec<QueryOutcome>,
    /// Questions excluded for having an empty gold set.
    pub skipped: usize,
    pub summary: MetricsSummary,
}

/// Issues searches for test questions and scores the top-k hits
pub struct Evaluator<'a, B, L> {
    backend: &'a B,
    lemmatizer: &'a L,
    k: usize,
    concurrency: usize,
}

impl<'a, B: SearchBackend, L: Lemmatizer> Evaluator<'a, B, L> {
    pub fn new(backend: &'a B, lemmatizer: &'a L, k: usize) -> Self {
        Self {
            backend,
            lemmatizer,
            k,
            concurrency: 1,
        }
    }

    /// Allow up to `concurrency` searches in flight. Outcomes keep dataset
    /// order regardless, so the means do not depend on this setting.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Score a single question. `None` when its gold set is empty.
    pub async fn evaluate_case(
        &self,
        index: &IndexConfig,
        case: &QueryCase,
    ) -> Result<Option<QueryOutcome>> {
        if !case.has_gold() {
            return Ok(None);
        }

        let processed_query = if index.is_morphological() {
            self.lemmatizer.lemmatize(&case.question).await?
        } else {
            case.question.clone()
        };

        let hits = self.backend.search(index, &processed_query, self.k).await?;
        let Some(score) = QueryScore::compute(&hits, &case.relevant, self.k) else {
            return Ok(None);
        };

        Ok(Some(QueryOutcome {
            uid: case.uid,
            question: case.question.clone(),
            processed_query,
            hits,
            score,
        }))
    }

    /// Evaluate every question and aggregate MAP / MAR / MRR.
    ///
    /// Any search or lemmatizer failure aborts the whole configuration.
    /// Fails with `EmptyResult` when no question has a gold set.
    pub async fn evaluate(&self, index: &IndexConfig, cases: &[QueryCase]) -> Result<EvaluationRun> {
        let start = Instant::now();
        let scored: Vec<&QueryCase> = cases.iter().filter(|c| c.has_gold()).collect();
        let skipped = cases.len() - scored.len();
        let total = scored.len();

        log::info!(
            "Evaluating {} queries against {} ({} mode, k={}, {} skipped without gold answers)",
            total,
            index.name,
            index.mode(),
            self.k,
            skipped
        );

        let mut outcomes = Vec::with_capacity(total);
        let mut pending = std::pin::pin!(stream::iter(scored)
            .map(|case| self.evaluate_case(index, case))
            .buffered(self.concurrency));

        while let Some(outcome) = pending.next().await {
            if let Some(outcome) = outcome? {
                outcomes.push(outcome);
            }
            if outcomes.len() % PROGRESS_EVERY == 0 {
                log::info!("{}: {}/{} queries evaluated", index.name, outcomes.len(), total);
            }
        }

        let scores: Vec<QueryScore> = outcomes.iter().map(|o| o.score).collect();
        let summary = MetricsSummary::aggregate(&scores)?;

        log::info!(
            "{}: MAP {:.4}, MAR {:.4}, MRR {:.4} over {} queries in {:?}",
            index.name,
            summary.map,
            summary.mar,
            summary.mrr,
            summary.queries,
            start.elapsed()
        );

        Ok(EvaluationRun {
            index: index.name.clone(),
            morphological: index.is_morphological(),
            outcomes,
            skipped,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Paragraph;
    use crate::error::EvalError;
    use crate::search::{Analysis, MorphologySettings};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Canned hit lists keyed by query text; records every search.
    #[derive(Default)]
    struct FakeBackend {
        hits: HashMap<String, Vec<u64>>,
        searches: Mutex<Vec<(String, String)>>,
    }

    impl FakeBackend {
        fn with(mut self, query: &str, hits: &[u64]) -> Self {
            self.hits.insert(query.to_string(), hits.to_vec());
            self
        }

        fn searches(&self) -> Vec<(String, String)> {
            self.searches.lock().unwrap().clone()
        }
    }

    impl SearchBackend for FakeBackend {
        async fn ensure_index(&self, _index: &IndexConfig) -> Result<bool> {
            Ok(false)
        }

        async fn bulk_index(&self, _index: &IndexConfig, paragraphs: &[Paragraph]) -> Result<usize> {
            Ok(paragraphs.len())
        }

        async fn count(&self, _index: &IndexConfig) -> Result<u64> {
            Ok(0)
        }

        async fn search(&self, index: &IndexConfig, text: &str, k: usize) -> Result<Vec<ParagraphId>> {
            self.searches
                .lock()
                .unwrap()
                .push((index.name.clone(), text.to_string()));
            match self.hits.get(text) {
                Some(ids) => Ok(ids.iter().take(k).copied().map(ParagraphId).collect()),
                None => Err(EvalError::Query(format!("no canned hits for {:?}", text))),
            }
        }
    }

    struct Upper;

    impl Lemmatizer for Upper {
        async fn lemmatize(&self, text: &str) -> Result<String> {
            Ok(text.to_uppercase())
        }
    }

    fn plain() -> IndexConfig {
        IndexConfig {
            name: "plain".to_string(),
            analysis: Analysis::Standard,
        }
    }

    fn morph() -> IndexConfig {
        IndexConfig {
            name: "morph".to_string(),
            analysis: Analysis::Morphological(MorphologySettings {
                language: "russian".to_string(),
                stopwords: "_russian_".to_string(),
                keywords: vec![],
            }),
        }
    }

    fn case(question: &str, gold: &[u64]) -> QueryCase {
        QueryCase {
            uid: None,
            question: question.to_string(),
            relevant: gold.iter().copied().map(ParagraphId).collect(),
            related: HashSet::new(),
        }
    }

    #[tokio::test]
    async fn scores_and_aggregates() {
        let backend = FakeBackend::default()
            .with("q1", &[5, 2, 9, 1, 7])
            .with("q2", &[1, 2, 3, 4, 5]);
        let cases = vec![case("q1", &[1, 2, 3]), case("q2", &[10])];
        let run = Evaluator::new(&backend, &Upper, 5)
            .evaluate(&plain(), &cases)
            .await
            .unwrap();

        assert_eq!(run.index, "plain");
        assert!(!run.morphological);
        assert_eq!(run.skipped, 0);
        assert_eq!(run.outcomes.len(), 2);
        assert_eq!(run.outcomes[0].score.relevant_hits, 2);
        assert!((run.summary.map - 0.2).abs() < 1e-12);
        assert!((run.summary.mar - 1.0 / 3.0).abs() < 1e-12);
        assert!((run.summary.mrr - 0.25).abs() < 1e-12);
    }

    #[tokio::test]
    async fn empty_gold_cases_are_skipped_without_search() {
        let backend = FakeBackend::default().with("q1", &[1]);
        let with_empty = vec![case("q1", &[1]), case("unanswerable", &[])];
        let without_empty = vec![case("q1", &[1])];

        let evaluator = Evaluator::new(&backend, &Upper, 5);
        let a = evaluator.evaluate(&plain(), &with_empty).await.unwrap();
        let b = evaluator.evaluate(&plain(), &without_empty).await.unwrap();

        assert_eq!(a.skipped, 1);
        assert_eq!(a.summary, b.summary);
        assert!(backend.searches().iter().all(|(_, q)| q != "unanswerable"));
    }

    #[tokio::test]
    async fn all_skipped_is_empty_result() {
        let backend = FakeBackend::default();
        let cases = vec![case("a", &[]), case("b", &[])];
        let err = Evaluator::new(&backend, &Upper, 5)
            .evaluate(&plain(), &cases)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::EmptyResult));
        assert!(backend.searches().is_empty());
    }

    #[tokio::test]
    async fn morphological_mode_lemmatizes_query() {
        let backend = FakeBackend::default().with("ВОЙНА", &[3]).with("война", &[4]);
        let cases = vec![case("война", &[3])];
        let evaluator = Evaluator::new(&backend, &Upper, 5);

        let morph_run = evaluator.evaluate(&morph(), &cases).await.unwrap();
        assert_eq!(morph_run.outcomes[0].processed_query, "ВОЙНА");
        assert_eq!(morph_run.summary.mrr, 1.0);
        assert!(morph_run.morphological);

        let plain_run = evaluator.evaluate(&plain(), &cases).await.unwrap();
        assert_eq!(plain_run.outcomes[0].processed_query, "война");
        assert_eq!(plain_run.summary.mrr, 0.0);

        assert_eq!(
            backend.searches(),
            vec![
                ("morph".to_string(), "ВОЙНА".to_string()),
                ("plain".to_string(), "война".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn search_failure_aborts_run() {
        let backend = FakeBackend::default().with("q1", &[1]);
        let cases = vec![case("q1", &[1]), case("missing", &[2])];
        let err = Evaluator::new(&backend, &Upper, 5)
            .evaluate(&plain(), &cases)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::Query(_)));
    }

    #[tokio::test]
    async fn concurrency_preserves_order_and_metrics() {
        let mut backend = FakeBackend::default();
        let mut cases = Vec::new();
        for i in 0..25u64 {
            let query = format!("q{}", i);
            backend = backend.with(&query, &[i, i + 1, i + 2]);
            cases.push(case(&query, &[i + (i % 3)]));
        }

        let sequential = Evaluator::new(&backend, &Upper, 5)
            .evaluate(&plain(), &cases)
            .await
            .unwrap();
        let concurrent = Evaluator::new(&backend, &Upper, 5)
            .with_concurrency(8)
            .evaluate(&plain(), &cases)
            .await
            .unwrap();

        let order = |run: &EvaluationRun| {
            run.outcomes.iter().map(|o| o.question.clone()).collect::<Vec<_>>()
        };
        assert_eq!(order(&sequential), order(&concurrent));
        assert_eq!(sequential.summary, concurrent.summary);
    }
}
