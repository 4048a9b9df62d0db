//! Full evaluation run: ensure indices → bulk load → counts → evaluate
//! plain, then morphological.

use crate::config::Config;
use crate::corpus::{load_paragraphs, load_query_cases, Paragraph, QueryCase};
use crate::error::Result;
use crate::eval::Evaluator;
use crate::lemma::Lemmatizer;
use crate::report::{ConfigurationReport, IndexCount, RunReport};
use crate::search::{ElasticClient, IndexConfig, SearchBackend};
use chrono::Utc;
use std::path::PathBuf;

/// Which index configurations to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Plain,
    Morphological,
}

/// Per-invocation settings
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub paragraphs_path: PathBuf,
    pub queries_path: PathBuf,
    pub k: usize,
    pub concurrency: usize,
    /// Evaluate against existing indices without (re)loading the corpus.
    pub skip_indexing: bool,
    /// Keep per-query outcomes in the report.
    pub include_details: bool,
    pub selection: Selection,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            paragraphs_path: config.paraeval.paragraphs_path.clone(),
            queries_path: config.paraeval.queries_path.clone(),
            k: config.eval.k,
            concurrency: config.eval.concurrency,
            skip_indexing: false,
            include_details: false,
            selection: Selection::All,
        }
    }
}

/// Progress notifications, emitted as soon as each stage completes.
#[derive(Debug)]
pub enum RunEvent<'a> {
    Counts(&'a [IndexCount]),
    Configuration(&'a ConfigurationReport),
}

/// The search backend plus both index configurations under evaluation
pub struct Pipeline<B> {
    backend: B,
    plain: IndexConfig,
    morphological: IndexConfig,
}

impl Pipeline<ElasticClient> {
    /// Elasticsearch-backed pipeline from the loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            ElasticClient::from_config(config)?,
            config.plain_index(),
            config.morphological_index(),
        ))
    }
}

impl<B: SearchBackend> Pipeline<B> {
    pub fn new(backend: B, plain: IndexConfig, morphological: IndexConfig) -> Self {
        Self {
            backend,
            plain,
            morphological,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Index configurations in evaluation order.
    pub fn configurations(&self) -> [&IndexConfig; 2] {
        [&self.plain, &self.morphological]
    }

    fn selected(&self, selection: Selection) -> Vec<&IndexConfig> {
        match selection {
            Selection::All => self.configurations().to_vec(),
            Selection::Plain => vec![&self.plain],
            Selection::Morphological => vec![&self.morphological],
        }
    }

    /// Create both indices if they do not exist yet.
    pub async fn prepare_indices(&self) -> Result<()> {
        for index in self.configurations() {
            self.backend.ensure_index(index).await?;
        }
        Ok(())
    }

    /// Bulk load the corpus into both indices, then report their counts.
    pub async fn index_corpus(&self, paragraphs: &[Paragraph]) -> Result<Vec<IndexCount>> {
        for index in self.configurations() {
            let indexed = self.backend.bulk_index(index, paragraphs).await?;
            log::info!("Indexed {} documents into {}", indexed, index.name);
        }
        self.counts(Selection::All).await
    }

    /// Document counts of the selected indices only; unselected ones may not exist.
    pub async fn counts(&self, selection: Selection) -> Result<Vec<IndexCount>> {
        let mut counts = Vec::with_capacity(2);
        for index in self.selected(selection) {
            counts.push(IndexCount {
                index: index.name.clone(),
                documents: self.backend.count(index).await?,
            });
        }
        Ok(counts)
    }

    /// Evaluate the selected configurations one after another.
    ///
    /// `on_done` sees each configuration as soon as it completes, so earlier
    /// results are reported even if a later configuration fails.
    pub async fn evaluate<L, F>(
        &self,
        lemmatizer: &L,
        options: &RunOptions,
        cases: &[QueryCase],
        mut on_done: F,
    ) -> Result<Vec<ConfigurationReport>>
    where
        L: Lemmatizer,
        F: FnMut(&ConfigurationReport),
    {
        let evaluator =
            Evaluator::new(&self.backend, lemmatizer, options.k).with_concurrency(options.concurrency);
        let mut reports = Vec::new();
        for index in self.selected(options.selection) {
            let run = evaluator.evaluate(index, cases).await?;
            let report = ConfigurationReport::from_run(run, options.include_details);
            on_done(&report);
            reports.push(report);
        }
        Ok(reports)
    }

    /// One complete invocation in the documented order.
    pub async fn run<L, F>(&self, lemmatizer: &L, options: &RunOptions, mut on_event: F) -> Result<RunReport>
    where
        L: Lemmatizer,
        F: FnMut(RunEvent<'_>),
    {
        let started_at = Utc::now();

        let counts = if options.skip_indexing {
            log::info!("Skipping indexing; evaluating existing indices");
            self.counts(options.selection).await?
        } else {
            self.prepare_indices().await?;
            let paragraphs = load_paragraphs(&options.paragraphs_path)?;
            self.index_corpus(&paragraphs).await?
        };
        on_event(RunEvent::Counts(&counts));

        let cases = load_query_cases(&options.queries_path)?;
        let configurations = self
            .evaluate(lemmatizer, options, &cases, |report| {
                on_event(RunEvent::Configuration(report))
            })
            .await?;

        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            k: options.k,
            counts,
            configurations,
        })
    }
}
