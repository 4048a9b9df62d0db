//! Structured run results plus their human-readable rendering.

use crate::error::Result;
use crate::eval::{EvaluationRun, QueryOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

/// Document count of one index after loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexCount {
    pub index: String,
    pub documents: u64,
}

/// Metrics of one fully evaluated index configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationReport {
    pub index: String,
    /// "plain" or "morphological"
    pub mode: String,
    pub scored_queries: usize,
    pub skipped_queries: usize,
    pub map: f64,
    pub mar: f64,
    pub mrr: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queries: Option<Vec<QueryOutcome>>,
}

impl ConfigurationReport {
    /// Summarize an evaluation run; per-query outcomes are kept only if asked.
    pub fn from_run(run: EvaluationRun, include_details: bool) -> Self {
        Self {
            mode: if run.morphological { "morphological" } else { "plain" }.to_string(),
            index: run.index,
            scored_queries: run.summary.queries,
            skipped_queries: run.skipped,
            map: run.summary.map,
            mar: run.summary.mar,
            mrr: run.summary.mrr,
            queries: include_details.then_some(run.outcomes),
        }
    }
}

/// Everything one invocation produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub k: usize,
    pub counts: Vec<IndexCount>,
    pub configurations: Vec<ConfigurationReport>,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        log::info!("Report written to {}", path.display());
        Ok(())
    }
}

pub fn format_counts(counts: &[IndexCount]) -> String {
    let mut out = String::new();
    for count in counts {
        let _ = writeln!(out, "Documents in index {}: {}", count.index, count.documents);
    }
    out
}

pub fn format_configuration(report: &ConfigurationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ({}) ===", report.index, report.mode);
    let _ = writeln!(
        out,
        "Queries:\t{} scored, {} skipped (no gold answer)",
        report.scored_queries, report.skipped_queries
    );
    let _ = writeln!(out, "MAP:\t{:.4}", report.map);
    let _ = writeln!(out, "MAR:\t{:.4}", report.mar);
    let _ = writeln!(out, "MRR:\t{:.4}", report.mrr);
    out
}
