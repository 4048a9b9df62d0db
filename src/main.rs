//! Full run CLI: index the corpus into both configurations, then evaluate each.

use anyhow::{Context, Result};
use clap::Parser;
use paraeval::lemma::QueryLemmatizer;
use paraeval::report::{format_configuration, format_counts};
use paraeval::{Config, Pipeline, RunEvent, RunOptions};
use std::path::PathBuf;

/// Index the paragraph corpus into both configurations and report MAP/MAR/MRR for each.
#[derive(Parser, Debug)]
#[command(name = "paraeval")]
#[command(about = "Evaluate plain vs. morphological Elasticsearch retrieval on a labeled question set")]
struct Args {
    /// Config file (default: $PARAEVAL_CONFIG or ./config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Evaluate existing indices without loading the corpus
    #[arg(long)]
    skip_indexing: bool,

    /// Write the structured report as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Include per-query outcomes in the JSON report
    #[arg(long)]
    details: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load_or(args.config.as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.paraeval.log_level.as_str()),
    )
    .init();

    log::info!("Starting paraeval v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Elasticsearch: {}", config.elasticsearch.url);

    let pipeline = Pipeline::from_config(&config).context("Failed to set up Elasticsearch client")?;
    let lemmatizer = QueryLemmatizer::from_config(&config.lemmatizer);

    let mut options = RunOptions::from_config(&config);
    options.skip_indexing = args.skip_indexing;
    options.include_details = args.details;

    let report = pipeline
        .run(&lemmatizer, &options, |event| match event {
            RunEvent::Counts(counts) => println!("{}", format_counts(counts)),
            RunEvent::Configuration(configuration) => {
                println!("{}", format_configuration(configuration))
            }
        })
        .await
        .context("Evaluation run failed")?;

    if let Some(path) = &args.json {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    log::info!(
        "Finished in {}s",
        (report.finished_at - report.started_at).num_seconds()
    );
    Ok(())
}
