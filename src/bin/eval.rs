//! Evaluation CLI: score existing indices against the test set without reloading the corpus.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use paraeval::corpus::load_query_cases;
use paraeval::lemma::QueryLemmatizer;
use paraeval::report::{format_configuration, format_counts};
use paraeval::{Config, Pipeline, RunOptions, Selection};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Only {
    Plain,
    Morphological,
}

#[derive(Parser, Debug)]
#[command(name = "eval")]
#[command(about = "Report MAP/MAR/MRR for the already populated indices")]
struct Args {
    /// Config file (default: $PARAEVAL_CONFIG or ./config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Test questions JSON, overriding paraeval.queries_path
    #[arg(long)]
    queries: Option<PathBuf>,

    /// Evaluate a single configuration
    #[arg(long, value_enum)]
    only: Option<Only>,

    /// Retrieval depth, overriding eval.k
    #[arg(short, long)]
    k: Option<usize>,

    /// Print every question with its hits and scores
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load_or(args.config.as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.paraeval.log_level.as_str()),
    )
    .init();

    let mut options = RunOptions::from_config(&config);
    if let Some(k) = args.k {
        if k == 0 {
            anyhow::bail!("--k must be greater than 0");
        }
        options.k = k;
    }
    options.include_details = args.verbose;
    options.selection = match args.only {
        Some(Only::Plain) => Selection::Plain,
        Some(Only::Morphological) => Selection::Morphological,
        None => Selection::All,
    };
    let queries_path = args.queries.unwrap_or_else(|| options.queries_path.clone());

    let pipeline = Pipeline::from_config(&config).context("Failed to set up Elasticsearch client")?;
    let lemmatizer = QueryLemmatizer::from_config(&config.lemmatizer);

    let counts = pipeline
        .counts(options.selection)
        .await.context("Failed to count indexed documents")?;
    println!("{}", format_counts(&counts));

    let cases = load_query_cases(&queries_path).context("Failed to load test questions")?;
    println!(
        "Running evaluation on {} questions (k={})\n",
        cases.len(),
        options.k
    );

    pipeline
        .evaluate(&lemmatizer, &options, &cases, |report| {
            if let Some(queries) = &report.queries {
                for q in queries {
                    println!(
                        "  [{}] {} -> {:?} (P: {:.2}, R: {:.2}, RR: {:.2})",
                        report.mode,
                        q.question,
                        q.hits.iter().map(|id| id.0).collect::<Vec<_>>(),
                        q.score.precision,
                        q.score.recall,
                        q.score.reciprocal_rank
                    );
                }
                println!();
            }
            println!("{}", format_configuration(report));
        })
        .await
        .context("Evaluation failed")?;

    Ok(())
}
