//! Indexing CLI: create both indices if missing and bulk load the paragraph corpus.

use anyhow::{Context, Result};
use clap::Parser;
use paraeval::corpus::load_paragraphs;
use paraeval::report::format_counts;
use paraeval::{Config, Pipeline};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "index")]
#[command(about = "Create both indices (if missing) and bulk load the paragraph corpus")]
struct Args {
    /// Config file (default: $PARAEVAL_CONFIG or ./config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Paragraphs JSON, overriding paraeval.paragraphs_path
    #[arg(long)]
    paragraphs: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load_or(args.config.as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.paraeval.log_level.as_str()),
    )
    .init();

    let start = Instant::now();
    let pipeline = Pipeline::from_config(&config).context("Failed to set up Elasticsearch client")?;

    pipeline
        .prepare_indices()
        .await
        .context("Failed to create indices")?;

    let path = args
        .paragraphs
        .unwrap_or_else(|| config.paraeval.paragraphs_path.clone());
    let paragraphs = load_paragraphs(&path).context("Failed to load corpus")?;

    let counts = pipeline
        .index_corpus(&paragraphs)
        .await
        .context("Failed to index corpus")?;

    println!("{}", format_counts(&counts));
    log::info!("Indexing finished in {:?}", start.elapsed());
    Ok(())
}
