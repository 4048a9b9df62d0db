//! Query lemmatization for the morphological index configuration.

pub mod cache;
pub mod mystem;

use crate::config::LemmatizerConfig;
use crate::error::Result;

pub use cache::LemmaCache;
pub use mystem::MystemLemmatizer;

/// Turns raw query text into a lemma-joined string.
///
/// Implementations must be deterministic for a given analyzer version.
#[allow(async_fn_in_trait)]
pub trait Lemmatizer {
    async fn lemmatize(&self, text: &str) -> Result<String>;
}

/// Returns the query unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Lemmatizer for Passthrough {
    async fn lemmatize(&self, text: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

/// Lemmatizer selected by the `[lemmatizer]` config section.
pub enum QueryLemmatizer {
    Mystem(MystemLemmatizer),
    CachedMystem(LemmaCache<MystemLemmatizer>),
    Passthrough(Passthrough),
}

impl QueryLemmatizer {
    pub fn from_config(config: &LemmatizerConfig) -> Self {
        if !config.enabled {
            log::info!("Query lemmatization disabled; morphological search relies on the index analyzer");
            return QueryLemmatizer::Passthrough(Passthrough);
        }
        let mystem = MystemLemmatizer::from_config(config);
        if config.cache_capacity > 0 {
            QueryLemmatizer::CachedMystem(LemmaCache::new(mystem, config.cache_capacity))
        } else {
            QueryLemmatizer::Mystem(mystem)
        }
    }
}

impl Lemmatizer for QueryLemmatizer {
    async fn lemmatize(&self, text: &str) -> Result<String> {
        match self {
            QueryLemmatizer::Mystem(l) => l.lemmatize(text).await,
            QueryLemmatizer::CachedMystem(l) => l.lemmatize(text).await,
            QueryLemmatizer::Passthrough(l) => l.lemmatize(text).await,
        }
    }
}
