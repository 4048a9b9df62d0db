//! Search engine boundary: index descriptors, the backend trait and the
//! Elasticsearch implementation.

pub mod elastic;
pub mod mapping;

use crate::corpus::{Paragraph, ParagraphId};
use crate::error::Result;

pub use elastic::ElasticClient;
pub use mapping::index_definition;

/// How the `text` field is analyzed in an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analysis {
    /// Elasticsearch default (standard) analyzer.
    Standard,
    /// Language pipeline: lowercase → stopwords → keyword marker → stemmer.
    Morphological(MorphologySettings),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphologySettings {
    pub language: String,
    pub stopwords: String,
    pub keywords: Vec<String>,
}

/// A named index together with its text analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub name: String,
    pub analysis: Analysis,
}

impl IndexConfig {
    /// Queries against a morphological index are lemmatized before search.
    pub fn is_morphological(&self) -> bool {
        matches!(self.analysis, Analysis::Morphological(_))
    }

    pub fn mode(&self) -> &'static str {
        if self.is_morphological() {
            "morphological"
        } else {
            "plain"
        }
    }
}

/// Elasticsearch authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    /// Either `id:key` or an already base64-encoded key.
    ApiKey(String),
}

/// Operations the evaluation needs from a full-text search engine.
///
/// Ranking is entirely the engine's business; callers only see ordered ids.
#[allow(async_fn_in_trait)]
pub trait SearchBackend {
    /// Create the index if absent. Returns `true` when it was created,
    /// `false` when it already existed.
    async fn ensure_index(&self, index: &IndexConfig) -> Result<bool>;

    /// Upsert every paragraph keyed by its id. Returns the number indexed.
    async fn bulk_index(&self, index: &IndexConfig, paragraphs: &[Paragraph]) -> Result<usize>;

    /// Total number of documents in the index.
    async fn count(&self, index: &IndexConfig) -> Result<u64>;

    /// Up to `k` paragraph ids, best match first.
    async fn search(&self, index: &IndexConfig, text: &str, k: usize) -> Result<Vec<ParagraphId>>;
}
