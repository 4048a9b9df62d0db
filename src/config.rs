use crate::search::{Analysis, Credentials, IndexConfig, MorphologySettings};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub paraeval: ParaevalConfig,
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub indices: IndicesConfig,
    #[serde(default)]
    pub eval: EvalConfig,
    #[serde(default)]
    pub lemmatizer: LemmatizerConfig,
}

/// Data sources and logging
#[derive(Debug, Clone, Deserialize)]
pub struct ParaevalConfig {
    /// JSON array of paragraph records (`uid`, `ru_wiki_pageid`, `text`).
    pub paragraphs_path: PathBuf,
    /// JSON array of test questions (`question_text`, `paragraphs_uids.with_answer`).
    pub queries_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Elasticsearch connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ElasticsearchConfig {
    #[serde(default = "default_es_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_bulk_batch_size")]
    pub bulk_batch_size: usize,
    /// Basic auth user; the password is read from `password_env`.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password_env: Option<String>,
    /// Environment variable holding an API key (`id:key` or pre-encoded).
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_es_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            bulk_batch_size: default_bulk_batch_size(),
            username: None,
            password_env: None,
            api_key_env: None,
        }
    }
}

/// The two index configurations under evaluation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndicesConfig {
    #[serde(default)]
    pub plain: PlainIndexConfig,
    #[serde(default)]
    pub morphological: MorphologicalIndexConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlainIndexConfig {
    #[serde(default = "default_plain_index")]
    pub name: String,
}

impl Default for PlainIndexConfig {
    fn default() -> Self {
        Self {
            name: default_plain_index(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MorphologicalIndexConfig {
    #[serde(default = "default_morph_index")]
    pub name: String,
    /// Snowball stemmer language
    #[serde(default = "default_language")]
    pub language: String,
    /// Elasticsearch predefined stopword set
    #[serde(default = "default_stopwords")]
    pub stopwords: String,
    /// Words protected from stemming (keyword_marker filter)
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

impl Default for MorphologicalIndexConfig {
    fn default() -> Self {
        Self {
            name: default_morph_index(),
            language: default_language(),
            stopwords: default_stopwords(),
            keywords: default_keywords(),
        }
    }
}

/// Evaluation settings
#[derive(Debug, Clone, Deserialize)]
pub struct EvalConfig {
    /// Retrieval depth; also the fixed precision denominator.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Number of in-flight searches per configuration (1 = sequential).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            concurrency: default_concurrency(),
        }
    }
}

/// Query lemmatization for the morphological configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LemmatizerConfig {
    #[serde(default = "default_lemmatizer_enabled")]
    pub enabled: bool,
    #[serde(default = "default_mystem_path")]
    pub mystem_path: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for LemmatizerConfig {
    fn default() -> Self {
        Self {
            enabled: default_lemmatizer_enabled(),
            mystem_path: default_mystem_path(),
            timeout_secs: default_timeout_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_es_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_bulk_batch_size() -> usize {
    500
}

fn default_plain_index() -> String {
    "wikipedia_paragraphs".to_string()
}

fn default_morph_index() -> String {
    "wikipedia_morphologic".to_string()
}

fn default_language() -> String {
    "russian".to_string()
}

fn default_stopwords() -> String {
    "_russian_".to_string()
}

fn default_keywords() -> Vec<String> {
    vec!["пример".to_string()]
}

fn default_k() -> usize {
    5
}

fn default_concurrency() -> usize {
    1
}

fn default_lemmatizer_enabled() -> bool {
    true
}

fn default_mystem_path() -> PathBuf {
    PathBuf::from("mystem")
}

fn default_cache_capacity() -> usize {
    1024
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in PARAEVAL_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PARAEVAL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));
        Self::load_from(&config_path)
    }

    /// Load from `path` when given, otherwise fall back to [`Config::load`]
    pub fn load_or(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        // Optional; credentials may live in .env
        let _ = dotenv::dotenv();

        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml_str(&config_str)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.elasticsearch.url).with_context(|| {
            format!("elasticsearch.url is not a valid URL: {}", self.elasticsearch.url)
        })?;

        if self.elasticsearch.bulk_batch_size == 0 {
            anyhow::bail!("elasticsearch.bulk_batch_size must be greater than 0");
        }

        if self.eval.k == 0 {
            anyhow::bail!("eval.k must be greater than 0");
        }

        if self.eval.concurrency == 0 {
            anyhow::bail!("eval.concurrency must be greater than 0");
        }

        let plain = &self.indices.plain.name;
        let morph = &self.indices.morphological.name;
        validate_index_name(plain).context("indices.plain.name")?;
        validate_index_name(morph).context("indices.morphological.name")?;
        if plain == morph {
            anyhow::bail!(
                "indices.plain.name and indices.morphological.name must differ (both are {})",
                plain
            );
        }

        if self.elasticsearch.username.is_some() && self.elasticsearch.password_env.is_none() {
            anyhow::bail!("elasticsearch.username requires elasticsearch.password_env");
        }

        // Fail early on missing credentials rather than on the first request
        self.credentials()?;

        Ok(())
    }

    /// Resolve Elasticsearch credentials from the referenced environment variables
    pub fn credentials(&self) -> Result<Option<Credentials>> {
        let es = &self.elasticsearch;
        if let Some(env) = &es.api_key_env {
            let key = std::env::var(env).with_context(|| {
                format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable with your Elasticsearch API key.",
                    env
                )
            })?;
            return Ok(Some(Credentials::ApiKey(key)));
        }
        match (&es.username, &es.password_env) {
            (Some(username), Some(env)) => {
                let password = std::env::var(env).with_context(|| {
                    format!("Environment variable {} not set (password for {})", env, username)
                })?;
                Ok(Some(Credentials::Basic {
                    username: username.clone(),
                    password,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Plain index descriptor (default analyzer)
    pub fn plain_index(&self) -> IndexConfig {
        IndexConfig {
            name: self.indices.plain.name.clone(),
            analysis: Analysis::Standard,
        }
    }

    /// Morphological index descriptor (language analyzer pipeline)
    pub fn morphological_index(&self) -> IndexConfig {
        let morph = &self.indices.morphological;
        IndexConfig {
            name: morph.name.clone(),
            analysis: Analysis::Morphological(MorphologySettings {
                language: morph.language.clone(),
                stopwords: morph.stopwords.clone(),
                keywords: morph.keywords.clone(),
            }),
        }
    }
}

/// Elasticsearch index naming rules: lowercase, no reserved characters,
/// must not start with `-`, `_` or `+`.
fn validate_index_name(name: &str) -> Result<()> {
    let pattern = Regex::new(r"^[a-z0-9][a-z0-9._-]*$").context("index name pattern")?;
    if name.len() > 255 || name == "." || name == ".." || !pattern.is_match(name) {
        anyhow::bail!("invalid Elasticsearch index name: {:?}", name);
    }
    Ok(())
}
