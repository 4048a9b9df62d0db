use thiserror::Error;

/// Main error type for paraeval
///
/// Every variant is fatal for the run. Skipping a query case with an empty
/// gold set is a data-driven exclusion and never surfaces here.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Missing, unreadable or malformed data source
    #[error("Load error: {0}")]
    Load(String),

    /// Search engine unreachable (after retries)
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Index creation or bulk insert failed
    #[error("Indexing error: {0}")]
    Indexing(String),

    /// Search or count request failed
    #[error("Query error: {0}")]
    Query(String),

    /// Aggregation over zero scored queries
    #[error("Empty result: no scored queries to aggregate (every query case had an empty gold set)")]
    EmptyResult,

    /// External morphological analyzer failed
    #[error("Lemmatizer error: {0}")]
    Lemmatizer(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors outside the loader
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenient Result type using EvalError
pub type Result<T> = std::result::Result<T, EvalError>;
