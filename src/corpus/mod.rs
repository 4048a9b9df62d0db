//! Corpus and test-set records plus the JSON loaders that produce them.

pub mod loader;

pub use loader::{load_paragraphs, load_query_cases, Paragraph, ParagraphId, QueryCase};
