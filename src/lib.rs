pub mod config;
pub mod error;
pub mod corpus;
pub mod search;
pub mod lemma;
pub mod eval;
pub mod report;
pub mod pipeline;

pub use config::Config;
pub use error::{EvalError, Result};
pub use pipeline::{Pipeline, RunEvent, RunOptions, Selection};
