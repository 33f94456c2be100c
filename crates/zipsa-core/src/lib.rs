//! zipsa-core
//!
//! Shared vocabulary of the retrieval engine: documents, requests and ranked
//! results, the metadata filter algebra, the error taxonomy, configuration,
//! and the provider/searcher traits the other crates implement.

pub mod config;
pub mod error;
pub mod filter;
pub mod loader;
pub mod traits;
pub mod types;

pub use error::{Result, RetrievalError};
pub use filter::{Field, Filter, NumericConstraint, Value};
pub use types::{Document, RankedResult, ScoreType, SearchMode, SearchRequest};
