//! zipsa-hybrid
//!
//! The retrieval orchestrator: tokenize and embed the query, run keyword and
//! vector search concurrently under independent timeouts, and merge the two
//! rankings with Reciprocal Rank Fusion.

pub mod fusion;
pub mod retriever;
pub mod store;

pub use fusion::{fuse, DEFAULT_K};
pub use retriever::HybridRetriever;
pub use store::{load_tokenizer, open_store, Store, StoreRetriever};
