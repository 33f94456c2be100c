//! zipsa-text
//!
//! Keyword side of retrieval: the morpheme tokenizer that produces
//! `tokenized_text`, and the tantivy index that scores it with BM25.

pub mod tantivy_utils;
pub mod tokenizer;
pub mod index;
pub mod search;

pub use index::{SparseIndex, SparseIndexWriter};
pub use search::TantivySparseSearcher;
pub use tokenizer::{Morpheme, ResourcePaths, Tag, Tokenizer, TokenizerConfig};
