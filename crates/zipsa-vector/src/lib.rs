//! zipsa-vector
//!
//! Dense side of retrieval on LanceDB: the document table (text, tag strings,
//! trait columns, embedding), a writer that upserts into it, and the cosine
//! searcher with SQL pre-filters.

pub mod filter;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use search::LanceDenseSearcher;
pub use table::DenseIndex;
pub use writer::DenseIndexWriter;
