use async_trait::async_trait;
use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, ConstScoreQuery, Occur, Query, QueryParser, RangeQuery, TermQuery};
use tantivy::schema::{IndexRecordOption, Value as _};
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, warn};

use zipsa_core::filter::{effective_bounds, Field, Filter, Value};
use zipsa_core::traits::SparseSearcher;
use zipsa_core::types::Document;
use zipsa_core::{Result, RetrievalError};

use crate::tantivy_utils::SparseFields;

/// BM25 keyword search over `tokenized_text` with metadata clauses compiled
/// into non-scoring tantivy queries.
#[derive(Clone)]
pub struct TantivySparseSearcher {
	inner: Arc<Inner>,
}

struct Inner {
	index: Index,
	reader: IndexReader,
	fields: SparseFields,
}

impl TantivySparseSearcher {
	pub fn new(index: Index, fields: SparseFields) -> anyhow::Result<Self> {
		let reader = index.reader_builder().reload_policy(ReloadPolicy::OnCommitWithDelay).try_into()?;
		Ok(Self { inner: Arc::new(Inner { index, reader, fields }) })
	}

	/// Pick up commits made since the last reload without waiting for the watcher.
	pub fn reload(&self) -> Result<()> {
		self.inner.reader.reload().map_err(RetrievalError::sparse)
	}
}

#[async_trait]
impl SparseSearcher for TantivySparseSearcher {
	/// The tantivy search runs on the blocking pool. If the caller times out
	/// and drops this future the search still runs to completion; its result
	/// is discarded.
	async fn search(&self, tokenized_query: &str, filter: &Filter, limit: usize) -> Result<Vec<Document>> {
		if tokenized_query.trim().is_empty() || limit == 0 {
			return Ok(Vec::new());
		}
		let inner = Arc::clone(&self.inner);
		let query = tokenized_query.to_string();
		let filter = filter.clone();
		tokio::task::spawn_blocking(move || inner.search(&query, &filter, limit))
			.await
			.map_err(RetrievalError::sparse)?
	}
}

impl Inner {
	fn search(&self, tokenized_query: &str, filter: &Filter, limit: usize) -> Result<Vec<Document>> {
		let query = self.build_query(tokenized_query, filter)?;
		let searcher = self.reader.searcher();
		let top_docs = searcher.search(query.as_ref(), &TopDocs::with_limit(limit)).map_err(RetrievalError::sparse)?;
		let mut docs = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let stored: TantivyDocument = match searcher.doc(addr) {
				Ok(d) => d,
				Err(e) => { warn!(error = %e, "skipping unreadable sparse hit"); continue; }
			};
			match self.to_document(&stored) {
				Some(doc) => { debug!(id = %doc.id, score, "sparse hit"); docs.push(doc); }
				None => warn!("skipping sparse hit without id"),
			}
		}
		Ok(docs)
	}

	/// Plain relevance query when unfiltered; otherwise the text query must
	/// match and every filter clause is a zero-score conjunct.
	fn build_query(&self, tokenized_query: &str, filter: &Filter) -> Result<Box<dyn Query>> {
		let parser = QueryParser::for_index(&self.index, vec![self.fields.tokenized_text]);
		let (text_query, errors) = parser.parse_query_lenient(tokenized_query);
		if !errors.is_empty() {
			debug!(?errors, "lenient parse dropped parts of the keyword query");
		}
		if filter.leaves().is_empty() {
			return Ok(text_query);
		}
		let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, text_query)];
		for leaf in filter.leaves() {
			let clause = self.compile_leaf(leaf)?;
			clauses.push((Occur::Must, Box::new(ConstScoreQuery::new(clause, 0.0))));
		}
		Ok(Box::new(BooleanQuery::new(clauses)))
	}

	fn compile_leaf(&self, leaf: &Filter) -> Result<Box<dyn Query>> {
		let f = &self.fields;
		match leaf {
			Filter::Equals(Field::Specialists, Value::Text(tag)) => Ok(term_query(Term::from_field_text(f.specialists, tag))),
			Filter::Equals(Field::Categories, Value::Text(tag)) => Ok(term_query(Term::from_field_text(f.categories, tag))),
			Filter::Equals(Field::Trait(name), Value::Int(v)) => Ok(term_query(Term::from_field_i64(self.trait_field(name)?, *v))),
			Filter::Range { field: Field::Trait(name), min, max } => {
				let field = self.trait_field(name)?;
				let (lo, hi) = effective_bounds(*min, *max);
				let upper = hi.map_or(Bound::Unbounded, |hi| Bound::Included(Term::from_field_i64(field, hi)));
				Ok(Box::new(RangeQuery::new(Bound::Included(Term::from_field_i64(field, lo)), upper)))
			}
			other => Err(RetrievalError::InvalidFilter(format!("sparse index cannot evaluate {other:?}"))),
		}
	}

	fn trait_field(&self, name: &str) -> Result<tantivy::schema::Field> {
		self.fields
			.traits
			.get(name)
			.copied()
			.ok_or_else(|| RetrievalError::InvalidFilter(format!("unknown numeric trait '{name}'")))
	}

	fn to_document(&self, stored: &TantivyDocument) -> Option<Document> {
		let f = &self.fields;
		let text = |field: tantivy::schema::Field| stored.get_first(field).and_then(|v| v.as_str()).map(str::to_string);
		let tags = |field: tantivy::schema::Field| -> BTreeSet<String> {
			stored.get_all(field).filter_map(|v| v.as_str()).map(str::to_string).collect()
		};
		let id = text(f.id)?;
		let mut doc = Document::new(id, text(f.raw_text).unwrap_or_default());
		doc.title = text(f.title);
		doc.tokenized_text = text(f.tokenized_text).unwrap_or_default();
		doc.specialists = tags(f.specialists);
		doc.categories = tags(f.categories);
		for (name, field) in &f.traits {
			if let Some(v) = stored.get_first(*field).and_then(|v| v.as_i64()).filter(|v| *v != 0) {
				doc.numeric_traits.insert(name.clone(), v);
			}
		}
		Some(doc)
	}
}

fn term_query(term: Term) -> Box<dyn Query> {
	Box::new(TermQuery::new(term, IndexRecordOption::Basic))
}
