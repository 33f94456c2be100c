use arrow_array::{Array, Int64Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use tracing::{debug, warn};

use zipsa_core::filter::Filter;
use zipsa_core::traits::DenseSearcher;
use zipsa_core::types::Document;
use zipsa_core::{Result, RetrievalError};

use crate::filter::to_sql;
use crate::schema::{decode_tags, trait_column};

/// Cosine nearest-neighbour search with metadata pre-filtering.
#[derive(Clone)]
pub struct LanceDenseSearcher {
	table: Table,
	dim: usize,
	traits: Vec<String>,
}

impl LanceDenseSearcher {
	pub(crate) fn new(table: Table, dim: usize, traits: Vec<String>) -> Self {
		Self { table, dim, traits }
	}
}

#[async_trait]
impl DenseSearcher for LanceDenseSearcher {
	async fn search(&self, query_vector: &[f32], filter: &Filter, limit: usize) -> Result<Vec<Document>> {
		if query_vector.len() != self.dim {
			return Err(RetrievalError::DimensionMismatch { expected: self.dim, actual: query_vector.len() });
		}
		if limit == 0 {
			return Ok(Vec::new());
		}
		let predicate = to_sql(filter, &self.traits)?;
		let mut query = self.table.vector_search(query_vector.to_vec()).map_err(RetrievalError::dense)?.distance_type(DistanceType::Cosine).limit(limit);
		if let Some(sql) = &predicate {
			debug!(%sql, "dense pre-filter");
			query = query.only_if(sql);
		}
		let mut stream = query.execute().await.map_err(RetrievalError::dense)?;
		let mut docs = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(RetrievalError::dense)? {
			for i in 0..batch.num_rows() {
				match self.decode_row(&batch, i) {
					Some(doc) if filter.matches(&doc) => docs.push(doc),
					// LIKE wildcards inside a tag can over-match
					Some(doc) => debug!(id = %doc.id, "dropping row that fails the filter"),
					None => warn!(row = i, "skipping undecodable dense hit"),
				}
			}
		}
		Ok(docs)
	}
}

impl LanceDenseSearcher {
	fn decode_row(&self, batch: &RecordBatch, i: usize) -> Option<Document> {
		let text = |name: &str| -> Option<String> {
			let col = batch.column_by_name(name)?.as_any().downcast_ref::<StringArray>()?;
			if col.is_null(i) { None } else { Some(col.value(i).to_string()) }
		};
		let mut doc = Document::new(text("id")?, text("raw_text")?);
		doc.title = text("title");
		doc.tokenized_text = text("tokenized_text").unwrap_or_default();
		doc.specialists = decode_tags(&text("specialists").unwrap_or_default());
		doc.categories = decode_tags(&text("categories").unwrap_or_default());
		for name in &self.traits {
			let col = batch.column_by_name(&trait_column(name))?.as_any().downcast_ref::<Int64Array>()?;
			let value = col.value(i);
			if value != 0 {
				doc.numeric_traits.insert(name.clone(), value);
			}
		}
		Some(doc)
	}
}
