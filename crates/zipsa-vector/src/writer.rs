use arrow_array::types::Float32Type;
use arrow_array::{ArrayRef, FixedSizeListArray, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use lancedb::Table;
use std::sync::Arc;
use tracing::{debug, info};

use zipsa_core::types::Document;
use zipsa_core::{Result, RetrievalError};

use crate::schema::{build_documents_schema, encode_tags, reserved_char};

const BATCH_SIZE: usize = 1000;

/// Upserts documents (with their embeddings) into the LanceDB table, keyed by `id`.
pub struct DenseIndexWriter {
	table: Table,
	dim: usize,
	traits: Vec<String>,
}

impl DenseIndexWriter {
	pub(crate) fn new(table: Table, dim: usize, traits: Vec<String>) -> Self {
		Self { table, dim, traits }
	}

	/// Every document must carry an embedding of the table's dimension.
	pub async fn upsert(&self, docs: &[Document]) -> Result<usize> {
		for doc in docs { self.check(doc)?; }
		for chunk in docs.chunks(BATCH_SIZE) {
			let batch = self.to_record_batch(chunk)?;
			let schema = batch.schema();
			let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
			let mut mi = self.table.merge_insert(&["id"]);
			mi.when_matched_update_all(None).when_not_matched_insert_all();
			mi.execute(reader).await.map_err(RetrievalError::dense)?;
			debug!(rows = chunk.len(), "dense batch upserted");
		}
		info!(rows = docs.len(), table = self.table.name(), "dense upsert complete");
		Ok(docs.len())
	}

	fn check(&self, doc: &Document) -> Result<()> {
		if doc.embedding.len() != self.dim {
			return Err(RetrievalError::DimensionMismatch { expected: self.dim, actual: doc.embedding.len() });
		}
		for tag in doc.specialists.iter().chain(&doc.categories) {
			if let Some(c) = reserved_char(tag) {
				return Err(RetrievalError::InvalidRequest(format!("document '{}' has tag '{tag}' containing '{c}'", doc.id)));
			}
		}
		Ok(())
	}

	fn to_record_batch(&self, docs: &[Document]) -> Result<RecordBatch> {
		let width = i32::try_from(self.dim).map_err(RetrievalError::dense)?;
		let schema = build_documents_schema(width, &self.traits);
		let mut columns: Vec<ArrayRef> = vec![
			Arc::new(StringArray::from_iter_values(docs.iter().map(|d| d.id.as_str()))),
			Arc::new(StringArray::from(docs.iter().map(|d| d.title.clone()).collect::<Vec<_>>())),
			Arc::new(StringArray::from_iter_values(docs.iter().map(|d| d.raw_text.as_str()))),
			Arc::new(StringArray::from_iter_values(docs.iter().map(|d| d.tokenized_text.as_str()))),
			Arc::new(StringArray::from_iter_values(docs.iter().map(|d| encode_tags(&d.specialists)))),
			Arc::new(StringArray::from_iter_values(docs.iter().map(|d| encode_tags(&d.categories)))),
		];
		for name in &self.traits {
			columns.push(Arc::new(Int64Array::from_iter_values(docs.iter().map(|d| d.trait_value(name)))));
		}
		let vectors = docs.iter().map(|d| Some(d.embedding.iter().copied().map(Some).collect::<Vec<_>>()));
		columns.push(Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, width)));
		RecordBatch::try_new(schema, columns).map_err(RetrievalError::dense)
	}
}
