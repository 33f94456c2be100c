use anyhow::Result;
use std::path::Path;
use tantivy::{Index, IndexWriter, TantivyDocument, Term};
use tracing::{debug, info};

use zipsa_core::types::Document;

use crate::search::TantivySparseSearcher;
use crate::tantivy_utils::{build_schema, register_tokenizer, SparseFields};

const WRITER_MEMORY_BYTES: usize = 50_000_000;

/// A tantivy index laid out for keyword retrieval over documents.
#[derive(Clone)]
pub struct SparseIndex {
	index: Index,
	fields: SparseFields,
}

impl SparseIndex {
	/// Create a fresh index in `index_dir`, replacing whatever was there.
	pub fn create<S: AsRef<str>>(index_dir: &Path, trait_names: &[S]) -> Result<Self> {
		if index_dir.exists() { std::fs::remove_dir_all(index_dir)?; }
		std::fs::create_dir_all(index_dir)?;
		let index = Index::create_in_dir(index_dir, build_schema(trait_names))?;
		Self::from_index(index)
	}

	pub fn open(index_dir: &Path) -> Result<Self> {
		let index = Index::open_in_dir(index_dir)?;
		Self::from_index(index)
	}

	/// Open the index in `index_dir`, creating it when the directory holds none.
	pub fn open_or_create<S: AsRef<str>>(index_dir: &Path, trait_names: &[S]) -> Result<Self> {
		if index_dir.join("meta.json").exists() { Self::open(index_dir) } else { Self::create(index_dir, trait_names) }
	}

	pub fn in_memory<S: AsRef<str>>(trait_names: &[S]) -> Result<Self> {
		Self::from_index(Index::create_in_ram(build_schema(trait_names)))
	}

	fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let fields = SparseFields::from_schema(&index.schema())?;
		Ok(Self { index, fields })
	}

	pub fn fields(&self) -> &SparseFields { &self.fields }

	pub fn writer(&self) -> Result<SparseIndexWriter> {
		let writer = self.index.writer(WRITER_MEMORY_BYTES)?;
		Ok(SparseIndexWriter { writer, fields: self.fields.clone() })
	}

	pub fn searcher(&self) -> Result<TantivySparseSearcher> {
		TantivySparseSearcher::new(self.index.clone(), self.fields.clone())
	}

	/// Documents visible as of the last commit.
	pub fn count(&self) -> Result<u64> {
		Ok(self.index.reader()?.searcher().num_docs())
	}
}

/// Adds documents to the sparse index; re-adding an id replaces the old entry.
pub struct SparseIndexWriter {
	writer: IndexWriter,
	fields: SparseFields,
}

impl SparseIndexWriter {
	pub fn upsert(&mut self, doc: &Document) -> Result<()> {
		self.writer.delete_term(Term::from_field_text(self.fields.id, &doc.id));
		self.writer.add_document(self.to_tantivy(doc))?;
		Ok(())
	}

	pub fn upsert_all(&mut self, docs: &[Document]) -> Result<usize> {
		for doc in docs { self.upsert(doc)?; }
		Ok(docs.len())
	}

	pub fn commit(&mut self) -> Result<()> {
		let opstamp = self.writer.commit()?;
		info!(opstamp, "sparse index committed");
		Ok(())
	}

	fn to_tantivy(&self, doc: &Document) -> TantivyDocument {
		let f = &self.fields;
		let mut out = TantivyDocument::default();
		out.add_text(f.id, &doc.id);
		if let Some(title) = &doc.title { out.add_text(f.title, title); }
		out.add_text(f.raw_text, &doc.raw_text);
		out.add_text(f.tokenized_text, &doc.tokenized_text);
		for tag in &doc.specialists { out.add_text(f.specialists, tag); }
		for tag in &doc.categories { out.add_text(f.categories, tag); }
		// Undeclared traits stay out of the index; declared ones default to 0.
		for (name, field) in &f.traits { out.add_i64(*field, doc.trait_value(name)); }
		for name in doc.numeric_traits.keys().filter(|n| !f.traits.contains_key(*n)) {
			debug!(id = %doc.id, trait_name = %name, "trait not declared in sparse schema");
		}
		out
	}
}
