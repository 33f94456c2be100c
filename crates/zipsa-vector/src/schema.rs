use arrow_schema::{DataType, Field, Schema};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const TRAIT_PREFIX: &str = "trait_";
/// Wraps tag sets as `|a|b|` so membership is a substring test.
pub const TAG_DELIMITER: char = '|';
/// Characters a tag may not contain: the delimiter and the LIKE wildcards
/// used by tag filters.
pub const RESERVED_TAG_CHARS: [char; 3] = [TAG_DELIMITER, '%', '_'];

pub fn reserved_char(tag: &str) -> Option<char> {
	tag.chars().find(|c| RESERVED_TAG_CHARS.contains(c))
}

pub fn trait_column(name: &str) -> String {
	format!("{TRAIT_PREFIX}{name}")
}

/// Document table: stored text, tag strings, one Int64 column per trait, and the vector.
pub fn build_documents_schema<S: AsRef<str>>(dim: i32, trait_names: &[S]) -> Arc<Schema> {
	let mut fields = vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("title", DataType::Utf8, true),
		Field::new("raw_text", DataType::Utf8, false),
		Field::new("tokenized_text", DataType::Utf8, false),
		Field::new("specialists", DataType::Utf8, false),
		Field::new("categories", DataType::Utf8, false),
	];
	fields.extend(trait_names.iter().map(|n| Field::new(trait_column(n.as_ref()), DataType::Int64, false)));
	fields.push(Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true));
	Arc::new(Schema::new(fields))
}

pub fn build_meta_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("key", DataType::Utf8, false),
		Field::new("value", DataType::Utf8, false),
	]))
}

/// Trait names declared by an existing table schema.
pub fn trait_names(schema: &Schema) -> Vec<String> {
	schema.fields().iter().filter_map(|f| f.name().strip_prefix(TRAIT_PREFIX).map(str::to_string)).collect()
}

/// Vector width of an existing table schema.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
	match schema.field_with_name("vector").ok()?.data_type() {
		DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
		_ => None,
	}
}

pub fn encode_tags(tags: &BTreeSet<String>) -> String {
	let mut out = String::from(TAG_DELIMITER);
	for tag in tags {
		out.push_str(tag);
		out.push(TAG_DELIMITER);
	}
	out
}

pub fn decode_tags(s: &str) -> BTreeSet<String> {
	s.split(TAG_DELIMITER).filter(|t| !t.is_empty()).map(str::to_string).collect()
}
