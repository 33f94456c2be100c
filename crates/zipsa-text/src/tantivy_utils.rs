use std::collections::BTreeMap;

use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, TextAnalyzer, WhitespaceTokenizer};
use tantivy::Index;

/// Analyzer for `tokenized_text`: the stored text is already segmented, so
/// the index only splits on whitespace.
pub const KEYWORD_TOKENIZER: &str = "zipsa_keywords";

const TRAIT_PREFIX: &str = "trait_";

/// Field handles of the sparse index.
#[derive(Debug, Clone)]
pub struct SparseFields {
    pub id: Field,
    pub title: Field,
    pub raw_text: Field,
    pub tokenized_text: Field,
    pub specialists: Field,
    pub categories: Field,
    /// One i64 field per declared numeric trait, keyed by trait name.
    pub traits: BTreeMap<String, Field>,
}

impl SparseFields {
    /// Look fields up in an existing schema; traits are discovered by prefix.
    pub fn from_schema(schema: &Schema) -> tantivy::Result<Self> {
        let traits = schema
            .fields()
            .filter_map(|(field, entry)| entry.name().strip_prefix(TRAIT_PREFIX).map(|name| (name.to_string(), field)))
            .collect();
        Ok(Self {
            id: schema.get_field("id")?,
            title: schema.get_field("title")?,
            raw_text: schema.get_field("raw_text")?,
            tokenized_text: schema.get_field("tokenized_text")?,
            specialists: schema.get_field("specialists")?,
            categories: schema.get_field("categories")?,
            traits,
        })
    }
}

pub fn build_schema<S: AsRef<str>>(trait_names: &[S]) -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field("id", STRING | STORED);
    schema_builder.add_text_field("title", STORED);
    schema_builder.add_text_field("raw_text", STORED);
    let text_field_indexing = TextFieldIndexing::default()
        .set_tokenizer(KEYWORD_TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
    schema_builder.add_text_field("tokenized_text", text_options);
    schema_builder.add_text_field("specialists", STRING | STORED);
    schema_builder.add_text_field("categories", STRING | STORED);
    for name in trait_names {
        schema_builder.add_i64_field(&format!("{TRAIT_PREFIX}{}", name.as_ref()), INDEXED | FAST | STORED);
    }
    schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
    let tokenizer = TextAnalyzer::builder(WhitespaceTokenizer::default()).filter(LowerCaser).build();
    index.tokenizers().register(KEYWORD_TOKENIZER, tokenizer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_declares_one_field_per_trait() {
        let schema = build_schema(&["hypoallergenic", "energy_level"]);
        let fields = SparseFields::from_schema(&schema).expect("fields");
        assert_eq!(fields.traits.keys().map(String::as_str).collect::<Vec<_>>(), vec!["energy_level", "hypoallergenic"]);
    }
}
