//! Domain types shared by the sparse, dense and hybrid engines.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, RetrievalError};
use crate::filter::{Field, Filter, NumericConstraint};

pub type DocId = String;

/// One knowledge-base entry as both indexes see it.
///
/// - `id`: stable identifier, the upsert key
/// - `raw_text`: source text handed back to callers
/// - `tokenized_text`: tokenizer output, only used for keyword matching
/// - `embedding`: L2-normalized vector; empty on keyword-only results
/// - `categories`/`specialists`: tag sets used as hard filters
/// - `numeric_traits`: ordinal traits on a 0–5 scale where 0 means unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub raw_text: String,
    #[serde(default)]
    pub tokenized_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub specialists: BTreeSet<String>,
    #[serde(default)]
    pub numeric_traits: BTreeMap<String, i64>,
}

impl Document {
    pub fn new(id: impl Into<DocId>, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            raw_text: raw_text.into(),
            tokenized_text: String::new(),
            embedding: Vec::new(),
            categories: BTreeSet::new(),
            specialists: BTreeSet::new(),
            numeric_traits: BTreeMap::new(),
        }
    }

    pub fn with_specialist(mut self, tag: impl Into<String>) -> Self {
        self.specialists.insert(tag.into());
        self
    }

    pub fn with_category(mut self, tag: impl Into<String>) -> Self {
        self.categories.insert(tag.into());
        self
    }

    pub fn with_trait(mut self, name: impl Into<String>, value: i64) -> Self {
        self.numeric_traits.insert(name.into(), value);
        self
    }

    /// Trait value with unset traits reported as 0.
    pub fn trait_value(&self, name: &str) -> i64 {
        self.numeric_traits.get(name).copied().unwrap_or(0)
    }
}

/// Which retrieval path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    Vector,
    Keyword,
    Fused,
}

impl ScoreType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoreType::Vector => "vector",
            ScoreType::Keyword => "keyword",
            ScoreType::Fused => "fused",
        }
    }
}

/// A document plus its score for one query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub document: Document,
    pub fusion_score: f64,
    pub score_type: ScoreType,
}

/// Which branches of the retriever a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Hybrid,
    VectorOnly,
    KeywordOnly,
}

/// The request surface exposed to the agent router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub text: String,
    #[serde(default)]
    pub specialist: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub numeric_filters: BTreeMap<String, NumericConstraint>,
    pub limit: usize,
    #[serde(default)]
    pub mode: SearchMode,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>, limit: usize) -> Self {
        Self {
            text: text.into(),
            specialist: None,
            category: None,
            numeric_filters: BTreeMap::new(),
            limit,
            mode: SearchMode::Hybrid,
        }
    }

    pub fn specialist(mut self, tag: impl Into<String>) -> Self {
        self.specialist = Some(tag.into());
        self
    }

    pub fn category(mut self, tag: impl Into<String>) -> Self {
        self.category = Some(tag.into());
        self
    }

    pub fn numeric(mut self, name: impl Into<String>, constraint: NumericConstraint) -> Self {
        self.numeric_filters.insert(name.into(), constraint);
        self
    }

    pub fn mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Compile the request's constraints into one filter expression.
    ///
    /// `general_sentinel` names the placeholder specialist that means
    /// "do not restrict"; it and blank values are dropped here.
    pub fn to_filter(&self, general_sentinel: &str) -> Result<Filter> {
        let mut clauses = Vec::new();
        if let Some(tag) = normalize_specialist(self.specialist.as_deref(), general_sentinel) {
            clauses.push(Filter::equals_text(Field::Specialists, tag));
        }
        if let Some(tag) = self.category.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push(Filter::equals_text(Field::Categories, tag));
        }
        for (name, constraint) in &self.numeric_filters {
            clauses.push(constraint.to_filter(name)?);
        }
        let filter = Filter::And(clauses);
        filter.validate()?;
        Ok(filter.simplify())
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(RetrievalError::InvalidRequest("limit must be a positive integer".into()));
        }
        Ok(())
    }
}

/// Map the "no specialist" placeholder and blank tags to `None`.
pub fn normalize_specialist<'a>(specialist: Option<&'a str>, general_sentinel: &str) -> Option<&'a str> {
    let tag = specialist?.trim();
    if tag.is_empty() || tag.eq_ignore_ascii_case(general_sentinel.trim()) {
        return None;
    }
    Some(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_sentinel_means_no_filter() {
        assert_eq!(normalize_specialist(Some("General"), "General"), None);
        assert_eq!(normalize_specialist(Some(" general "), "General"), None);
        assert_eq!(normalize_specialist(Some(""), "General"), None);
        assert_eq!(normalize_specialist(None, "General"), None);
        assert_eq!(normalize_specialist(Some("Physician"), "General"), Some("Physician"));
    }

    #[test]
    fn request_compiles_all_constraints() {
        let req = SearchRequest::new("q", 5)
            .specialist("Matchmaker")
            .category("Breeds")
            .numeric("hypoallergenic", NumericConstraint::eq(1));
        let filter = req.to_filter("General").expect("filter");
        assert_eq!(filter.leaves().len(), 3);
    }

    #[test]
    fn request_without_constraints_is_empty_filter() {
        let req = SearchRequest::new("q", 5).specialist("General");
        assert!(req.to_filter("General").expect("filter").is_empty());
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = SearchRequest::new("q", 0).validate().unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidRequest(_)));
    }

    #[test]
    fn request_deserializes_router_shape() {
        let req: SearchRequest = serde_json::from_str(
            r#"{"text":"조용한 고양이","specialist":"Matchmaker","numeric_filters":{"energy_level":{"lte":2}},"limit":3}"#,
        )
        .expect("json");
        assert_eq!(req.mode, SearchMode::Hybrid);
        assert_eq!(req.numeric_filters["energy_level"], NumericConstraint { eq: None, gte: None, lte: Some(2) });
    }
}
